//! The two per-account counters
//!
//! [`SequenceCounter`] is the chain nonce for direct-submit transactions. It is
//! seeded once from the node's pending count and trusted locally afterwards;
//! this assumes the process is the only writer for the account.
//!
//! [`LogicalClock`] is the ordering value for routed transactions. It is never
//! queried from the chain: at first use it seeds itself from wall-clock
//! milliseconds (or a restored value, whichever is larger) so that restarts do
//! not collide with values already used, then increments by one.
//!
//! Both live inside the account's lock and are only touched through it.

use chrono::Utc;

/// Next sequence number for direct-submit transactions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceCounter {
    next: u64,
    synced: bool,
}

impl SequenceCounter {
    /// A fresh counter that must consult the chain before first use
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter restored from a snapshot
    ///
    /// The stored value is kept for persistence but still re-synced from the
    /// chain on first use, since other runs may have used the account since.
    pub fn restored(next: u64) -> Self {
        Self {
            next,
            synced: false,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Value the next allocation will return
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Adopt the chain's next expected sequence
    pub fn observe_chain(&mut self, chain_next: u64) {
        self.next = chain_next;
        self.synced = true;
    }

    /// Return the current value and advance
    pub fn allocate(&mut self) -> u64 {
        let value = self.next;
        self.next += 1;
        value
    }

    /// Undo the most recent allocation so `value` is reused
    ///
    /// Only succeeds if `value` was the last value handed out.
    pub fn release(&mut self, value: u64) -> bool {
        if value.checked_add(1) == Some(self.next) {
            self.next = value;
            true
        } else {
            false
        }
    }
}

/// Ordering value for routed transactions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalClock {
    floor: u64,
    next: Option<u64>,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock restored from a snapshot; seeding still happens at first use
    pub fn restored(value: u64) -> Self {
        Self {
            floor: value,
            next: None,
        }
    }

    pub fn is_seeded(&self) -> bool {
        self.next.is_some()
    }

    /// Next value, seeding from the wall clock if needed
    pub fn tick(&mut self) -> u64 {
        self.tick_at(Utc::now().timestamp_millis().max(0) as u64)
    }

    /// Next value, seeding from `now_ms` if needed
    pub fn tick_at(&mut self, now_ms: u64) -> u64 {
        let value = match self.next {
            Some(value) => value,
            None => self.floor.max(now_ms),
        };
        self.next = Some(value + 1);
        value
    }

    /// Value to persist: the next one to hand out, or the restored floor
    pub fn current(&self) -> u64 {
        self.next.unwrap_or(self.floor)
    }
}
