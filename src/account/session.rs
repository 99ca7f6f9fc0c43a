//! Delegated session keys
//!
//! A session key signs routed envelopes on behalf of the account. Creation is
//! optimistic: the record is usable as soon as it is built locally and stays
//! `AssumedActive` until a caller confirms inclusion. Deletion is advisory to
//! the chain, so records are never removed locally.

use alloy_primitives::Address;

use crate::keys::KeyMaterial;
use crate::tx_builder::TxBuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Built locally; no inclusion observed yet
    AssumedActive,
    /// Creation transaction seen on chain
    Confirmed,
    /// Delete descriptor built for this session
    DeleteRequested,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub public_key: Address,
    /// Unix seconds
    pub expiry: u64,
    /// Logical clock value of the last descriptor built for this session
    pub last_nonce: u64,
    pub status: SessionStatus,
}

/// Session keys and their records, index-aligned
#[derive(Debug, Default)]
pub struct SessionBook {
    keys: Vec<KeyMaterial>,
    records: Vec<SessionRecord>,
}

impl SessionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.keys.len(), self.records.len());
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a session, returning its index
    pub fn push(&mut self, key: KeyMaterial, record: SessionRecord) -> usize {
        self.keys.push(key);
        self.records.push(record);
        self.records.len() - 1
    }

    pub fn check_index(&self, index: usize) -> Result<(), TxBuildError> {
        if index >= self.records.len() {
            return Err(TxBuildError::SessionIndexOutOfRange {
                index,
                len: self.records.len(),
            });
        }
        Ok(())
    }

    pub fn key(&self, index: usize) -> Option<&KeyMaterial> {
        self.keys.get(index)
    }

    pub fn record(&self, index: usize) -> Option<&SessionRecord> {
        self.records.get(index)
    }

    pub(crate) fn record_mut(&mut self, index: usize) -> Option<&mut SessionRecord> {
        self.records.get_mut(index)
    }

    pub fn records(&self) -> &[SessionRecord] {
        &self.records
    }

    /// Promote a session after its creation was observed on chain
    pub fn confirm(&mut self, index: usize) -> Result<(), TxBuildError> {
        self.check_index(index)?;
        if let Some(record) = self.records.get_mut(index) {
            if record.status == SessionStatus::AssumedActive {
                record.status = SessionStatus::Confirmed;
            }
        }
        Ok(())
    }
}
