//! Load Tester - account setup and funding for chain load tests
//!
//! Builds the account population a load test draws from, restores it from
//! snapshots between runs, and funds it from one rich account through a
//! hierarchical distribution tree.

pub mod account;
pub mod config;
pub mod distributor;
pub mod funding;
pub mod group;
pub mod keys;
pub mod metrics;
pub mod observability;
pub mod transport;
pub mod tx_builder;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use account::{Account, AccountError, RetryPolicy};
pub use config::{ChainConfig, LoadConfig};
pub use distributor::{DistributionError, Distributor, FundsTransfer};
pub use group::{AccountGroup, AccountPurpose, ScenarioKind, ScenarioSet, SnapshotStore};
pub use transport::{Transport, TransportError};
pub use tx_builder::{SignedEnvelope, TxBuildError, TxRequest};
