//! Transaction factory
//!
//! Builds typed payloads, wraps them in signed legacy envelopes and keeps the
//! account's counters consistent while doing so.
//!
//! ## Architecture
//!
//! - **errors**: [`TxBuildError`], structural failures that are never retried
//! - **order**: order parameters and validation limits
//! - **payload**: routed payload contexts and the `[type byte] ++ JSON` codec
//! - **envelope**: legacy transaction signing and EIP-2718 encoding
//! - **factory**: [`TxRequest`] and the build operations on a locked account
//!
//! ## Two-layer session authorization
//!
//! Session create/delete descriptors are signed by the account's primary key
//! inside the payload, while the envelope itself is signed by the session
//! key. The payload signature proves the account owns the session action; the
//! envelope signature proves the session key submitted it.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use load_tester::account::Account;
//! use load_tester::config::ChainConfig;
//! use load_tester::tx_builder::{OrderParams, Side, TxRequest};
//! use alloy_primitives::U256;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), load_tester::tx_builder::TxBuildError> {
//! let account = Account::generate(0, Arc::new(ChainConfig::new(1337)));
//! let order = OrderParams::limit("BTC", "USDT", Side::Buy, U256::from(100), U256::from(1));
//! let envelope = account.lock().await.build_routed(TxRequest::NewOrder(order))?;
//! assert!(envelope.kind().is_routed());
//! # Ok(())
//! # }
//! ```

pub mod envelope;
pub mod errors;
pub mod factory;
pub mod order;
pub mod payload;

pub use envelope::SignedEnvelope;
pub use errors::TxBuildError;
pub use factory::TxRequest;
pub use order::{
    OrderParams, OrderType, OrderValidationError, Side, StopOrderParams, TpslParams,
    MAX_PRICE, MAX_QUANTITY, MAX_TOKEN_LEN,
};
pub use payload::{
    type_code, CancelAllContext, OrderContext, PayloadKind, RoutedPayload, Session,
    SessionCommand, SessionContext, StopOrderContext, TokenTransferContext, TransferContext,
};
