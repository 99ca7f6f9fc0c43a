//! Transaction factory: build and sign operations on a locked account
//!
//! Every builder here runs on an [`AccountGuard`], so counter allocation and
//! signing happen atomically with respect to other callers on the same
//! account. Validation runs before any counter moves.

use alloy_primitives::{Address, Bytes, U256};
use chrono::Utc;

use super::envelope::{LegacyFields, SignedEnvelope};
use super::errors::TxBuildError;
use super::order::{OrderParams, StopOrderParams, TpslParams};
use super::payload::{
    CancelAllContext, PayloadKind, RoutedPayload, Session, SessionCommand, SessionContext,
    TokenTransferContext, TransferContext,
};
use crate::account::{AccountError, AccountGuard, SessionRecord, SessionStatus};
use crate::keys::KeyMaterial;
use crate::metrics::metrics;
use crate::transport::Transport;

/// Everything an account can build and sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxRequest {
    ValueTransfer {
        to: Address,
        value: U256,
    },
    TokenTransfer {
        to: Address,
        token: String,
        value: U256,
    },
    NewOrder(OrderParams),
    NewOrderWithTpsl {
        order: OrderParams,
        tpsl: TpslParams,
    },
    NewStopOrder(StopOrderParams),
    CancelAll,
    SessionCreate,
    SessionDelete {
        index: usize,
    },
    /// Direct-submit transfer using the chain sequence
    RawLegacyTransfer {
        to: Address,
        value: U256,
        input: Bytes,
    },
}

impl TxRequest {
    pub fn kind(&self) -> PayloadKind {
        match self {
            TxRequest::ValueTransfer { .. } => PayloadKind::ValueTransfer,
            TxRequest::TokenTransfer { .. } => PayloadKind::TokenTransfer,
            TxRequest::NewOrder(_) => PayloadKind::NewOrder,
            TxRequest::NewOrderWithTpsl { .. } => PayloadKind::NewOrderWithTpsl,
            TxRequest::NewStopOrder(_) => PayloadKind::NewStopOrder,
            TxRequest::CancelAll => PayloadKind::CancelAll,
            TxRequest::SessionCreate => PayloadKind::SessionCreate,
            TxRequest::SessionDelete { .. } => PayloadKind::SessionDelete,
            TxRequest::RawLegacyTransfer { .. } => PayloadKind::RawLegacyTransfer,
        }
    }
}

impl AccountGuard<'_> {
    /// Build and sign any request kind
    ///
    /// Raw transfers may query the chain for the first sequence; routed kinds
    /// never touch `transport`.
    pub async fn build_and_sign(
        &mut self,
        request: TxRequest,
        transport: &dyn Transport,
    ) -> Result<SignedEnvelope, AccountError> {
        match request {
            TxRequest::RawLegacyTransfer { to, value, input } => {
                let nonce = self.allocate_sequence(transport).await?;
                match self.sign_legacy_transfer(nonce, to, value, input) {
                    Ok(envelope) => Ok(envelope),
                    Err(err) => {
                        self.state.sequence.release(nonce);
                        Err(err.into())
                    }
                }
            }
            routed => Ok(self.build_routed(routed)?),
        }
    }

    /// Build and sign a routed request without any network access
    pub fn build_routed(&mut self, request: TxRequest) -> Result<SignedEnvelope, TxBuildError> {
        let owner = self.account.address();
        let kind = request.kind();

        let payload = match request {
            TxRequest::ValueTransfer { to, value } => {
                RoutedPayload::Transfer(TransferContext { owner, to, value })
            }
            TxRequest::TokenTransfer { to, token, value } => {
                RoutedPayload::TokenTransfer(TokenTransferContext {
                    owner,
                    to,
                    token,
                    value,
                })
            }
            TxRequest::NewOrder(order) => RoutedPayload::NewOrder(order.validate(owner)?),
            TxRequest::NewOrderWithTpsl { order, tpsl } => {
                RoutedPayload::NewOrder(order.validate_with_tpsl(owner, &tpsl)?)
            }
            TxRequest::NewStopOrder(stop) => RoutedPayload::StopOrder(stop.validate(owner)?),
            TxRequest::CancelAll => RoutedPayload::CancelAll(CancelAllContext { owner }),
            TxRequest::SessionCreate => return self.create_session().map(|(_, envelope)| envelope),
            TxRequest::SessionDelete { index } => return self.delete_session(index),
            TxRequest::RawLegacyTransfer { .. } => {
                return Err(TxBuildError::Unsupported(
                    "raw legacy transfers need a chain-synced sequence",
                ))
            }
        };

        let input = payload.encode()?;
        let nonce = self.allocate_logical();
        let account = self.account;
        routed_envelope(account.chain(), nonce, input, kind, account.keys())
    }

    /// Sign a direct-submit transfer with an already allocated sequence
    pub fn sign_legacy_transfer(
        &self,
        nonce: u64,
        to: Address,
        value: U256,
        input: Bytes,
    ) -> Result<SignedEnvelope, TxBuildError> {
        let chain = self.account.chain();
        let fields = LegacyFields {
            chain_id: chain.chain_id,
            nonce,
            to,
            value,
            gas_price: chain.gas_price,
            gas_limit: chain.gas_limit_for(input.len()),
            input,
        };
        let envelope = SignedEnvelope::sign(fields, PayloadKind::RawLegacyTransfer, self.account.keys())?;
        record_signed(PayloadKind::RawLegacyTransfer);
        Ok(envelope)
    }

    /// Generate a session key and sign its create descriptor
    ///
    /// The session is appended only after signing succeeds and is assumed
    /// active from then on.
    pub fn create_session(&mut self) -> Result<(usize, SignedEnvelope), TxBuildError> {
        let account = self.account;
        let session_key = KeyMaterial::generate();
        let nonce = self.allocate_logical();
        let expiry = unix_now().saturating_add(account.chain().session_ttl.as_secs());

        let session = Session {
            owner: account.address(),
            public_key: session_key.address(),
            expiry,
            nonce,
        };
        let context = authorize_session(account.keys(), SessionCommand::Create, session)?;
        let input = RoutedPayload::Session(context).encode()?;
        let envelope = routed_envelope(
            account.chain(),
            nonce,
            input,
            PayloadKind::SessionCreate,
            &session_key,
        )?;

        let record = SessionRecord {
            public_key: session_key.address(),
            expiry,
            last_nonce: nonce,
            status: SessionStatus::AssumedActive,
        };
        let index = self.state.sessions.push(session_key, record);
        Ok((index, envelope))
    }

    /// Sign a delete descriptor for session `index`
    ///
    /// Fails without touching any state when the index is out of range. The
    /// local record is kept and marked `DeleteRequested`.
    pub fn delete_session(&mut self, index: usize) -> Result<SignedEnvelope, TxBuildError> {
        self.state.sessions.check_index(index)?;
        let (public_key, expiry, session_key) = match (
            self.state.sessions.record(index),
            self.state.sessions.key(index),
        ) {
            (Some(record), Some(key)) => (record.public_key, record.expiry, key.clone()),
            _ => {
                return Err(TxBuildError::SessionIndexOutOfRange {
                    index,
                    len: self.state.sessions.len(),
                })
            }
        };

        let account = self.account;
        let nonce = self.allocate_logical();
        let session = Session {
            owner: account.address(),
            public_key,
            expiry,
            nonce,
        };
        let context = authorize_session(account.keys(), SessionCommand::Delete, session)?;
        let input = RoutedPayload::Session(context).encode()?;
        let envelope = routed_envelope(
            account.chain(),
            nonce,
            input,
            PayloadKind::SessionDelete,
            &session_key,
        )?;

        if let Some(record) = self.state.sessions.record_mut(index) {
            record.last_nonce = nonce;
            record.status = SessionStatus::DeleteRequested;
        }
        Ok(envelope)
    }
}

fn routed_envelope(
    chain: &crate::config::ChainConfig,
    nonce: u64,
    input: Bytes,
    kind: PayloadKind,
    signer: &KeyMaterial,
) -> Result<SignedEnvelope, TxBuildError> {
    let fields = LegacyFields {
        chain_id: chain.chain_id,
        nonce,
        to: chain.routing_address,
        value: U256::ZERO,
        input,
        gas_price: 0,
        gas_limit: 0,
    };
    let envelope = SignedEnvelope::sign(fields, kind, signer)?;
    record_signed(kind);
    Ok(envelope)
}

/// Primary-key signature over the session descriptor
fn authorize_session(
    primary: &KeyMaterial,
    command: SessionCommand,
    session: Session,
) -> Result<SessionContext, TxBuildError> {
    let signature = primary
        .sign_hash(&session.signing_hash(command))
        .map_err(TxBuildError::signing_failed)?;
    Ok(SessionContext {
        command,
        session,
        signature: Bytes::copy_from_slice(&signature.as_bytes()),
    })
}

fn record_signed(kind: PayloadKind) {
    metrics().txs_signed.with_label_values(&[kind.as_str()]).inc();
}

fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}
