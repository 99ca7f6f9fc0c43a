//! Routed payload wire format
//!
//! A routed payload travels in the data field of an envelope addressed to the
//! routing contract. The encoding is one type byte followed by the JSON
//! context (camelCase field names, 256-bit quantities as `0x` hex strings).

use alloy_primitives::{keccak256, Address, Bytes, Signature, B256, U256};
use serde::{Deserialize, Serialize};

use super::errors::TxBuildError;
use super::order::{OrderType, Side, TpslParams};

/// Leading type byte of a routed payload
pub mod type_code {
    pub const SESSION: u8 = 0x01;
    pub const TRANSFER: u8 = 0x02;
    pub const TOKEN_TRANSFER: u8 = 0x11;
    pub const NEW_ORDER: u8 = 0x21;
    pub const CANCEL: u8 = 0x22;
    pub const CANCEL_ALL: u8 = 0x23;
    pub const MODIFY: u8 = 0x24;
    pub const STOP_ORDER: u8 = 0x25;
}

/// What a signed envelope carries, used for logs and metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    ValueTransfer,
    TokenTransfer,
    NewOrder,
    NewOrderWithTpsl,
    NewStopOrder,
    CancelAll,
    SessionCreate,
    SessionDelete,
    RawLegacyTransfer,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::ValueTransfer => "value_transfer",
            PayloadKind::TokenTransfer => "token_transfer",
            PayloadKind::NewOrder => "new_order",
            PayloadKind::NewOrderWithTpsl => "new_order_tpsl",
            PayloadKind::NewStopOrder => "stop_order",
            PayloadKind::CancelAll => "cancel_all",
            PayloadKind::SessionCreate => "session_create",
            PayloadKind::SessionDelete => "session_delete",
            PayloadKind::RawLegacyTransfer => "raw_legacy_transfer",
        }
    }

    /// Routed kinds use the logical clock; the raw transfer uses the chain sequence
    pub fn is_routed(&self) -> bool {
        !matches!(self, PayloadKind::RawLegacyTransfer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferContext {
    pub owner: Address,
    pub to: Address,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransferContext {
    pub owner: Address,
    pub to: Address,
    pub token: String,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderContext {
    pub owner: Address,
    pub base_token: String,
    pub quote_token: String,
    pub side: Side,
    pub price: U256,
    pub quantity: U256,
    pub order_type: OrderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpsl: Option<TpslParams>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopOrderContext {
    #[serde(flatten)]
    pub order: OrderContext,
    pub stop_price: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAllContext {
    pub owner: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SessionCommand {
    Create = 0,
    Delete = 1,
}

impl From<SessionCommand> for u8 {
    fn from(command: SessionCommand) -> u8 {
        command as u8
    }
}

impl TryFrom<u8> for SessionCommand {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SessionCommand::Create),
            1 => Ok(SessionCommand::Delete),
            other => Err(format!("unknown session command {other}")),
        }
    }
}

/// Session descriptor authorised by the account's primary key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub owner: Address,
    /// Address of the delegated session key
    pub public_key: Address,
    /// Unix seconds
    pub expiry: u64,
    pub nonce: u64,
}

impl Session {
    /// Prehash the primary key signs: keccak256(owner ‖ publicKey ‖ expiry ‖ nonce ‖ command)
    pub fn signing_hash(&self, command: SessionCommand) -> B256 {
        let mut buf = Vec::with_capacity(20 + 20 + 8 + 8 + 1);
        buf.extend_from_slice(self.owner.as_slice());
        buf.extend_from_slice(self.public_key.as_slice());
        buf.extend_from_slice(&self.expiry.to_be_bytes());
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.push(u8::from(command));
        keccak256(&buf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub command: SessionCommand,
    pub session: Session,
    /// 65-byte primary-key signature over [`Session::signing_hash`]
    pub signature: Bytes,
}

impl SessionContext {
    /// Recover the address that authorised this session action
    pub fn recover_authority(&self) -> Result<Address, TxBuildError> {
        let signature = Signature::try_from(self.signature.as_ref())
            .map_err(TxBuildError::decoding_failed)?;
        signature
            .recover_address_from_prehash(&self.session.signing_hash(self.command))
            .map_err(TxBuildError::decoding_failed)
    }
}

/// Application-level instruction carried inside a routed envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutedPayload {
    Session(SessionContext),
    Transfer(TransferContext),
    TokenTransfer(TokenTransferContext),
    NewOrder(OrderContext),
    CancelAll(CancelAllContext),
    StopOrder(StopOrderContext),
}

impl RoutedPayload {
    pub fn type_code(&self) -> u8 {
        match self {
            RoutedPayload::Session(_) => type_code::SESSION,
            RoutedPayload::Transfer(_) => type_code::TRANSFER,
            RoutedPayload::TokenTransfer(_) => type_code::TOKEN_TRANSFER,
            RoutedPayload::NewOrder(_) => type_code::NEW_ORDER,
            RoutedPayload::CancelAll(_) => type_code::CANCEL_ALL,
            RoutedPayload::StopOrder(_) => type_code::STOP_ORDER,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RoutedPayload::Session(_) => "session",
            RoutedPayload::Transfer(_) => "transfer",
            RoutedPayload::TokenTransfer(_) => "token_transfer",
            RoutedPayload::NewOrder(_) => "new_order",
            RoutedPayload::CancelAll(_) => "cancel_all",
            RoutedPayload::StopOrder(_) => "stop_order",
        }
    }

    /// `[type byte] ++ JSON(context)`
    pub fn encode(&self) -> Result<Bytes, TxBuildError> {
        let mut out = vec![self.type_code()];
        let written = match self {
            RoutedPayload::Session(ctx) => serde_json::to_writer(&mut out, ctx),
            RoutedPayload::Transfer(ctx) => serde_json::to_writer(&mut out, ctx),
            RoutedPayload::TokenTransfer(ctx) => serde_json::to_writer(&mut out, ctx),
            RoutedPayload::NewOrder(ctx) => serde_json::to_writer(&mut out, ctx),
            RoutedPayload::CancelAll(ctx) => serde_json::to_writer(&mut out, ctx),
            RoutedPayload::StopOrder(ctx) => serde_json::to_writer(&mut out, ctx),
        };
        written.map_err(|e| TxBuildError::encoding_failed(self.label(), e))?;
        Ok(Bytes::from(out))
    }

    pub fn decode(data: &[u8]) -> Result<Self, TxBuildError> {
        let (&code, body) = data
            .split_first()
            .ok_or_else(|| TxBuildError::decoding_failed("empty payload"))?;

        let decoded = match code {
            type_code::SESSION => serde_json::from_slice(body).map(RoutedPayload::Session),
            type_code::TRANSFER => serde_json::from_slice(body).map(RoutedPayload::Transfer),
            type_code::TOKEN_TRANSFER => {
                serde_json::from_slice(body).map(RoutedPayload::TokenTransfer)
            }
            type_code::NEW_ORDER => serde_json::from_slice(body).map(RoutedPayload::NewOrder),
            type_code::CANCEL_ALL => serde_json::from_slice(body).map(RoutedPayload::CancelAll),
            type_code::STOP_ORDER => serde_json::from_slice(body).map(RoutedPayload::StopOrder),
            other => {
                return Err(TxBuildError::decoding_failed(format!(
                    "unsupported type code 0x{other:02x}"
                )))
            }
        };
        decoded.map_err(TxBuildError::decoding_failed)
    }
}
