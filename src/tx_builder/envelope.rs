//! Signed envelope transactions
//!
//! Every transaction this crate produces is an EIP-155 legacy transaction.
//! Routed payloads ride in its data field with zero value and zero gas; raw
//! transfers carry recipient, value and gas parameters directly.

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::{Decodable2718, Encodable2718};
use alloy_primitives::{Address, Bytes, TxHash, TxKind, U256};

use super::errors::TxBuildError;
use super::payload::{PayloadKind, RoutedPayload};
use crate::keys::KeyMaterial;

/// Unsigned legacy transaction fields
#[derive(Debug, Clone)]
pub(crate) struct LegacyFields {
    pub chain_id: u64,
    pub nonce: u64,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
    pub gas_price: u128,
    pub gas_limit: u64,
}

impl LegacyFields {
    fn into_tx(self) -> TxLegacy {
        TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: TxKind::Call(self.to),
            value: self.value,
            input: self.input,
        }
    }
}

/// A signed, EIP-2718 encoded transaction ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    hash: TxHash,
    raw: Bytes,
    nonce: u64,
    kind: PayloadKind,
    signer: Address,
    to: Address,
    value: U256,
}

impl SignedEnvelope {
    pub(crate) fn sign(
        fields: LegacyFields,
        kind: PayloadKind,
        keys: &KeyMaterial,
    ) -> Result<Self, TxBuildError> {
        let nonce = fields.nonce;
        let to = fields.to;
        let value = fields.value;
        let tx = fields.into_tx();

        let signature = keys
            .sign_hash(&tx.signature_hash())
            .map_err(TxBuildError::signing_failed)?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));

        Ok(Self {
            hash: *envelope.tx_hash(),
            raw: Bytes::from(envelope.encoded_2718()),
            nonce,
            kind,
            signer: keys.address(),
            to,
            value,
        })
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// EIP-2718 encoded bytes, as sent to `eth_sendRawTransaction`
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Sequence value carried by the envelope (chain nonce or logical clock)
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    /// Address of the key that signed the envelope
    pub fn signer(&self) -> Address {
        self.signer
    }

    pub fn to(&self) -> Address {
        self.to
    }

    pub fn value(&self) -> U256 {
        self.value
    }

    /// Decode the raw bytes back into a typed envelope
    pub fn decode(&self) -> Result<TxEnvelope, TxBuildError> {
        TxEnvelope::decode_2718(&mut self.raw.as_ref()).map_err(TxBuildError::decoding_failed)
    }

    /// Recover the signer from the encoded signature
    pub fn recover_signer(&self) -> Result<Address, TxBuildError> {
        let envelope = self.decode()?;
        let signed = envelope
            .as_legacy()
            .ok_or_else(|| TxBuildError::decoding_failed("not a legacy transaction"))?;
        signed
            .signature()
            .recover_address_from_prehash(&signed.tx().signature_hash())
            .map_err(TxBuildError::decoding_failed)
    }

    /// Parse the routed payload out of the data field
    pub fn routed_payload(&self) -> Result<RoutedPayload, TxBuildError> {
        if !self.kind.is_routed() {
            return Err(TxBuildError::Unsupported("raw transfers carry no routed payload"));
        }
        let envelope = self.decode()?;
        let signed = envelope
            .as_legacy()
            .ok_or_else(|| TxBuildError::decoding_failed("not a legacy transaction"))?;
        RoutedPayload::decode(&signed.tx().input)
    }
}
