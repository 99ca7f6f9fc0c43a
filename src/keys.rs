//! Key material for load-test accounts
//!
//! Every account owns a secp256k1 signing key. Keys come from three places:
//! freshly generated at random, deterministically generated from a seed (tests
//! and reproducible runs), or imported from a hex-encoded secret (the funded
//! "rich" account and snapshot restores).
//!
//! Secret bytes never leave this module except through [`KeyMaterial::to_hex`],
//! which returns a zeroizing buffer for snapshot persistence.

use alloy_primitives::{Address, Signature, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

/// Raw secret length in bytes
pub const PRIVATE_KEY_LEN: usize = 32;

/// Secret length in hex characters, without the `0x` prefix
pub const PRIVATE_KEY_HEX_LEN: usize = PRIVATE_KEY_LEN * 2;

/// Errors raised while importing key material
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid private key length: expected {expected} hex chars, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid private key hex: {0}")]
    InvalidHex(String),

    #[error("Invalid secp256k1 secret: {0}")]
    InvalidScalar(String),
}

impl KeyError {
    pub fn category(&self) -> &'static str {
        match self {
            KeyError::InvalidLength { .. } => "key_length",
            KeyError::InvalidHex(_) => "key_hex",
            KeyError::InvalidScalar(_) => "key_scalar",
        }
    }
}

/// A signing key and the address derived from it
#[derive(Clone)]
pub struct KeyMaterial {
    signer: PrivateKeySigner,
}

impl KeyMaterial {
    /// Generate a key from the OS random source
    pub fn generate() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    /// Generate a key deterministically from `seed`
    ///
    /// The same seed always yields the same key. Candidate scalars outside the
    /// curve order are skipped, so the loop terminates with overwhelming
    /// probability on the first draw.
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        loop {
            let mut bytes = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
            rng.fill_bytes(bytes.as_mut());
            if let Ok(signer) = PrivateKeySigner::from_slice(bytes.as_ref()) {
                return Self { signer };
            }
        }
    }

    /// Import a key from a hex string, with or without a `0x` prefix
    pub fn from_hex(secret: &str) -> Result<Self, KeyError> {
        let trimmed = secret.trim();
        let stripped = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if stripped.len() != PRIVATE_KEY_HEX_LEN {
            return Err(KeyError::InvalidLength {
                expected: PRIVATE_KEY_HEX_LEN,
                actual: stripped.len(),
            });
        }

        let bytes =
            Zeroizing::new(hex::decode(stripped).map_err(|e| KeyError::InvalidHex(e.to_string()))?);
        Self::from_bytes(&bytes)
    }

    /// Import a key from raw secret bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != PRIVATE_KEY_LEN {
            return Err(KeyError::InvalidLength {
                expected: PRIVATE_KEY_HEX_LEN,
                actual: bytes.len() * 2,
            });
        }
        if bytes.iter().all(|&b| b == 0) {
            return Err(KeyError::InvalidScalar("all-zero key rejected".to_string()));
        }

        PrivateKeySigner::from_slice(bytes)
            .map(|signer| Self { signer })
            .map_err(|e| KeyError::InvalidScalar(e.to_string()))
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign a 32-byte prehash
    pub fn sign_hash(&self, hash: &B256) -> Result<Signature, alloy_signer::Error> {
        self.signer.sign_hash_sync(hash)
    }

    /// `0x`-prefixed, 64 hex char secret
    pub fn to_hex(&self) -> Zeroizing<String> {
        let bytes = Zeroizing::new(self.signer.to_bytes().0);
        Zeroizing::new(format!("0x{}", hex::encode(bytes.as_ref())))
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
