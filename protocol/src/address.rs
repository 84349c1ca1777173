//! # Addresses
//!
//! Every participant in PoolVault (depositors, vault creators, the controller,
//! each vault and each pooled asset) is identified by an [`Address`]: 20
//! opaque bytes, printed as `0x`-prefixed lowercase hex.
//!
//! The accounting core never authenticates anyone. The host hands it an
//! already-authenticated caller `Address` and the core compares identities,
//! nothing more.
//!
//! ## Derivation
//!
//! Vaults and controllers get deterministic addresses from
//! [`Address::derive`]: BLAKE3 over a domain tag followed by length-prefixed
//! parts, truncated to [`ADDRESS_LENGTH`] bytes. Length prefixes keep
//! `("ab", "c")` and `("a", "bc")` from hashing to the same address.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::config::{ADDRESS_LENGTH, ADDRESS_PREFIX, LABEL_ADDRESS_DOMAIN};

/// Errors produced when parsing an address from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The string is missing the `0x` prefix.
    #[error("address must start with '0x': {0}")]
    MissingPrefix(String),

    /// The hex payload is not valid hex.
    #[error("invalid hex in address: {0}")]
    InvalidHex(String),

    /// The decoded payload has the wrong length.
    #[error("address must be {expected} bytes, got {got}")]
    InvalidLength {
        /// Required byte length.
        expected: usize,
        /// Decoded byte length.
        got: usize,
    },
}

/// A 20-byte participant identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The all-zero address. Treated as "no identity" wherever an identity is
    /// required (e.g. the asset of a vault).
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    /// Wraps raw bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Returns `true` for [`Address::ZERO`].
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// Derives an address from a domain tag and an ordered list of parts.
    pub fn derive(domain: &str, parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(domain.len() as u64).to_le_bytes());
        hasher.update(domain.as_bytes());
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest.as_bytes()[..ADDRESS_LENGTH]);
        Self(bytes)
    }

    /// Deterministic address for a human-readable label.
    ///
    /// Handy for scenarios and tests: `Address::from_label("alice")` is the
    /// same identity in every run.
    pub fn from_label(label: &str) -> Self {
        Self::derive(LABEL_ADDRESS_DOMAIN, &[label.as_bytes()])
    }

    /// Lowercase hex with the `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("{ADDRESS_PREFIX}{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let payload = s
            .strip_prefix(ADDRESS_PREFIX)
            .ok_or_else(|| AddressError::MissingPrefix(s.to_string()))?;
        let decoded = hex::decode(payload).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        let bytes: [u8; ADDRESS_LENGTH] =
            decoded
                .as_slice()
                .try_into()
                .map_err(|_| AddressError::InvalidLength {
                    expected: ADDRESS_LENGTH,
                    got: decoded.len(),
                })?;
        Ok(Self(bytes))
    }
}

// The textual form doubles as the serde form so addresses work as JSON map
// keys (share balances, per-creator registries).
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
