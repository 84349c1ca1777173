//! Error taxonomy for the vault accounting core.
//!
//! Every rejected precondition gets its own variant so callers (and tests)
//! can tell *why* an operation failed, not just that it did. All errors
//! abort the operation with no state change.

use std::fmt;

use poolvault_protocol::{Address, TransferError};
use thiserror::Error;

/// Which access rule a caller broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenied {
    /// A vault mutation was invoked by someone other than its controller.
    NotController,
    /// A reserve claim was made by someone other than the vault's creator.
    NotCreator,
}

impl fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessDenied::NotController => write!(f, "please interact via the right controller"),
            AccessDenied::NotCreator => write!(f, "not your assets"),
        }
    }
}

/// Errors returned by [`Controller`](crate::Controller) and
/// [`Vault`](crate::Vault) operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Vault creation parameters are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Deposits, redemptions and share transfers must move a non-zero amount.
    #[error("invalid amount: zero-amount operations are not permitted")]
    InvalidAmount,

    /// The payout would land in the vault's own custody account, where it
    /// backs nothing and nobody can withdraw it.
    #[error("invalid receiver: {0} is the vault itself")]
    InvalidReceiver(Address),

    /// No vault is registered under this address.
    #[error("vault not found: {0}")]
    VaultNotFound(Address),

    /// `all_vaults` was asked for an index past the end of a creator's list.
    #[error("index out of range: creator {creator} has {len} vaults, asked for #{index}")]
    IndexOutOfRange {
        /// The creator whose list was queried.
        creator: Address,
        /// The requested index.
        index: usize,
        /// Length of the creator's list.
        len: usize,
    },

    /// The caller is not allowed to perform this operation.
    #[error("unauthorized: {0}")]
    Unauthorized(AccessDenied),

    /// The share owner does not hold enough shares.
    #[error("insufficient shares: balance {balance}, requested {requested}")]
    InsufficientShares {
        /// Current share balance of the owner.
        balance: u64,
        /// Shares the operation needed.
        requested: u64,
    },

    /// A third party tried to move shares beyond what the owner approved.
    #[error("insufficient share allowance: approved {allowance}, requested {requested}")]
    InsufficientAllowance {
        /// Remaining allowance.
        allowance: u64,
        /// Shares the operation needed.
        requested: u64,
    },

    /// The underlying asset movement was refused.
    #[error("asset transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    /// A ledger total would overflow `u64`.
    #[error("arithmetic overflow in vault accounting")]
    ArithmeticOverflow,
}

impl VaultError {
    /// Stable, machine-friendly name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::InvalidConfiguration(_) => "invalid_configuration",
            VaultError::InvalidAmount => "invalid_amount",
            VaultError::InvalidReceiver(_) => "invalid_receiver",
            VaultError::VaultNotFound(_) => "vault_not_found",
            VaultError::IndexOutOfRange { .. } => "index_out_of_range",
            VaultError::Unauthorized(_) => "unauthorized",
            VaultError::InsufficientShares { .. } => "insufficient_shares",
            VaultError::InsufficientAllowance { .. } => "insufficient_allowance",
            VaultError::TransferFailed(_) => "transfer_failed",
            VaultError::ArithmeticOverflow => "arithmetic_overflow",
        }
    }
}
