//! # PoolVault Contracts
//!
//! The vault accounting core. Two components, composed hierarchically:
//!
//! - **Controller** — creates vaults, keeps a per-creator registry, and is
//!   the sole authorized caller of every vault mutation.
//! - **Vault** — per-pool ledger: share issuance on deposit, proportional
//!   redemption, and the creator's fee reserve.
//!
//! ## Design Principles
//!
//! 1. All monetary operations are checked. Ratios multiply in `u128` and
//!    every division floors, so rounding dust always stays in the pool.
//! 2. The caller identity is an explicit parameter on every operation.
//!    Nothing here reads ambient state to decide who is asking.
//! 3. Operations are all-or-nothing: new totals are computed, the asset
//!    transfer runs, and only then does the ledger change.
//! 4. Every ledger type serializes (serde) for snapshots and reports. Only
//!    plain data (params, snapshots) deserializes; a live vault can only be
//!    built through the controller.

pub mod controller;
pub mod error;
pub mod shares;
pub mod vault;

pub use controller::{Controller, VaultHandle};
pub use error::{AccessDenied, VaultError};
pub use shares::ShareLedger;
pub use vault::{DepositBreakdown, Vault, VaultParams, VaultSnapshot};
