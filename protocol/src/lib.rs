// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # PoolVault Protocol — Shared Primitives
//!
//! Everything the vault accounting core needs from the outside world, and
//! nothing it does not:
//!
//! - **address** — 20-byte participant identities and their derivation.
//! - **asset** — the fungible-asset transfer collaborator ([`AssetLedger`])
//!   and an in-memory reference ledger.
//! - **events** — vault notifications and the append-only event log.
//! - **config** — ratios, identity formats and derivation domains.
//!
//! The accounting rules themselves live in `poolvault-contracts`.

pub mod address;
pub mod asset;
pub mod config;
pub mod events;

pub use address::{Address, AddressError};
pub use asset::{AssetBook, AssetLedger, InMemoryAssetLedger, TransferError};
pub use events::{EventLog, EventRecord, VaultEvent};
