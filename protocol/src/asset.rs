//! # Fungible Asset Ledger
//!
//! Vaults pool a fungible asset they do not own the bookkeeping for. Moving
//! that asset is delegated to an [`AssetLedger`], the only collaborator the
//! accounting core talks to:
//!
//! - [`AssetLedger::transfer_from`] pulls funds from an owner who has
//!   pre-approved the spender (deposits, where the spender is the vault).
//! - [`AssetLedger::transfer`] pays out of an account the core controls
//!   (redemptions and reserve claims, paid from the vault's own address).
//!
//! Both calls are atomic: they either move the full amount or fail without
//! touching any balance.
//!
//! [`InMemoryAssetLedger`] is the reference implementation used by the node
//! binary, the benches and the test-suites. It keeps per-asset balances and
//! allowances behind a single `parking_lot::RwLock`.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons an asset movement can be refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    /// The ledger does not know this asset.
    #[error("unknown asset: {0}")]
    UnknownAsset(Address),

    /// The source account does not hold enough of the asset.
    #[error("insufficient balance: {account} holds {balance}, needs {amount}")]
    InsufficientBalance {
        /// Account being debited.
        account: Address,
        /// Its current balance.
        balance: u64,
        /// Amount requested.
        amount: u64,
    },

    /// The spender was not approved for enough of the owner's funds.
    #[error("insufficient allowance: {spender} may spend {allowance} of {owner}'s funds, needs {amount}")]
    InsufficientAllowance {
        /// Account whose funds are being pulled.
        owner: Address,
        /// Account pulling them.
        spender: Address,
        /// Remaining approved amount.
        allowance: u64,
        /// Amount requested.
        amount: u64,
    },

    /// Crediting the destination (or minting) would overflow `u64`.
    #[error("balance overflow crediting {account}")]
    Overflow {
        /// Account being credited.
        account: Address,
    },
}

// ---------------------------------------------------------------------------
// Collaborator trait
// ---------------------------------------------------------------------------

/// Transfer service for the pooled fungible assets.
///
/// Implementations must be atomic per call and safe to share across threads.
pub trait AssetLedger: Send + Sync {
    /// Moves `amount` of `asset` from `owner` to `to`, spending the allowance
    /// `owner` granted to `spender`.
    fn transfer_from(
        &self,
        asset: &Address,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), TransferError>;

    /// Moves `amount` of `asset` from `from` to `to`. The caller is trusted
    /// to control `from`.
    fn transfer(
        &self,
        asset: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), TransferError>;

    /// Current balance of `account` in `asset`. Unknown assets read as zero.
    fn balance_of(&self, asset: &Address, account: &Address) -> u64;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Balances and allowances of a single asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetBook {
    /// Circulating supply.
    pub total_supply: u64,
    /// `account -> balance`. Zero balances are pruned.
    pub balances: HashMap<Address, u64>,
    /// `owner -> (spender -> remaining allowance)`.
    pub allowances: HashMap<Address, HashMap<Address, u64>>,
}

impl AssetBook {
    fn balance(&self, account: &Address) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    fn set_balance(&mut self, account: Address, amount: u64) {
        if amount == 0 {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, amount);
        }
    }

    fn set_allowance(&mut self, owner: Address, spender: Address, amount: u64) {
        if amount == 0 {
            if let Some(m) = self.allowances.get_mut(&owner) {
                m.remove(&spender);
                if m.is_empty() {
                    self.allowances.remove(&owner);
                }
            }
        } else {
            self.allowances.entry(owner).or_default().insert(spender, amount);
        }
    }

    /// Validates a move and returns the post-move balances without applying
    /// them, so callers can check every precondition before the first write.
    fn plan_move(
        &self,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(u64, u64), TransferError> {
        let from_balance = self.balance(from);
        if from_balance < amount {
            return Err(TransferError::InsufficientBalance {
                account: *from,
                balance: from_balance,
                amount,
            });
        }
        if from == to {
            return Ok((from_balance, from_balance));
        }
        let to_balance = self
            .balance(to)
            .checked_add(amount)
            .ok_or(TransferError::Overflow { account: *to })?;
        Ok((from_balance - amount, to_balance))
    }

    fn apply_move(&mut self, from: &Address, to: &Address, planned: (u64, u64)) {
        if from == to {
            return;
        }
        self.set_balance(*from, planned.0);
        self.set_balance(*to, planned.1);
    }
}

/// Thread-safe, in-process [`AssetLedger`].
#[derive(Debug, Default)]
pub struct InMemoryAssetLedger {
    books: RwLock<HashMap<Address, AssetBook>>,
}

impl InMemoryAssetLedger {
    /// Creates a ledger with no registered assets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `asset` with an empty book. Returns `false` if it already
    /// existed (the existing book is left untouched).
    pub fn register_asset(&self, asset: Address) -> bool {
        let mut books = self.books.write();
        if books.contains_key(&asset) {
            return false;
        }
        books.insert(asset, AssetBook::default());
        tracing::debug!(asset = %asset, "asset registered");
        true
    }

    /// Returns `true` if `asset` is registered.
    pub fn has_asset(&self, asset: &Address) -> bool {
        self.books.read().contains_key(asset)
    }

    /// Creates `amount` new units of `asset` in `to`'s account.
    pub fn mint(&self, asset: &Address, to: &Address, amount: u64) -> Result<u64, TransferError> {
        let mut books = self.books.write();
        let book = books
            .get_mut(asset)
            .ok_or(TransferError::UnknownAsset(*asset))?;
        let supply = book
            .total_supply
            .checked_add(amount)
            .ok_or(TransferError::Overflow { account: *to })?;
        let balance = book
            .balance(to)
            .checked_add(amount)
            .ok_or(TransferError::Overflow { account: *to })?;
        book.total_supply = supply;
        book.set_balance(*to, balance);
        Ok(balance)
    }

    /// Sets (overwrites) the allowance `owner` grants `spender` over `asset`.
    pub fn approve(
        &self,
        asset: &Address,
        owner: &Address,
        spender: &Address,
        amount: u64,
    ) -> Result<(), TransferError> {
        let mut books = self.books.write();
        let book = books
            .get_mut(asset)
            .ok_or(TransferError::UnknownAsset(*asset))?;
        book.set_allowance(*owner, *spender, amount);
        Ok(())
    }

    /// Remaining allowance `owner` granted `spender` over `asset`.
    pub fn allowance(&self, asset: &Address, owner: &Address, spender: &Address) -> u64 {
        self.books
            .read()
            .get(asset)
            .map(|b| b.allowance(owner, spender))
            .unwrap_or(0)
    }

    /// Circulating supply of `asset`, or 0 if unknown.
    pub fn total_supply(&self, asset: &Address) -> u64 {
        self.books
            .read()
            .get(asset)
            .map(|b| b.total_supply)
            .unwrap_or(0)
    }

    /// Copy of the book for `asset`, for reports and debugging.
    pub fn book(&self, asset: &Address) -> Option<AssetBook> {
        self.books.read().get(asset).cloned()
    }
}

impl AssetLedger for InMemoryAssetLedger {
    fn transfer_from(
        &self,
        asset: &Address,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), TransferError> {
        let mut books = self.books.write();
        let book = books
            .get_mut(asset)
            .ok_or(TransferError::UnknownAsset(*asset))?;

        let allowance = book.allowance(owner, spender);
        if allowance < amount {
            return Err(TransferError::InsufficientAllowance {
                owner: *owner,
                spender: *spender,
                allowance,
                amount,
            });
        }
        let planned = book.plan_move(owner, to, amount)?;

        book.set_allowance(*owner, *spender, allowance - amount);
        book.apply_move(owner, to, planned);
        Ok(())
    }

    fn transfer(
        &self,
        asset: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), TransferError> {
        let mut books = self.books.write();
        let book = books
            .get_mut(asset)
            .ok_or(TransferError::UnknownAsset(*asset))?;
        let planned = book.plan_move(from, to, amount)?;
        book.apply_move(from, to, planned);
        Ok(())
    }

    fn balance_of(&self, asset: &Address, account: &Address) -> u64 {
        self.books
            .read()
            .get(asset)
            .map(|b| b.balance(account))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (InMemoryAssetLedger, Address, Address, Address) {
        let ledger = InMemoryAssetLedger::new();
        let asset = Address::from_label("tusdt");
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        assert!(ledger.register_asset(asset));
        ledger.mint(&asset, &alice, 1_000).unwrap();
        (ledger, asset, alice, bob)
    }

    #[test]
    fn register_is_idempotent() {
        let (ledger, asset, alice, _) = setup();
        assert!(!ledger.register_asset(asset));
        assert_eq!(ledger.balance_of(&asset, &alice), 1_000);
    }

    #[test]
    fn mint_updates_supply_and_balance() {
        let (ledger, asset, alice, bob) = setup();
        ledger.mint(&asset, &bob, 250).unwrap();
        assert_eq!(ledger.total_supply(&asset), 1_250);
        assert_eq!(ledger.balance_of(&asset, &alice), 1_000);
        assert_eq!(ledger.balance_of(&asset, &bob), 250);
    }

    #[test]
    fn mint_unknown_asset_rejected() {
        let ledger = InMemoryAssetLedger::new();
        let ghost = Address::from_label("ghost");
        let result = ledger.mint(&ghost, &Address::from_label("alice"), 1);
        assert_eq!(result, Err(TransferError::UnknownAsset(ghost)));
    }

    #[test]
    fn mint_overflow_rejected() {
        let (ledger, asset, alice, _) = setup();
        let result = ledger.mint(&asset, &alice, u64::MAX);
        assert!(matches!(result, Err(TransferError::Overflow { .. })));
        assert_eq!(ledger.balance_of(&asset, &alice), 1_000);
    }

    #[test]
    fn transfer_moves_funds() {
        let (ledger, asset, alice, bob) = setup();
        ledger.transfer(&asset, &alice, &bob, 400).unwrap();
        assert_eq!(ledger.balance_of(&asset, &alice), 600);
        assert_eq!(ledger.balance_of(&asset, &bob), 400);
        assert_eq!(ledger.total_supply(&asset), 1_000);
    }

    #[test]
    fn transfer_insufficient_balance_leaves_state() {
        let (ledger, asset, alice, bob) = setup();
        let err = ledger.transfer(&asset, &bob, &alice, 1).unwrap_err();
        assert!(matches!(err, TransferError::InsufficientBalance { balance: 0, .. }));
        assert_eq!(ledger.balance_of(&asset, &alice), 1_000);
    }

    #[test]
    fn transfer_to_self_is_noop() {
        let (ledger, asset, alice, _) = setup();
        ledger.transfer(&asset, &alice, &alice, 500).unwrap();
        assert_eq!(ledger.balance_of(&asset, &alice), 1_000);
    }

    #[test]
    fn transfer_from_spends_allowance() {
        let (ledger, asset, alice, bob) = setup();
        let vault = Address::from_label("vault");
        ledger.approve(&asset, &alice, &vault, 700).unwrap();

        ledger.transfer_from(&asset, &vault, &alice, &vault, 300).unwrap();
        assert_eq!(ledger.balance_of(&asset, &vault), 300);
        assert_eq!(ledger.allowance(&asset, &alice, &vault), 400);

        // The allowance is bound to the spender, not to whoever calls.
        let err = ledger
            .transfer_from(&asset, &bob, &alice, &bob, 1)
            .unwrap_err();
        assert!(matches!(err, TransferError::InsufficientAllowance { allowance: 0, .. }));
    }

    #[test]
    fn transfer_from_is_all_or_nothing() {
        let (ledger, asset, alice, _) = setup();
        let vault = Address::from_label("vault");
        ledger.approve(&asset, &alice, &vault, 5_000).unwrap();

        let err = ledger
            .transfer_from(&asset, &vault, &alice, &vault, 2_000)
            .unwrap_err();
        assert!(matches!(err, TransferError::InsufficientBalance { .. }));
        assert_eq!(ledger.allowance(&asset, &alice, &vault), 5_000);
        assert_eq!(ledger.balance_of(&asset, &alice), 1_000);
        assert_eq!(ledger.balance_of(&asset, &vault), 0);
    }

    #[test]
    fn zero_allowance_is_pruned() {
        let (ledger, asset, alice, bob) = setup();
        ledger.approve(&asset, &alice, &bob, 10).unwrap();
        ledger.approve(&asset, &alice, &bob, 0).unwrap();
        let book = ledger.book(&asset).unwrap();
        assert!(book.allowances.is_empty());
    }

    #[test]
    fn unknown_asset_reads_zero() {
        let ledger = InMemoryAssetLedger::new();
        let ghost = Address::from_label("ghost");
        let alice = Address::from_label("alice");
        assert_eq!(ledger.balance_of(&ghost, &alice), 0);
        assert_eq!(ledger.total_supply(&ghost), 0);
        assert!(!ledger.has_asset(&ghost));
    }
}
