//! Share ledger: balances, supply and allowances of one vault's shares.
//!
//! Shares are plain fungible units. The ledger keeps two invariants:
//! `total_supply == sum(balances)` and no zero entries in either map, so a
//! holder disappears from `balances` once fully redeemed.

use std::collections::HashMap;

use poolvault_protocol::Address;
use serde::Serialize;

use crate::error::VaultError;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShareLedger {
    total_supply: u64,
    balances: HashMap<Address, u64>,
    /// `owner -> (spender -> remaining allowance)`.
    allowances: HashMap<Address, HashMap<Address, u64>>,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    pub fn balance_of(&self, holder: &Address) -> u64 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Number of holders with a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Iterates `(holder, balance)` pairs in no particular order.
    pub fn holders(&self) -> impl Iterator<Item = (&Address, &u64)> {
        self.balances.iter()
    }

    /// Checks that minting `amount` to `to` cannot overflow.
    pub fn check_mint(&self, to: &Address, amount: u64) -> Result<(), VaultError> {
        self.total_supply
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticOverflow)?;
        self.balance_of(to)
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Checks that `owner` holds at least `amount` shares.
    pub fn check_burn(&self, owner: &Address, amount: u64) -> Result<(), VaultError> {
        let balance = self.balance_of(owner);
        if balance < amount {
            return Err(VaultError::InsufficientShares {
                balance,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Mints `amount` shares to `to`. Returns the new balance.
    pub fn mint(&mut self, to: &Address, amount: u64) -> Result<u64, VaultError> {
        self.check_mint(to, amount)?;
        if amount == 0 {
            return Ok(self.balance_of(to));
        }
        self.total_supply += amount;
        let balance = self.balances.entry(*to).or_insert(0);
        *balance += amount;
        Ok(*balance)
    }

    /// Burns `amount` of `owner`'s shares. Returns the remaining balance.
    pub fn burn(&mut self, owner: &Address, amount: u64) -> Result<u64, VaultError> {
        self.check_burn(owner, amount)?;
        let remaining = self.balance_of(owner) - amount;
        self.set_balance(*owner, remaining);
        self.total_supply -= amount;
        Ok(remaining)
    }

    /// Moves `amount` shares from `from` to `to`. Supply is unchanged.
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: u64) -> Result<(), VaultError> {
        self.check_burn(from, amount)?;
        if from == to {
            return Ok(());
        }
        let to_balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticOverflow)?;
        let from_balance = self.balance_of(from) - amount;
        self.set_balance(*from, from_balance);
        self.set_balance(*to, to_balance);
        Ok(())
    }

    /// Overwrites the allowance `owner` grants `spender`.
    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: u64) {
        if amount == 0 {
            if let Some(m) = self.allowances.get_mut(owner) {
                m.remove(spender);
                if m.is_empty() {
                    self.allowances.remove(owner);
                }
            }
        } else {
            self.allowances
                .entry(*owner)
                .or_default()
                .insert(*spender, amount);
        }
    }

    /// Checks that `spender` may move `amount` of `owner`'s shares.
    pub fn check_allowance(
        &self,
        owner: &Address,
        spender: &Address,
        amount: u64,
    ) -> Result<(), VaultError> {
        let allowance = self.allowance(owner, spender);
        if allowance < amount {
            return Err(VaultError::InsufficientAllowance {
                allowance,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Deducts `amount` from the allowance `owner` granted `spender`.
    pub fn spend_allowance(
        &mut self,
        owner: &Address,
        spender: &Address,
        amount: u64,
    ) -> Result<(), VaultError> {
        self.check_allowance(owner, spender, amount)?;
        let remaining = self.allowance(owner, spender) - amount;
        self.approve(owner, spender, remaining);
        Ok(())
    }

    fn set_balance(&mut self, holder: Address, amount: u64) {
        if amount == 0 {
            self.balances.remove(&holder);
        } else {
            self.balances.insert(holder, amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    fn sum(ledger: &ShareLedger) -> u64 {
        ledger.holders().map(|(_, b)| *b).sum()
    }

    #[test]
    fn mint_and_burn_track_supply() {
        let mut ledger = ShareLedger::new();
        ledger.mint(&addr("a"), 100).unwrap();
        ledger.mint(&addr("b"), 50).unwrap();
        assert_eq!(ledger.total_supply(), 150);
        assert_eq!(sum(&ledger), 150);

        assert_eq!(ledger.burn(&addr("a"), 40).unwrap(), 60);
        assert_eq!(ledger.total_supply(), 110);
        assert_eq!(sum(&ledger), 110);
    }

    #[test]
    fn full_burn_removes_holder() {
        let mut ledger = ShareLedger::new();
        ledger.mint(&addr("a"), 10).unwrap();
        ledger.burn(&addr("a"), 10).unwrap();
        assert_eq!(ledger.holder_count(), 0);
        assert_eq!(ledger.total_supply(), 0);
    }

    #[test]
    fn zero_mint_creates_no_entry() {
        let mut ledger = ShareLedger::new();
        ledger.mint(&addr("a"), 0).unwrap();
        assert_eq!(ledger.holder_count(), 0);
    }

    #[test]
    fn burn_more_than_balance_rejected() {
        let mut ledger = ShareLedger::new();
        ledger.mint(&addr("a"), 10).unwrap();
        let err = ledger.burn(&addr("a"), 11).unwrap_err();
        assert!(matches!(
            err,
            VaultError::InsufficientShares {
                balance: 10,
                requested: 11
            }
        ));
        assert_eq!(ledger.total_supply(), 10);
    }

    #[test]
    fn mint_overflow_rejected() {
        let mut ledger = ShareLedger::new();
        ledger.mint(&addr("a"), u64::MAX).unwrap();
        assert!(matches!(
            ledger.mint(&addr("b"), 1),
            Err(VaultError::ArithmeticOverflow)
        ));
        assert_eq!(ledger.balance_of(&addr("b")), 0);
    }

    #[test]
    fn transfer_preserves_supply() {
        let mut ledger = ShareLedger::new();
        ledger.mint(&addr("a"), 10).unwrap();
        ledger.transfer(&addr("a"), &addr("b"), 4).unwrap();
        assert_eq!(ledger.balance_of(&addr("a")), 6);
        assert_eq!(ledger.balance_of(&addr("b")), 4);
        assert_eq!(ledger.total_supply(), 10);

        ledger.transfer(&addr("a"), &addr("a"), 6).unwrap();
        assert_eq!(ledger.balance_of(&addr("a")), 6);
    }

    #[test]
    fn allowance_spend_and_prune() {
        let mut ledger = ShareLedger::new();
        ledger.approve(&addr("a"), &addr("s"), 10);
        ledger.spend_allowance(&addr("a"), &addr("s"), 4).unwrap();
        assert_eq!(ledger.allowance(&addr("a"), &addr("s")), 6);

        let err = ledger.spend_allowance(&addr("a"), &addr("s"), 7).unwrap_err();
        assert!(matches!(
            err,
            VaultError::InsufficientAllowance {
                allowance: 6,
                requested: 7
            }
        ));

        ledger.spend_allowance(&addr("a"), &addr("s"), 6).unwrap();
        assert_eq!(ledger.allowance(&addr("a"), &addr("s")), 0);
        assert!(ledger.allowances.is_empty());
    }
}
