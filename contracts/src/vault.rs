//! # Vault Ledger
//!
//! A [`Vault`] pools one fungible asset and keeps three books:
//!
//! 1. **Share pool** — `total_share_pool_assets`, the assets backing the
//!    outstanding shares.
//! 2. **Shares** — who holds how many, plus share allowances.
//! 3. **Reserve** — the creator's cut of every deposit, claimable on demand
//!    and never counted as backing for shares.
//!
//! ## Deposit arithmetic
//!
//! For a deposit of `amount` (all divisions floor):
//!
//! ```text
//! pool     = amount * share_pool_ratio / 100
//! reserve  = amount - pool
//! raw      = pool                                  if total_supply == 0
//!          = pool * total_supply / total_pool      otherwise
//! minted   = raw * share_dilute_ratio / 100
//! ```
//!
//! The diluted-away part of `raw` is minted to nobody. It stays in the pool
//! and raises the value of every share already outstanding.
//!
//! ## Access control
//!
//! Every mutating entry point takes the caller identity and rejects anyone
//! but the controller the vault was bound to at creation. Reads are open.
//!
//! ## Atomicity
//!
//! Mutations compute every new total first (checked, u128 intermediates),
//! then perform the asset transfer, and only then commit. A failed transfer
//! leaves the vault exactly as it was.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use poolvault_protocol::config::{MAX_RATIO, RATIO_DENOMINATOR};
use poolvault_protocol::{Address, AssetLedger};
use serde::{Deserialize, Serialize};

use crate::error::{AccessDenied, VaultError};
use crate::shares::ShareLedger;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Creation parameters for a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultParams {
    /// The pooled fungible asset.
    pub asset: Address,
    /// Display name of the share token. Opaque to the accounting.
    pub name: String,
    /// Display symbol of the share token. Opaque to the accounting.
    pub symbol: String,
    /// Percentage of each deposit routed into the share pool; the rest goes
    /// to the creator's reserve.
    pub share_pool_ratio: u8,
    /// Percentage of a depositor's proportional entitlement actually minted.
    pub share_dilute_ratio: u8,
}

impl VaultParams {
    /// Checks ratio bounds and that an asset is set.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfiguration`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.asset.is_zero() {
            return Err(VaultError::InvalidConfiguration(
                "asset must not be the zero address".into(),
            ));
        }
        if self.share_pool_ratio > MAX_RATIO {
            return Err(VaultError::InvalidConfiguration(format!(
                "share_pool_ratio must be in 0..={MAX_RATIO}, got {}",
                self.share_pool_ratio
            )));
        }
        if self.share_dilute_ratio > MAX_RATIO {
            return Err(VaultError::InvalidConfiguration(format!(
                "share_dilute_ratio must be in 0..={MAX_RATIO}, got {}",
                self.share_dilute_ratio
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// How a deposit splits and how many shares it mints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositBreakdown {
    /// Amount deposited.
    pub amount: u64,
    /// Part routed into the share pool.
    pub pool_contribution: u64,
    /// Part routed into the creator's reserve.
    pub reserve_contribution: u64,
    /// Proportional entitlement before dilution.
    pub raw_shares: u64,
    /// Shares actually minted to the receiver.
    pub shares_minted: u64,
}

/// Point-in-time copy of a vault's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    pub address: Address,
    pub asset: Address,
    pub creator: Address,
    pub controller: Address,
    pub name: String,
    pub symbol: String,
    pub share_pool_ratio: u8,
    pub share_dilute_ratio: u8,
    pub total_share_pool_assets: u64,
    pub total_supply: u64,
    pub reserve_balance: u64,
    /// Share balances, sorted by holder for stable output.
    pub holders: BTreeMap<Address, u64>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Per-pool share and reserve ledger.
///
/// A vault is passive: it never calls out on its own and every mutation must
/// arrive through its controller.
///
/// Serializable for reports, but never deserialized: the only way to build
/// one is [`Controller::create_vault`](crate::Controller::create_vault),
/// which validates its parameters.
#[derive(Debug, Clone, Serialize)]
pub struct Vault {
    address: Address,
    asset: Address,
    creator: Address,
    controller: Address,
    name: String,
    symbol: String,
    share_pool_ratio: u8,
    share_dilute_ratio: u8,
    total_share_pool_assets: u64,
    reserve_balance: u64,
    shares: ShareLedger,
    created_at: DateTime<Utc>,
}

impl Vault {
    /// Creates an empty vault bound to `controller`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfiguration`] if `params` fail
    /// [`VaultParams::validate`].
    pub(crate) fn new(
        address: Address,
        controller: Address,
        creator: Address,
        params: VaultParams,
    ) -> Result<Self, VaultError> {
        params.validate()?;
        Ok(Self {
            address,
            asset: params.asset,
            creator,
            controller,
            name: params.name,
            symbol: params.symbol,
            share_pool_ratio: params.share_pool_ratio,
            share_dilute_ratio: params.share_dilute_ratio,
            total_share_pool_assets: 0,
            reserve_balance: 0,
            shares: ShareLedger::new(),
            created_at: Utc::now(),
        })
    }

    // -- reads --------------------------------------------------------------

    /// The vault's own identity; also its custody account in the asset ledger.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn asset(&self) -> Address {
        self.asset
    }

    pub fn creator(&self) -> Address {
        self.creator
    }

    /// The only identity allowed to mutate this vault.
    pub fn controller(&self) -> Address {
        self.controller
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn share_pool_ratio(&self) -> u8 {
        self.share_pool_ratio
    }

    pub fn share_dilute_ratio(&self) -> u8 {
        self.share_dilute_ratio
    }

    /// Assets backing the outstanding shares.
    pub fn total_share_pool_assets(&self) -> u64 {
        self.total_share_pool_assets
    }

    /// Outstanding shares.
    pub fn total_supply(&self) -> u64 {
        self.shares.total_supply()
    }

    pub fn balance_of(&self, holder: &Address) -> u64 {
        self.shares.balance_of(holder)
    }

    /// Shares `spender` may still redeem or move on `owner`'s behalf.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.shares.allowance(owner, spender)
    }

    /// Creator-claimable balance.
    pub fn reserve_balance(&self) -> u64 {
        self.reserve_balance
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn snapshot(&self) -> VaultSnapshot {
        VaultSnapshot {
            address: self.address,
            asset: self.asset,
            creator: self.creator,
            controller: self.controller,
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            share_pool_ratio: self.share_pool_ratio,
            share_dilute_ratio: self.share_dilute_ratio,
            total_share_pool_assets: self.total_share_pool_assets,
            total_supply: self.shares.total_supply(),
            reserve_balance: self.reserve_balance,
            holders: self.shares.holders().map(|(a, b)| (*a, *b)).collect(),
            created_at: self.created_at,
        }
    }

    // -- previews -----------------------------------------------------------

    /// Computes what a deposit of `amount` would do right now, without
    /// changing anything.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidAmount`] for zero, [`VaultError::ArithmeticOverflow`]
    /// if the entitlement does not fit in `u64`.
    pub fn preview_deposit(&self, amount: u64) -> Result<DepositBreakdown, VaultError> {
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }
        let pool_contribution =
            mul_div_floor(amount, self.share_pool_ratio as u64, RATIO_DENOMINATOR)?;
        let reserve_contribution = amount
            .checked_sub(pool_contribution)
            .ok_or(VaultError::ArithmeticOverflow)?;

        let supply = self.shares.total_supply();
        // An empty pool with live shares cannot arise from deposit/redeem, but
        // bootstrapping is the only sane reading if it ever does.
        let raw_shares = if supply == 0 || self.total_share_pool_assets == 0 {
            pool_contribution
        } else {
            mul_div_floor(pool_contribution, supply, self.total_share_pool_assets)?
        };
        let shares_minted =
            mul_div_floor(raw_shares, self.share_dilute_ratio as u64, RATIO_DENOMINATOR)?;

        Ok(DepositBreakdown {
            amount,
            pool_contribution,
            reserve_contribution,
            raw_shares,
            shares_minted,
        })
    }

    /// Pool assets `shares` would redeem for right now.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidAmount`] for zero.
    pub fn preview_redeem(&self, shares: u64) -> Result<u64, VaultError> {
        if shares == 0 {
            return Err(VaultError::InvalidAmount);
        }
        let supply = self.shares.total_supply();
        if supply == 0 {
            return Ok(0);
        }
        mul_div_floor(shares, self.total_share_pool_assets, supply)
    }

    // -- controller-gated mutations ------------------------------------------

    /// Pulls `amount` of the asset from `source_owner` and mints shares to
    /// `receiver`.
    ///
    /// `source_owner` must have approved this vault's address (not the
    /// controller) to move the funds.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Unauthorized`] unless `caller` is the controller.
    /// - [`VaultError::InvalidAmount`] for a zero amount.
    /// - [`VaultError::ArithmeticOverflow`] if a total would overflow.
    /// - [`VaultError::TransferFailed`] if the asset pull is refused.
    pub fn deposit_for(
        &mut self,
        caller: &Address,
        ledger: &dyn AssetLedger,
        amount: u64,
        receiver: &Address,
        source_owner: &Address,
    ) -> Result<DepositBreakdown, VaultError> {
        self.ensure_controller(caller)?;
        let breakdown = self.preview_deposit(amount)?;

        let new_pool = self
            .total_share_pool_assets
            .checked_add(breakdown.pool_contribution)
            .ok_or(VaultError::ArithmeticOverflow)?;
        let new_reserve = self
            .reserve_balance
            .checked_add(breakdown.reserve_contribution)
            .ok_or(VaultError::ArithmeticOverflow)?;
        self.shares.check_mint(receiver, breakdown.shares_minted)?;

        ledger.transfer_from(&self.asset, &self.address, source_owner, &self.address, amount)?;

        self.shares.mint(receiver, breakdown.shares_minted)?;
        self.total_share_pool_assets = new_pool;
        self.reserve_balance = new_reserve;

        tracing::debug!(
            vault = %self.address,
            amount,
            pool = breakdown.pool_contribution,
            reserve = breakdown.reserve_contribution,
            raw_shares = breakdown.raw_shares,
            minted = breakdown.shares_minted,
            "deposit committed"
        );
        Ok(breakdown)
    }

    /// Burns `shares` of `owner` and pays the proportional pool assets to
    /// `receiver`. Returns the assets paid.
    ///
    /// Allowance checks for third-party redemption are the controller's job;
    /// this only checks that `owner` holds the shares.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Unauthorized`] unless `caller` is the controller.
    /// - [`VaultError::InvalidAmount`] for zero shares.
    /// - [`VaultError::InvalidReceiver`] if `receiver` is the vault itself.
    /// - [`VaultError::InsufficientShares`] if `owner` holds fewer than `shares`.
    /// - [`VaultError::TransferFailed`] if the payout is refused.
    pub fn redeem_for(
        &mut self,
        caller: &Address,
        ledger: &dyn AssetLedger,
        shares: u64,
        receiver: &Address,
        owner: &Address,
    ) -> Result<u64, VaultError> {
        self.ensure_controller(caller)?;
        if shares == 0 {
            return Err(VaultError::InvalidAmount);
        }
        if receiver == &self.address {
            return Err(VaultError::InvalidReceiver(*receiver));
        }
        self.shares.check_burn(owner, shares)?;
        let assets_out = self.preview_redeem(shares)?;

        if assets_out > 0 {
            ledger.transfer(&self.asset, &self.address, receiver, assets_out)?;
        }

        self.shares.burn(owner, shares)?;
        // assets_out <= total_share_pool_assets because shares <= total_supply.
        self.total_share_pool_assets -= assets_out;

        tracing::debug!(
            vault = %self.address,
            shares,
            assets_out,
            remaining_pool = self.total_share_pool_assets,
            remaining_supply = self.shares.total_supply(),
            "redeem committed"
        );
        Ok(assets_out)
    }

    /// Pays the whole reserve to `recipient` and zeroes it. Returns the amount
    /// paid, which is 0 (and not an error) when the reserve is empty.
    ///
    /// The controller has already checked that `recipient` is the creator.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Unauthorized`] unless `caller` is the controller.
    /// - [`VaultError::TransferFailed`] if the payout is refused.
    pub fn claim_reserve(
        &mut self,
        caller: &Address,
        ledger: &dyn AssetLedger,
        recipient: &Address,
    ) -> Result<u64, VaultError> {
        self.ensure_controller(caller)?;
        let amount = self.reserve_balance;
        if amount > 0 {
            ledger.transfer(&self.asset, &self.address, recipient, amount)?;
        }
        self.reserve_balance = 0;
        Ok(amount)
    }

    /// Sets the share allowance `owner` grants `spender`.
    pub fn approve_for(
        &mut self,
        caller: &Address,
        owner: &Address,
        spender: &Address,
        amount: u64,
    ) -> Result<(), VaultError> {
        self.ensure_controller(caller)?;
        self.shares.approve(owner, spender, amount);
        Ok(())
    }

    /// Deducts `amount` from the share allowance `owner` granted `spender`.
    pub fn spend_allowance(
        &mut self,
        caller: &Address,
        owner: &Address,
        spender: &Address,
        amount: u64,
    ) -> Result<(), VaultError> {
        self.ensure_controller(caller)?;
        self.shares.spend_allowance(owner, spender, amount)
    }

    /// Moves `amount` shares from `from` to `to`.
    pub fn transfer_shares_for(
        &mut self,
        caller: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), VaultError> {
        self.ensure_controller(caller)?;
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }
        self.shares.transfer(from, to, amount)
    }

    fn ensure_controller(&self, caller: &Address) -> Result<(), VaultError> {
        if caller != &self.controller {
            tracing::warn!(
                vault = %self.address,
                caller = %caller,
                "vault mutation rejected: caller is not the controller"
            );
            return Err(VaultError::Unauthorized(AccessDenied::NotController));
        }
        Ok(())
    }
}

/// `floor(a * b / d)` without intermediate overflow. `d` must be non-zero.
fn mul_div_floor(a: u64, b: u64, d: u64) -> Result<u64, VaultError> {
    let product = a as u128 * b as u128;
    u64::try_from(product / d as u128).map_err(|_| VaultError::ArithmeticOverflow)
}
