//! # Vault Controller
//!
//! The controller is the factory, the registry and the only door into any
//! vault:
//!
//! - **Factory** — [`Controller::create_vault`] instantiates a vault bound
//!   to this controller, with the caller recorded as creator.
//! - **Registry** — every creator has an append-only, insertion-ordered list
//!   of the vaults they created ([`Controller::all_vaults`]).
//! - **Gatekeeper** — deposits, redemptions, claims and share movements go
//!   through the controller, which checks who is asking and then invokes the
//!   vault with its own identity. Vaults reject everyone else.
//!
//! The controller never takes custody. Deposits move straight from the
//! depositor to the vault's address, payouts straight from the vault to the
//! receiver.
//!
//! ## Concurrency
//!
//! Each vault sits behind its own mutex, so operations on one vault are
//! totally ordered while different vaults proceed in parallel. The vault
//! arena is a `DashMap`; the per-creator lists share one `RwLock`, taken for
//! writing only while a vault is being created. Events are logged before
//! the vault lock is released, so per-vault event order is commit order.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use poolvault_protocol::config::{CONTROLLER_ADDRESS_DOMAIN, VAULT_ADDRESS_DOMAIN};
use poolvault_protocol::{Address, AssetLedger, EventLog, VaultEvent};
use uuid::Uuid;

use crate::error::{AccessDenied, VaultError};
use crate::vault::{DepositBreakdown, Vault, VaultParams, VaultSnapshot};

/// Shared, lockable handle to a vault.
pub type VaultHandle = Arc<Mutex<Vault>>;

/// Factory, registry and gatekeeper for vaults.
pub struct Controller {
    address: Address,
    ledger: Arc<dyn AssetLedger>,
    vaults: DashMap<Address, VaultHandle>,
    vaults_by_creator: RwLock<HashMap<Address, Vec<Address>>>,
    events: EventLog,
}

impl Controller {
    /// Creates a controller with a fresh random identity.
    pub fn new(ledger: Arc<dyn AssetLedger>) -> Self {
        let salt = Uuid::new_v4();
        let address = Address::derive(CONTROLLER_ADDRESS_DOMAIN, &[salt.as_bytes()]);
        Self::with_address(address, ledger)
    }

    /// Creates a controller with a fixed identity. Useful when the host
    /// assigns addresses itself, and for reproducible scenarios.
    pub fn with_address(address: Address, ledger: Arc<dyn AssetLedger>) -> Self {
        tracing::info!(controller = %address, "controller initialized");
        Self {
            address,
            ledger,
            vaults: DashMap::new(),
            vaults_by_creator: RwLock::new(HashMap::new()),
            events: EventLog::new(),
        }
    }

    /// The controller's identity, as recorded in every vault it creates.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The asset-transfer collaborator shared with the vaults.
    pub fn ledger(&self) -> &Arc<dyn AssetLedger> {
        &self.ledger
    }

    /// Emitted events.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    // -----------------------------------------------------------------------
    // Factory
    // -----------------------------------------------------------------------

    /// Creates a vault owned by `caller` and returns its address.
    ///
    /// The address is derived from `(controller, creator, n)` where `n` is
    /// the number of vaults `caller` created before, so it is stable and
    /// unique per controller.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfiguration`] if a ratio exceeds 100 or
    /// the asset is the zero address.
    pub fn create_vault(&self, caller: &Address, params: VaultParams) -> Result<Address, VaultError> {
        params.validate()?;
        let asset = params.asset;

        let vault_address = {
            let mut registry = self.vaults_by_creator.write();
            let list = registry.entry(*caller).or_default();
            let index = list.len() as u64;
            let vault_address = Address::derive(
                VAULT_ADDRESS_DOMAIN,
                &[
                    self.address.as_bytes(),
                    caller.as_bytes(),
                    &index.to_le_bytes(),
                ],
            );
            let vault = Vault::new(vault_address, self.address, *caller, params)?;

            tracing::info!(
                creator = %caller,
                vault = %vault_address,
                asset = %asset,
                "vault created"
            );
            // Emitted before the vault is reachable, so it precedes every
            // event of that vault.
            self.events.emit(VaultEvent::VaultCreated {
                creator: *caller,
                vault: vault_address,
                asset,
            });
            self.vaults
                .insert(vault_address, Arc::new(Mutex::new(vault)));
            list.push(vault_address);
            vault_address
        };
        Ok(vault_address)
    }

    // -----------------------------------------------------------------------
    // Gated operations
    // -----------------------------------------------------------------------

    /// Deposits `amount` of the vault's asset from `caller` and mints shares
    /// to `receiver`. Returns the shares minted.
    ///
    /// `caller` must have approved the vault's address (not the controller)
    /// for at least `amount` in the asset ledger.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidAmount`], [`VaultError::VaultNotFound`],
    /// [`VaultError::TransferFailed`], [`VaultError::ArithmeticOverflow`].
    pub fn deposit(
        &self,
        caller: &Address,
        vault_id: &Address,
        amount: u64,
        receiver: &Address,
    ) -> Result<u64, VaultError> {
        self.deposit_detailed(caller, vault_id, amount, receiver)
            .map(|b| b.shares_minted)
    }

    /// Same as [`deposit`](Self::deposit) but returns the full breakdown.
    pub fn deposit_detailed(
        &self,
        caller: &Address,
        vault_id: &Address,
        amount: u64,
        receiver: &Address,
    ) -> Result<DepositBreakdown, VaultError> {
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }
        let handle = self.vault(vault_id)?;
        let mut vault = handle.lock();
        let breakdown =
            vault.deposit_for(&self.address, self.ledger.as_ref(), amount, receiver, caller)?;

        tracing::info!(
            vault = %vault_id,
            caller = %caller,
            receiver = %receiver,
            amount,
            shares = breakdown.shares_minted,
            "deposit"
        );
        self.emit_locked(VaultEvent::Deposited {
            vault: *vault_id,
            caller: *caller,
            receiver: *receiver,
            amount,
            shares_minted: breakdown.shares_minted,
        });
        Ok(breakdown)
    }

    /// Redeems `shares` belonging to `owner` and pays the assets to
    /// `receiver`. Returns the assets paid.
    ///
    /// If `caller` is not `owner`, `owner` must have granted `caller` a share
    /// allowance of at least `shares` (see [`approve_shares`](Self::approve_shares));
    /// it is consumed only if the redemption succeeds.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidAmount`], [`VaultError::VaultNotFound`],
    /// [`VaultError::InvalidReceiver`] if `receiver` is the vault,
    /// [`VaultError::InsufficientAllowance`], [`VaultError::InsufficientShares`],
    /// [`VaultError::TransferFailed`].
    pub fn redeem(
        &self,
        caller: &Address,
        vault_id: &Address,
        shares: u64,
        receiver: &Address,
        owner: &Address,
    ) -> Result<u64, VaultError> {
        if shares == 0 {
            return Err(VaultError::InvalidAmount);
        }
        let handle = self.vault(vault_id)?;
        let mut vault = handle.lock();
        let on_behalf = caller != owner;
        if on_behalf {
            let allowance = vault.allowance(owner, caller);
            if allowance < shares {
                return Err(VaultError::InsufficientAllowance {
                    allowance,
                    requested: shares,
                });
            }
        }
        let assets_out =
            vault.redeem_for(&self.address, self.ledger.as_ref(), shares, receiver, owner)?;
        if on_behalf {
            vault.spend_allowance(&self.address, owner, caller, shares)?;
        }

        tracing::info!(
            vault = %vault_id,
            caller = %caller,
            owner = %owner,
            receiver = %receiver,
            shares,
            assets_out,
            "redeem"
        );
        self.emit_locked(VaultEvent::Redeemed {
            vault: *vault_id,
            caller: *caller,
            owner: *owner,
            receiver: *receiver,
            shares,
            assets_out,
        });
        Ok(assets_out)
    }

    /// Pays the vault's whole reserve to its creator. Returns the amount,
    /// which is 0 when there was nothing to claim.
    ///
    /// # Errors
    ///
    /// [`VaultError::VaultNotFound`], [`VaultError::Unauthorized`] if `caller`
    /// is not the creator, [`VaultError::TransferFailed`].
    pub fn claim(&self, caller: &Address, vault_id: &Address) -> Result<u64, VaultError> {
        let handle = self.vault(vault_id)?;
        let mut vault = handle.lock();
        if *caller != vault.creator() {
            tracing::warn!(
                vault = %vault_id,
                caller = %caller,
                "claim rejected: caller is not the creator"
            );
            return Err(VaultError::Unauthorized(AccessDenied::NotCreator));
        }
        let amount = vault.claim_reserve(&self.address, self.ledger.as_ref(), caller)?;

        tracing::info!(vault = %vault_id, creator = %caller, amount, "reserve claimed");
        self.emit_locked(VaultEvent::Claimed {
            vault: *vault_id,
            creator: *caller,
            amount,
        });
        Ok(amount)
    }

    /// Sets the share allowance `caller` grants `spender` in a vault.
    /// Overwrites any previous allowance; zero revokes.
    pub fn approve_shares(
        &self,
        caller: &Address,
        vault_id: &Address,
        spender: &Address,
        amount: u64,
    ) -> Result<(), VaultError> {
        let handle = self.vault(vault_id)?;
        let mut vault = handle.lock();
        vault.approve_for(&self.address, caller, spender, amount)?;

        tracing::debug!(vault = %vault_id, owner = %caller, spender = %spender, amount, "shares approved");
        self.emit_locked(VaultEvent::SharesApproved {
            vault: *vault_id,
            owner: *caller,
            spender: *spender,
            amount,
        });
        Ok(())
    }

    /// Moves `amount` of `caller`'s shares to `to`.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidAmount`], [`VaultError::VaultNotFound`],
    /// [`VaultError::InsufficientShares`].
    pub fn transfer_shares(
        &self,
        caller: &Address,
        vault_id: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), VaultError> {
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }
        let handle = self.vault(vault_id)?;
        let mut vault = handle.lock();
        vault.transfer_shares_for(&self.address, caller, to, amount)?;

        tracing::debug!(vault = %vault_id, from = %caller, to = %to, amount, "shares transferred");
        self.emit_locked(VaultEvent::SharesTransferred {
            vault: *vault_id,
            from: *caller,
            to: *to,
            amount,
        });
        Ok(())
    }

    /// Appends an event. Callers hold the affected vault's lock, so each
    /// vault's events are logged in commit order. The log's own mutex is
    /// only ever taken after a vault lock, never before one.
    fn emit_locked(&self, event: VaultEvent) {
        self.events.emit(event);
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The `index`-th vault created by `creator`, in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::IndexOutOfRange`] if `index` is past the end.
    pub fn all_vaults(&self, creator: &Address, index: usize) -> Result<Address, VaultError> {
        let registry = self.vaults_by_creator.read();
        let list = registry.get(creator).map(Vec::as_slice).unwrap_or(&[]);
        list.get(index)
            .copied()
            .ok_or(VaultError::IndexOutOfRange {
                creator: *creator,
                index,
                len: list.len(),
            })
    }

    /// Number of vaults `creator` has created.
    pub fn vault_count(&self, creator: &Address) -> usize {
        self.vaults_by_creator
            .read()
            .get(creator)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Every vault `creator` has created, in creation order.
    pub fn vaults_of(&self, creator: &Address) -> Vec<Address> {
        self.vaults_by_creator
            .read()
            .get(creator)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of vaults across all creators.
    pub fn total_vaults(&self) -> usize {
        self.vaults.len()
    }

    /// Handle to a vault, for reads and for callers that want to try their
    /// luck with direct mutation (which the vault will refuse).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::VaultNotFound`] for unknown addresses.
    pub fn vault(&self, vault_id: &Address) -> Result<VaultHandle, VaultError> {
        self.vaults
            .get(vault_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(VaultError::VaultNotFound(*vault_id))
    }

    /// Point-in-time copy of a vault's state.
    pub fn snapshot(&self, vault_id: &Address) -> Result<VaultSnapshot, VaultError> {
        Ok(self.vault(vault_id)?.lock().snapshot())
    }

    /// What a deposit of `amount` would do right now.
    pub fn preview_deposit(
        &self,
        vault_id: &Address,
        amount: u64,
    ) -> Result<DepositBreakdown, VaultError> {
        self.vault(vault_id)?.lock().preview_deposit(amount)
    }

    /// Assets `shares` would redeem for right now.
    pub fn preview_redeem(&self, vault_id: &Address, shares: u64) -> Result<u64, VaultError> {
        self.vault(vault_id)?.lock().preview_redeem(shares)
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("address", &self.address)
            .field("vaults", &self.vaults.len())
            .field("events", &self.events.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolvault_protocol::InMemoryAssetLedger;

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    fn params(asset: Address, pool: u8, dilute: u8) -> VaultParams {
        VaultParams {
            asset,
            name: "TestVault".into(),
            symbol: "TV".into(),
            share_pool_ratio: pool,
            share_dilute_ratio: dilute,
        }
    }

    fn setup() -> (Controller, Arc<InMemoryAssetLedger>, Address) {
        let ledger = Arc::new(InMemoryAssetLedger::new());
        let asset = addr("tusdt");
        ledger.register_asset(asset);
        let controller = Controller::new(ledger.clone());
        (controller, ledger, asset)
    }

    #[test]
    fn create_vault_binds_controller_and_creator() {
        let (controller, _, asset) = setup();
        let creator = addr("creator");
        let id = controller.create_vault(&creator, params(asset, 90, 90)).unwrap();

        let vault = controller.vault(&id).unwrap();
        let vault = vault.lock();
        assert_eq!(vault.controller(), controller.address());
        assert_eq!(vault.creator(), creator);
        assert_eq!(vault.asset(), asset);
        assert_eq!(vault.address(), id);
    }

    #[test]
    fn registry_preserves_creation_order() {
        let (controller, _, asset) = setup();
        let creator = addr("creator");
        let first = controller.create_vault(&creator, params(asset, 90, 90)).unwrap();
        let second = controller.create_vault(&creator, params(asset, 50, 100)).unwrap();
        assert_ne!(first, second);
        assert_eq!(controller.all_vaults(&creator, 0).unwrap(), first);
        assert_eq!(controller.all_vaults(&creator, 1).unwrap(), second);
        assert_eq!(controller.vaults_of(&creator), vec![first, second]);
        assert_eq!(controller.vault_count(&creator), 2);
        assert_eq!(controller.total_vaults(), 2);
    }

    #[test]
    fn all_vaults_out_of_range() {
        let (controller, _, asset) = setup();
        let creator = addr("creator");
        controller.create_vault(&creator, params(asset, 90, 90)).unwrap();
        assert!(matches!(
            controller.all_vaults(&creator, 1),
            Err(VaultError::IndexOutOfRange { index: 1, len: 1, .. })
        ));
        assert!(matches!(
            controller.all_vaults(&addr("nobody"), 0),
            Err(VaultError::IndexOutOfRange { len: 0, .. })
        ));
    }

    #[test]
    fn bad_ratio_rejected_without_registration() {
        let (controller, _, asset) = setup();
        let creator = addr("creator");
        let err = controller
            .create_vault(&creator, params(asset, 101, 90))
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidConfiguration(_)));
        assert_eq!(controller.vault_count(&creator), 0);
        assert!(controller.events().is_empty());
    }

    #[test]
    fn unknown_vault_rejected() {
        let (controller, _, _) = setup();
        let ghost = addr("ghost");
        assert!(matches!(
            controller.deposit(&addr("a"), &ghost, 1, &addr("a")),
            Err(VaultError::VaultNotFound(_))
        ));
        assert!(matches!(
            controller.claim(&addr("a"), &ghost),
            Err(VaultError::VaultNotFound(_))
        ));
    }

    #[test]
    fn events_follow_operations() {
        let (controller, ledger, asset) = setup();
        let creator = addr("creator");
        let alice = addr("alice");
        let id = controller.create_vault(&creator, params(asset, 90, 90)).unwrap();
        ledger.mint(&asset, &alice, 1_000).unwrap();
        ledger.approve(&asset, &alice, &id, 1_000).unwrap();
        controller.deposit(&alice, &id, 1_000, &alice).unwrap();
        controller.claim(&creator, &id).unwrap();

        let kinds: Vec<_> = controller
            .events()
            .records()
            .iter()
            .map(|r| r.event.kind())
            .collect();
        assert_eq!(kinds, vec!["vault_created", "deposited", "claimed"]);
    }
}
