//! # Scenario Runner
//!
//! A scenario is a JSON document describing a deployment (assets and
//! opening balances) and an ordered list of steps against the controller.
//! Participants are named by label; a label resolves to
//! [`Address::from_label`] unless it already is a `0x` address.
//!
//! ```json
//! {
//!   "assets": [{ "label": "tusdt", "balances": { "alice": 1000 } }],
//!   "steps": [
//!     { "op": "create_vault", "caller": "creator", "asset": "tusdt",
//!       "name": "Pool", "symbol": "PV", "share_pool_ratio": 90, "share_dilute_ratio": 90 },
//!     { "op": "approve_asset", "owner": "alice", "asset": "tusdt",
//!       "vault": { "creator": "creator", "index": 0 }, "amount": 1000 },
//!     { "op": "deposit", "caller": "alice", "vault": { "creator": "creator", "index": 0 },
//!       "amount": 1000 },
//!     { "op": "claim", "caller": "alice", "vault": { "creator": "creator", "index": 0 },
//!       "expect_error": "unauthorized" }
//!   ]
//! }
//! ```
//!
//! A step that fails without `expect_error`, or that succeeds (or fails
//! differently) when one is given, aborts the run.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use poolvault_contracts::{Controller, DepositBreakdown, VaultError, VaultParams, VaultSnapshot};
use poolvault_protocol::{Address, EventRecord, InMemoryAssetLedger};

use crate::metrics::VaultMetrics;

// ---------------------------------------------------------------------------
// Scenario document
// ---------------------------------------------------------------------------

/// A full scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Optional human description, echoed in the report.
    #[serde(default)]
    pub description: Option<String>,
    /// Pin the controller address to this label instead of a random one.
    #[serde(default)]
    pub controller: Option<String>,
    /// Assets to register, with opening balances.
    #[serde(default)]
    pub assets: Vec<AssetSpec>,
    /// Steps, executed in order.
    pub steps: Vec<Step>,
}

/// An asset and its opening balances (`label -> amount`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSpec {
    pub label: String,
    #[serde(default)]
    pub balances: BTreeMap<String, u64>,
}

/// Identifies a vault by its creator and creation index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultRef {
    pub creator: String,
    pub index: usize,
}

/// One operation plus its expected outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    /// Error kind (as in [`VaultError::kind`]) the step must fail with.
    #[serde(default)]
    pub expect_error: Option<String>,
}

/// Operations a step can perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    CreateVault {
        caller: String,
        asset: String,
        name: String,
        symbol: String,
        share_pool_ratio: u8,
        share_dilute_ratio: u8,
    },
    /// Asset-ledger approval of a vault as spender. Not a controller call.
    ApproveAsset {
        owner: String,
        asset: String,
        vault: VaultRef,
        amount: u64,
    },
    Deposit {
        caller: String,
        vault: VaultRef,
        amount: u64,
        #[serde(default)]
        receiver: Option<String>,
    },
    /// Omitted `shares` redeems the owner's whole balance.
    Redeem {
        caller: String,
        vault: VaultRef,
        #[serde(default)]
        shares: Option<u64>,
        #[serde(default)]
        receiver: Option<String>,
        #[serde(default)]
        owner: Option<String>,
    },
    Claim {
        caller: String,
        vault: VaultRef,
    },
    ApproveShares {
        caller: String,
        vault: VaultRef,
        spender: String,
        amount: u64,
    },
    TransferShares {
        caller: String,
        vault: VaultRef,
        to: String,
        amount: u64,
    },
}

impl Action {
    /// Operation name, as written in the `op` field.
    pub fn name(&self) -> &'static str {
        match self {
            Action::CreateVault { .. } => "create_vault",
            Action::ApproveAsset { .. } => "approve_asset",
            Action::Deposit { .. } => "deposit",
            Action::Redeem { .. } => "redeem",
            Action::Claim { .. } => "claim",
            Action::ApproveShares { .. } => "approve_shares",
            Action::TransferShares { .. } => "transfer_shares",
        }
    }
}

impl Scenario {
    /// Reads and parses a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse scenario {}", path.display()))
    }

    /// Two depositors put 10,000,000 each into a 90% pool / 90% dilution
    /// vault, a non-creator claim is refused, and the creator drains the
    /// reserve.
    pub fn demo() -> Self {
        let vault = || VaultRef {
            creator: "creator".into(),
            index: 0,
        };
        let deposit = |who: &str| Step {
            action: Action::Deposit {
                caller: who.into(),
                vault: vault(),
                amount: 10_000_000,
                receiver: None,
            },
            expect_error: None,
        };
        let approve = |who: &str| Step {
            action: Action::ApproveAsset {
                owner: who.into(),
                asset: "tusdt".into(),
                vault: vault(),
                amount: 10_000_000,
            },
            expect_error: None,
        };

        Scenario {
            description: Some("two depositors, 90% pool, 90% dilution".into()),
            controller: Some("controller".into()),
            assets: vec![AssetSpec {
                label: "tusdt".into(),
                balances: BTreeMap::from([
                    ("user1".to_string(), 10_000_000),
                    ("user2".to_string(), 10_000_000),
                ]),
            }],
            steps: vec![
                Step {
                    action: Action::CreateVault {
                        caller: "creator".into(),
                        asset: "tusdt".into(),
                        name: "Demo Vault".into(),
                        symbol: "DV".into(),
                        share_pool_ratio: 90,
                        share_dilute_ratio: 90,
                    },
                    expect_error: None,
                },
                approve("user1"),
                deposit("user1"),
                approve("user2"),
                deposit("user2"),
                Step {
                    action: Action::Claim {
                        caller: "user2".into(),
                        vault: vault(),
                    },
                    expect_error: Some("unauthorized".into()),
                },
                Step {
                    action: Action::Claim {
                        caller: "creator".into(),
                        vault: vault(),
                    },
                    expect_error: None,
                },
                Step {
                    action: Action::Redeem {
                        caller: "user1".into(),
                        vault: vault(),
                        shares: None,
                        receiver: None,
                        owner: None,
                    },
                    expect_error: None,
                },
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What a successful step produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepOutput {
    VaultCreated { vault: Address },
    Deposited(DepositBreakdown),
    Redeemed { shares: u64, assets_out: u64 },
    Claimed { amount: u64 },
    Done,
}

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<StepOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub controller: Address,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
    pub vaults: Vec<VaultSnapshot>,
    /// `asset label -> (participant label -> balance)`.
    pub balances: BTreeMap<String, BTreeMap<String, u64>>,
    pub events: Vec<EventRecord>,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Executes scenarios against a fresh in-memory deployment.
pub struct ScenarioRunner {
    ledger: Arc<InMemoryAssetLedger>,
    controller: Controller,
    metrics: Option<Arc<VaultMetrics>>,
    /// Reverse lookup for the report.
    labels: BTreeMap<Address, String>,
    assets: BTreeMap<String, Address>,
}

impl ScenarioRunner {
    /// Builds the deployment a scenario describes: registers its assets and
    /// mints the opening balances.
    pub fn new(scenario: &Scenario, metrics: Option<Arc<VaultMetrics>>) -> Result<Self> {
        let ledger = Arc::new(InMemoryAssetLedger::new());
        let controller = match &scenario.controller {
            Some(label) => Controller::with_address(resolve(label), ledger.clone()),
            None => Controller::new(ledger.clone()),
        };

        let mut runner = Self {
            ledger,
            controller,
            metrics,
            labels: BTreeMap::new(),
            assets: BTreeMap::new(),
        };
        if let Some(label) = &scenario.controller {
            runner.labels.insert(runner.controller.address(), label.clone());
        }

        for spec in &scenario.assets {
            let asset = runner.address(&spec.label);
            if !runner.ledger.register_asset(asset) {
                bail!("asset {} declared twice", spec.label);
            }
            runner.assets.insert(spec.label.clone(), asset);
            for (holder, amount) in &spec.balances {
                let who = runner.address(holder);
                runner
                    .ledger
                    .mint(&asset, &who, *amount)
                    .with_context(|| format!("minting {amount} {} to {holder}", spec.label))?;
            }
        }

        tracing::info!(
            controller = %runner.controller.address(),
            assets = runner.assets.len(),
            "deployment ready"
        );
        Ok(runner)
    }

    /// The controller under test.
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Runs every step in order and collects the report.
    pub fn run(&mut self, scenario: &Scenario) -> Result<Report> {
        let started_at = Utc::now();
        let mut steps = Vec::with_capacity(scenario.steps.len());

        for (index, step) in scenario.steps.iter().enumerate() {
            let op = step.action.name();
            let timer = Instant::now();
            let result = self.execute(&step.action);
            if let Some(m) = &self.metrics {
                m.step_latency_seconds.observe(timer.elapsed().as_secs_f64());
            }

            let report = match (result, &step.expect_error) {
                (Ok(output), None) => StepReport {
                    index,
                    op,
                    output: Some(output),
                    error: None,
                    error_kind: None,
                },
                (Ok(_), Some(expected)) => {
                    bail!("step {index} ({op}): expected {expected} error, but it succeeded")
                }
                (Err(e), Some(expected)) if e.kind() == expected.as_str() => {
                    tracing::info!(index, op, error = %e, "step failed as expected");
                    StepReport {
                        index,
                        op,
                        output: None,
                        error: Some(e.to_string()),
                        error_kind: Some(e.kind()),
                    }
                }
                (Err(e), expected) => {
                    let context = match expected {
                        Some(kind) => format!("step {index} ({op}): expected {kind} error"),
                        None => format!("step {index} ({op}) failed"),
                    };
                    return Err(anyhow::Error::new(e).context(context));
                }
            };
            steps.push(report);
        }

        Ok(Report {
            description: scenario.description.clone(),
            controller: self.controller.address(),
            started_at,
            finished_at: Utc::now(),
            steps,
            vaults: self.vault_snapshots()?,
            balances: self.balances(),
            events: self.controller.events().records(),
        })
    }

    fn execute(&mut self, action: &Action) -> Result<StepOutput, VaultError> {
        let result = self.dispatch(action);
        if let (Some(m), Err(e)) = (&self.metrics, &result) {
            m.record_failure(e.kind());
        }
        result
    }

    fn dispatch(&mut self, action: &Action) -> Result<StepOutput, VaultError> {
        match action {
            Action::CreateVault {
                caller,
                asset,
                name,
                symbol,
                share_pool_ratio,
                share_dilute_ratio,
            } => {
                let creator = self.address(caller);
                let params = VaultParams {
                    asset: self.address(asset),
                    name: name.clone(),
                    symbol: symbol.clone(),
                    share_pool_ratio: *share_pool_ratio,
                    share_dilute_ratio: *share_dilute_ratio,
                };
                let vault = self.controller.create_vault(&creator, params)?;
                let index = self.controller.vault_count(&creator) - 1;
                self.labels.insert(vault, format!("{caller}/{index}"));
                if let Some(m) = &self.metrics {
                    m.vaults_created_total.inc();
                }
                Ok(StepOutput::VaultCreated { vault })
            }
            Action::ApproveAsset {
                owner,
                asset,
                vault,
                amount,
            } => {
                let owner = self.address(owner);
                let asset = self.address(asset);
                let vault = self.vault(vault)?;
                self.ledger.approve(&asset, &owner, &vault, *amount)?;
                Ok(StepOutput::Done)
            }
            Action::Deposit {
                caller,
                vault,
                amount,
                receiver,
            } => {
                let caller = self.address(caller);
                let receiver = receiver.as_deref().map_or(caller, |r| self.address(r));
                let vault = self.vault(vault)?;
                let breakdown =
                    self.controller
                        .deposit_detailed(&caller, &vault, *amount, &receiver)?;
                if let Some(m) = &self.metrics {
                    m.deposits_total.inc();
                    m.assets_deposited_total.inc_by(*amount);
                }
                Ok(StepOutput::Deposited(breakdown))
            }
            Action::Redeem {
                caller,
                vault,
                shares,
                receiver,
                owner,
            } => {
                let caller = self.address(caller);
                let owner = owner.as_deref().map_or(caller, |o| self.address(o));
                let receiver = receiver.as_deref().map_or(caller, |r| self.address(r));
                let vault = self.vault(vault)?;
                let shares = match shares {
                    Some(n) => *n,
                    None => self.controller.vault(&vault)?.lock().balance_of(&owner),
                };
                let assets_out = self
                    .controller
                    .redeem(&caller, &vault, shares, &receiver, &owner)?;
                if let Some(m) = &self.metrics {
                    m.redemptions_total.inc();
                    m.assets_redeemed_total.inc_by(assets_out);
                }
                Ok(StepOutput::Redeemed { shares, assets_out })
            }
            Action::Claim { caller, vault } => {
                let caller = self.address(caller);
                let vault = self.vault(vault)?;
                let amount = self.controller.claim(&caller, &vault)?;
                if let Some(m) = &self.metrics {
                    m.claims_total.inc();
                    m.reserve_claimed_total.inc_by(amount);
                }
                Ok(StepOutput::Claimed { amount })
            }
            Action::ApproveShares {
                caller,
                vault,
                spender,
                amount,
            } => {
                let caller = self.address(caller);
                let spender = self.address(spender);
                let vault = self.vault(vault)?;
                self.controller
                    .approve_shares(&caller, &vault, &spender, *amount)?;
                Ok(StepOutput::Done)
            }
            Action::TransferShares {
                caller,
                vault,
                to,
                amount,
            } => {
                let caller = self.address(caller);
                let to = self.address(to);
                let vault = self.vault(vault)?;
                self.controller
                    .transfer_shares(&caller, &vault, &to, *amount)?;
                Ok(StepOutput::Done)
            }
        }
    }

    /// Resolves a label and remembers it for the report.
    fn address(&mut self, label: &str) -> Address {
        let addr = resolve(label);
        self.labels.entry(addr).or_insert_with(|| label.to_string());
        addr
    }

    fn vault(&mut self, vault: &VaultRef) -> Result<Address, VaultError> {
        let creator = self.address(&vault.creator);
        self.controller.all_vaults(&creator, vault.index)
    }

    fn display(&self, addr: &Address) -> String {
        self.labels
            .get(addr)
            .cloned()
            .unwrap_or_else(|| addr.to_hex())
    }

    fn vault_snapshots(&self) -> Result<Vec<VaultSnapshot>> {
        let mut creators: Vec<Address> = self
            .labels
            .keys()
            .copied()
            .filter(|a| self.controller.vault_count(a) > 0)
            .collect();
        creators.sort();

        let mut out = Vec::new();
        for creator in creators {
            for vault in self.controller.vaults_of(&creator) {
                out.push(
                    self.controller
                        .snapshot(&vault)
                        .with_context(|| format!("snapshot of {vault}"))?,
                );
            }
        }
        Ok(out)
    }

    fn balances(&self) -> BTreeMap<String, BTreeMap<String, u64>> {
        self.assets
            .iter()
            .filter_map(|(label, asset)| {
                let book = self.ledger.book(asset)?;
                let holders = book
                    .balances
                    .iter()
                    .map(|(who, amount)| (self.display(who), *amount))
                    .collect();
                Some((label.clone(), holders))
            })
            .collect()
    }
}

/// Label to address: `0x…` strings parse as-is, anything else is hashed.
pub fn resolve(label: &str) -> Address {
    label
        .parse()
        .unwrap_or_else(|_| Address::from_label(label))
}
