//! # Vault Events
//!
//! Notifications emitted by the controller for indexers and operators. They
//! are not needed for correctness: the ledgers are the source of truth, the
//! events just narrate how they got there.
//!
//! Every event is appended to an [`EventLog`] with a monotonically
//! increasing sequence number and mirrored to `tracing`. The log holds at
//! most its retention limit; beyond that the oldest records are evicted, and
//! the gap shows in the sequence numbers.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::config::{EVENT_LOG_DEFAULT_RETENTION, EVENT_LOG_INITIAL_CAPACITY};

/// State changes worth telling the outside world about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VaultEvent {
    /// A new vault was created.
    VaultCreated {
        creator: Address,
        vault: Address,
        asset: Address,
    },
    /// Assets were deposited and shares minted.
    Deposited {
        vault: Address,
        caller: Address,
        receiver: Address,
        amount: u64,
        shares_minted: u64,
    },
    /// Shares were burned and pooled assets paid out.
    Redeemed {
        vault: Address,
        caller: Address,
        owner: Address,
        receiver: Address,
        shares: u64,
        assets_out: u64,
    },
    /// The creator drained the reserve.
    Claimed {
        vault: Address,
        creator: Address,
        amount: u64,
    },
    /// A share holder set a spender's allowance.
    SharesApproved {
        vault: Address,
        owner: Address,
        spender: Address,
        amount: u64,
    },
    /// Shares changed hands.
    SharesTransferred {
        vault: Address,
        from: Address,
        to: Address,
        amount: u64,
    },
}

impl VaultEvent {
    /// The vault this event concerns.
    pub fn vault(&self) -> &Address {
        match self {
            VaultEvent::VaultCreated { vault, .. }
            | VaultEvent::Deposited { vault, .. }
            | VaultEvent::Redeemed { vault, .. }
            | VaultEvent::Claimed { vault, .. }
            | VaultEvent::SharesApproved { vault, .. }
            | VaultEvent::SharesTransferred { vault, .. } => vault,
        }
    }

    /// Short event name, as used in logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultEvent::VaultCreated { .. } => "vault_created",
            VaultEvent::Deposited { .. } => "deposited",
            VaultEvent::Redeemed { .. } => "redeemed",
            VaultEvent::Claimed { .. } => "claimed",
            VaultEvent::SharesApproved { .. } => "shares_approved",
            VaultEvent::SharesTransferred { .. } => "shares_transferred",
        }
    }
}

/// An event as stored in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the log, starting at 0.
    pub sequence: u64,
    /// Wall-clock time of emission.
    pub timestamp: DateTime<Utc>,
    /// The event itself.
    #[serde(flatten)]
    pub event: VaultEvent,
}

/// Append-only, thread-safe event log with bounded retention.
#[derive(Debug)]
pub struct EventLog {
    inner: Mutex<EventLogInner>,
}

#[derive(Debug)]
struct EventLogInner {
    next_sequence: u64,
    retention: usize,
    evicted: u64,
    records: VecDeque<EventRecord>,
}

impl EventLog {
    /// Creates an empty log keeping up to [`EVENT_LOG_DEFAULT_RETENTION`]
    /// records.
    pub fn new() -> Self {
        Self::with_retention(EVENT_LOG_DEFAULT_RETENTION)
    }

    /// Creates an empty log keeping up to `retention` records (at least one).
    pub fn with_retention(retention: usize) -> Self {
        let retention = retention.max(1);
        Self {
            inner: Mutex::new(EventLogInner {
                next_sequence: 0,
                retention,
                evicted: 0,
                records: VecDeque::with_capacity(retention.min(EVENT_LOG_INITIAL_CAPACITY)),
            }),
        }
    }

    /// Appends `event` and returns its sequence number. Evicts the oldest
    /// record if the log is full.
    pub fn emit(&self, event: VaultEvent) -> u64 {
        let mut inner = self.inner.lock();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        tracing::info!(
            sequence,
            kind = event.kind(),
            vault = %event.vault(),
            "event emitted"
        );
        if inner.records.len() >= inner.retention {
            inner.records.pop_front();
            inner.evicted += 1;
            if inner.evicted == 1 {
                tracing::warn!(
                    retention = inner.retention,
                    "event log full, evicting oldest records"
                );
            }
        }
        inner.records.push_back(EventRecord {
            sequence,
            timestamp: Utc::now(),
            event,
        });
        sequence
    }

    /// Copy of every record still held, oldest first.
    pub fn records(&self) -> Vec<EventRecord> {
        self.inner.lock().records.iter().cloned().collect()
    }

    /// Removes and returns every record held. Sequence numbers keep counting
    /// from where they were.
    pub fn drain(&self) -> Vec<EventRecord> {
        self.inner.lock().records.drain(..).collect()
    }

    /// Maximum number of records held at once.
    pub fn retention(&self) -> usize {
        self.inner.lock().retention
    }

    /// Records evicted so far because the log was full.
    pub fn evicted(&self) -> u64 {
        self.inner.lock().evicted
    }

    /// Records concerning `vault`, oldest first.
    pub fn for_vault(&self, vault: &Address) -> Vec<EventRecord> {
        self.inner
            .lock()
            .records
            .iter()
            .filter(|r| r.event.vault() == vault)
            .cloned()
            .collect()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Returns `true` if no records are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
