//! # Protocol Configuration & Constants
//!
//! Every magic number in PoolVault lives here. Ratios, identity formats and
//! derivation domains are part of the accounting contract: changing one of
//! them changes which vault an address points at or how many shares a
//! deposit mints, so treat edits here as breaking changes.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Version of the accounting rules implemented by this workspace.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Ratio Parameters
// ---------------------------------------------------------------------------

/// Denominator for every percentage ratio. Ratios are whole percent, so a
/// `share_pool_ratio` of 90 routes 90/100 of a deposit into the share pool.
pub const RATIO_DENOMINATOR: u64 = 100;

/// Largest accepted value for `share_pool_ratio` and `share_dilute_ratio`.
pub const MAX_RATIO: u8 = 100;

// ---------------------------------------------------------------------------
// Identity Format
// ---------------------------------------------------------------------------

/// Length of an [`Address`](crate::address::Address) in bytes. 20 bytes is
/// wide enough that derived vault addresses never collide in practice and
/// short enough to read in a log line.
pub const ADDRESS_LENGTH: usize = 20;

/// Prefix of the textual address form.
pub const ADDRESS_PREFIX: &str = "0x";

/// Domain tag for vault address derivation: `(controller, creator, index)`.
pub const VAULT_ADDRESS_DOMAIN: &str = "poolvault/vault/v1";

/// Domain tag for controller address derivation from a deployment salt.
pub const CONTROLLER_ADDRESS_DOMAIN: &str = "poolvault/controller/v1";

/// Domain tag for human-readable labels ("alice", "tusdt") in demos and tests.
pub const LABEL_ADDRESS_DOMAIN: &str = "poolvault/label/v1";

// ---------------------------------------------------------------------------
// Event Log
// ---------------------------------------------------------------------------

/// Initial capacity reserved for a fresh event log.
pub const EVENT_LOG_INITIAL_CAPACITY: usize = 256;

/// Records a default event log keeps before evicting the oldest. Hosts that
/// need the full history drain the log more often than this fills.
pub const EVENT_LOG_DEFAULT_RETENTION: usize = 65_536;
