//! Application configuration constants
//!
//! Central location for all configuration constants, resource limits,
//! and validation boundaries used throughout the engine.

// ===== Network Timeouts =====

/// TCP connect timeout in seconds
pub const CONNECT_TIMEOUT_SECS: u64 = 15;

/// Total request timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Per-read socket timeout in seconds.
/// A stalled connection fails as a transient error instead of wedging a job.
pub const READ_TIMEOUT_SECS: u64 = 30;

// ===== Sync Scheduling =====

/// Default interval between periodic sync runs in minutes
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 15;

/// Minimum allowed sync interval in minutes; smaller values are clamped
pub const MIN_SYNC_INTERVAL_MINUTES: u64 = 15;

/// Minimum flex window in minutes. The flex window is interval / 3,
/// clamped to at least this value, and each periodic run is jittered
/// within it so runs can coalesce with other background work.
pub const MIN_FLEX_MINUTES: u64 = 5;

/// Base delay in seconds for exponential backoff between retries
pub const BACKOFF_BASE_SECS: u64 = 30;

/// Maximum retry attempts for a single sync cycle before giving up
/// until the next scheduled run
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

// ===== Download Reconciler =====

/// Page size for the inbox listing call
pub const INBOX_PAGE_SIZE: u32 = 200;

/// Upper bound on concurrent detail fetches during a reconcile cycle.
/// Keeps a large stale set from overwhelming the server or the local radio.
pub const DETAIL_FETCH_CONCURRENCY: usize = 8;

// ===== Upload Dispatcher =====

/// Maximum length of a stored sync error message in characters
pub const SYNC_ERROR_MESSAGE_MAX_CHARS: usize = 200;

/// Uid prefix marking a note captured offline, before the server has
/// assigned a permanent identifier
pub const PENDING_UID_PREFIX: &str = "pending_";

/// Origin system stamped on notes captured by this client
pub const CLIENT_SOURCE: &str = "desktop";

// ===== Search =====

/// Minimum query length for full-text search; shorter queries fall back
/// to a LIKE scan
pub const FTS_MIN_QUERY_CHARS: usize = 3;
