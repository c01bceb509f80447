//! Sync engine
//!
//! The offline-first synchronization core: the conflict resolver, the
//! download reconciler (server → store), the upload dispatcher
//! (store → server), and the coordinator that schedules both.

pub mod coordinator;
pub mod dispatcher;
pub mod reconciler;
pub mod resolver;

pub use coordinator::{SyncCoordinator, SyncHandle};
pub use dispatcher::UploadDispatcher;
pub use reconciler::DownloadReconciler;

/// Outcome of one sync cycle, consumed by the coordinator's retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Cycle completed; nothing left to do until the next scheduled run
    Success,
    /// Transient failure; the whole cycle should be retried with backoff
    Retry,
    /// Authentication failure; retrying is pointless until the user
    /// re-authenticates
    Fatal,
}
