//! Conflict resolution
//!
//! Last-write-wins with a local-pending override: an unsynced local edit
//! is never silently discarded by a background download, even when the
//! server copy is newer. The upload dispatcher must resolve that edit to
//! the server (or fail loudly) before the reconciler may replace it.

use crate::database::models::Note;

/// Decide whether the server copy of a note should be fetched and merged
/// over the local one.
///
/// Timestamps are fixed-width UTC strings, so plain string comparison is
/// chronological. Ties favor the local copy.
pub fn should_fetch_and_merge(local: Option<&Note>, remote_updated_at: &str) -> bool {
    match local {
        // Unknown note: always merge
        None => true,
        // Local pending mutations win unconditionally
        Some(note) if note.pending_sync => false,
        // Local is same-or-newer: keep it
        Some(note) if note.updated.as_str() >= remote_updated_at => false,
        Some(_) => true,
    }
}
