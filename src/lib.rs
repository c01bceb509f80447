//! notesync - offline-first note synchronization engine
//!
//! A local SQLite store is the single source of truth for reads; a
//! capture server is the durable home for notes. The sync engine keeps
//! the two converging: a download reconciler merges server changes that
//! don't collide with unsynced local work, an upload dispatcher drains
//! local mutations, and a coordinator schedules both with jitter,
//! overlap protection, and backoff.

pub mod config;
pub mod database;
pub mod error;
pub mod remote;
pub mod services;
pub mod sync;
