//! Database models
//!
//! Rust structs representing the local note store. All timestamps are
//! fixed-width RFC 3339 UTC strings so lexicographic comparison equals
//! chronological comparison.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Note kind, mirroring the server's frontmatter vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NoteKind {
    #[default]
    OneShot,
    Complex,
    Brainstorming,
}

/// Note lifecycle status. The engine never hard-deletes; notes transition
/// to `Dropped` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NoteStatus {
    #[default]
    Open,
    Done,
    Dropped,
}

impl NoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteStatus::Open => "open",
            NoteStatus::Done => "done",
            NoteStatus::Dropped => "dropped",
        }
    }
}

/// Optional note priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// A note — the unit of synchronization.
///
/// `uid` is the storage primary key. Server-assigned uids are permanent;
/// notes captured offline carry a temporary `pending_<client-uuid>` uid
/// until the create upload migrates the row to the server-assigned one.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Note {
    pub uid: String,
    pub title: String,
    pub body: String,
    pub kind: NoteKind,
    pub status: NoteStatus,
    /// JSON-encoded tag array; empty tags round-trip to `"[]"`
    pub tags: String,
    pub priority: Option<Priority>,
    pub calendar: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub source: String,
    /// Calendar integration state, populated only by server-originated merges
    pub gcal_enabled: bool,
    pub gcal_event_id: Option<String>,
    pub gcal_last_pushed_at: Option<String>,
    pub created: String,
    pub updated: String,
    /// Timestamp of the last successful sync for this row
    pub synced_at: Option<String>,
    /// True while this row carries local mutations the server has not confirmed
    pub pending_sync: bool,
    /// Idempotency key for the offline-capture-to-server-assignment handoff
    pub client_uuid: Option<String>,
    /// Last permanent upload error; set pauses automatic retries for this row
    pub sync_error: Option<String>,
}

impl Note {
    /// Encode a tag list to a JSON string for storage
    pub fn tags_to_json(tags: &[String]) -> String {
        if tags.is_empty() {
            return "[]".to_string();
        }
        serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
    }

    /// Decode a stored JSON string to a tag list
    pub fn tags_from_json(json: &str) -> Vec<String> {
        if json.trim().is_empty() || json == "[]" {
            return Vec::new();
        }
        serde_json::from_str(json).unwrap_or_default()
    }

    /// Typed view of this note's tags
    pub fn tag_list(&self) -> Vec<String> {
        Self::tags_from_json(&self.tags)
    }
}

/// Current UTC time as a fixed-width, lexicographically sortable string,
/// e.g. `2026-01-02T03:04:05.678Z`
pub fn now_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
