//! Wire types for the capture server API
//!
//! Field names follow the server's JSON contract, which mixes snake_case
//! and camelCase; serde renames keep the Rust side uniform.

use crate::database::models::{Note, NoteKind, NoteStatus, Priority};
use serde::{Deserialize, Serialize};

/// Body for `POST /capture`. `uuid` is the client idempotency token for
/// the offline-capture-to-server-assignment handoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<NoteKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(rename = "endTime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub path: String,
    pub uid: String,
}

/// Response for `GET /inbox`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxResponse {
    pub items: Vec<InboxItem>,
    #[serde(rename = "totalCount")]
    pub total_count: i64,
    #[serde(rename = "syncToken", default)]
    pub sync_token: String,
}

/// Lightweight note summary; the reconciler only needs uid + updated_at
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxItem {
    pub uid: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub status: NoteStatus,
    #[serde(default)]
    pub kind: NoteKind,
    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Response for `GET /note/{uid}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteDetailResponse {
    pub uid: String,
    pub frontmatter: NoteFrontmatter,
    pub body: String,
    #[serde(rename = "gcalStatus", default)]
    pub gcal_status: Option<GcalStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteFrontmatter {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub kind: NoteKind,
    #[serde(default)]
    pub status: NoteStatus,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(rename = "startTime", default)]
    pub start_time: Option<String>,
    #[serde(rename = "endTime", default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub calendar: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GcalStatus {
    #[serde(rename = "eventId", default)]
    pub event_id: Option<String>,
    #[serde(rename = "lastPushedAt", default)]
    pub last_pushed_at: Option<String>,
    #[serde(rename = "lastError", default)]
    pub last_error: Option<String>,
}

/// Body for `PATCH /note/{uid}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteUpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<NoteStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteUpdateResponse {
    pub uid: String,
    pub updated: String,
}

impl NoteDetailResponse {
    /// Build a local row from a server detail response, stamped as freshly
    /// synced. Calendar integration state only ever enters the store here.
    pub fn into_note(self, synced_at: &str) -> Note {
        Note {
            uid: self.uid,
            title: self.frontmatter.title.unwrap_or_default(),
            body: self.body,
            kind: self.frontmatter.kind,
            status: self.frontmatter.status,
            tags: Note::tags_to_json(&self.frontmatter.tags),
            priority: self.frontmatter.priority,
            calendar: self.frontmatter.calendar,
            date: self.frontmatter.date,
            start_time: self.frontmatter.start_time,
            end_time: self.frontmatter.end_time,
            source: self.frontmatter.source.unwrap_or_else(|| "web".to_string()),
            gcal_enabled: self.gcal_status.is_some(),
            gcal_event_id: self.gcal_status.as_ref().and_then(|g| g.event_id.clone()),
            gcal_last_pushed_at: self
                .gcal_status
                .as_ref()
                .and_then(|g| g.last_pushed_at.clone()),
            created: self.frontmatter.created,
            updated: self.frontmatter.updated,
            synced_at: Some(synced_at.to_string()),
            pending_sync: false,
            client_uuid: None,
            sync_error: None,
        }
    }
}
