//! Notes service
//!
//! The application-facing facade over the store, the remote client, and
//! the sync triggers. Captures are online-first: the note goes straight
//! to the server when it is reachable, and falls back to an offline row
//! with a temporary uid otherwise. Every local mutation marks the row
//! pending and nudges the upload dispatcher.

use crate::config;
use crate::database::models::{now_utc, Note, NoteKind, NoteStatus, Priority};
use crate::database::Repository;
use crate::error::Result;
use crate::remote::{CaptureRequest, RemoteApi};
use crate::services::SettingsService;
use crate::sync::SyncHandle;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Input for a new capture
#[derive(Debug, Clone, Default)]
pub struct CaptureDraft {
    pub body: String,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub kind: NoteKind,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub calendar: Option<String>,
    pub priority: Option<Priority>,
}

/// Where a capture landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub uid: String,
    /// True when the note was queued locally instead of reaching the server
    pub offline: bool,
}

pub struct NotesService<A: RemoteApi> {
    api: Arc<A>,
    repo: Repository,
    settings: SettingsService,
    sync: SyncHandle,
}

impl<A: RemoteApi + 'static> NotesService<A> {
    pub fn new(api: Arc<A>, repo: Repository, settings: SettingsService, sync: SyncHandle) -> Self {
        Self {
            api,
            repo,
            settings,
            sync,
        }
    }

    /// Capture a note. Tries the server first when one is configured; any
    /// failure there degrades to an offline row that the dispatcher will
    /// drain later. Capture never fails because the network did.
    pub async fn capture(&self, draft: CaptureDraft) -> Result<CaptureOutcome> {
        let client_uuid = Uuid::new_v4().to_string();

        if self.settings.server_url().await?.is_some() {
            let request = capture_request(&draft, &client_uuid);
            match self.api.capture(&request).await {
                Ok(response) => {
                    let now = now_utc();
                    let mut note = draft_to_note(draft, &response.uid, &client_uuid, &now);
                    note.pending_sync = false;
                    note.synced_at = Some(now);
                    self.repo.upsert(&note).await?;
                    return Ok(CaptureOutcome {
                        uid: response.uid,
                        offline: false,
                    });
                }
                Err(e) => {
                    tracing::warn!("Direct capture failed, queuing offline: {}", e);
                }
            }
        }

        let uid = format!("{}{}", config::PENDING_UID_PREFIX, client_uuid);
        let note = draft_to_note(draft, &uid, &client_uuid, &now_utc());
        self.repo.upsert(&note).await?;
        self.sync.trigger_upload();

        Ok(CaptureOutcome { uid, offline: true })
    }

    /// Change a note's status locally and queue the edit for upload
    pub async fn update_status(&self, uid: &str, status: NoteStatus) -> Result<()> {
        self.repo.update_status(uid, status, &now_utc()).await?;
        self.sync.trigger_upload();
        Ok(())
    }

    /// Edit a note's content locally and queue the edit for upload
    pub async fn update_content(
        &self,
        uid: &str,
        title: &str,
        body: &str,
        tags: &[String],
    ) -> Result<()> {
        self.repo
            .update_content(uid, title, body, &Note::tags_to_json(tags), &now_utc())
            .await?;
        self.sync.trigger_upload();
        Ok(())
    }

    /// Manual retry for a note parked on a permanent upload failure:
    /// clears the recorded error so the drain picks the row up again
    pub async fn retry_sync(&self, uid: &str) -> Result<()> {
        self.repo.clear_sync_error(uid).await?;
        self.sync.trigger_upload();
        Ok(())
    }

    /// Request a full sync cycle now (download and upload)
    pub fn sync_now(&self) {
        self.sync.trigger_reconcile();
        self.sync.trigger_upload();
    }

    pub async fn get(&self, uid: &str) -> Result<Option<Note>> {
        self.repo.get(uid).await
    }

    /// Open notes, newest first
    pub async fn inbox(&self) -> Result<Vec<Note>> {
        self.repo.list_by_status(NoteStatus::Open).await
    }

    /// Live view of the open inbox; the receiver updates on every store
    /// change affecting it
    pub fn watch_inbox(&self) -> watch::Receiver<Vec<Note>> {
        self.repo.watch_by_status(NoteStatus::Open)
    }

    /// Full-text search over open notes
    pub async fn search(&self, query: &str) -> Result<Vec<Note>> {
        self.repo.search(query).await
    }

    pub async fn pending_count(&self) -> Result<i64> {
        self.repo.count_pending_sync().await
    }

    /// Notes parked on a permanent upload failure, awaiting user attention
    pub async fn sync_errors(&self) -> Result<Vec<Note>> {
        self.repo.list_sync_errors().await
    }

    /// Probe server reachability without touching any state
    pub async fn check_connection(&self) -> bool {
        self.api.health_check().await
    }
}

fn capture_request(draft: &CaptureDraft, client_uuid: &str) -> CaptureRequest {
    CaptureRequest {
        body: draft.body.clone(),
        title: draft.title.clone().filter(|t| !t.is_empty()),
        tags: (!draft.tags.is_empty()).then(|| draft.tags.clone()),
        kind: Some(draft.kind),
        date: draft.date.clone(),
        start_time: draft.start_time.clone(),
        end_time: draft.end_time.clone(),
        calendar: draft.calendar.clone(),
        priority: draft.priority,
        source: config::CLIENT_SOURCE.to_string(),
        uuid: Some(client_uuid.to_string()),
    }
}

fn draft_to_note(draft: CaptureDraft, uid: &str, client_uuid: &str, now: &str) -> Note {
    Note {
        uid: uid.to_string(),
        title: draft.title.unwrap_or_default(),
        body: draft.body,
        kind: draft.kind,
        status: NoteStatus::Open,
        tags: Note::tags_to_json(&draft.tags),
        priority: draft.priority,
        calendar: draft.calendar,
        date: draft.date,
        start_time: draft.start_time,
        end_time: draft.end_time,
        source: config::CLIENT_SOURCE.to_string(),
        gcal_enabled: false,
        gcal_event_id: None,
        gcal_last_pushed_at: None,
        created: now.to_string(),
        updated: now.to_string(),
        synced_at: None,
        pending_sync: true,
        client_uuid: Some(client_uuid.to_string()),
        sync_error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::initialize_database;
    use crate::remote::{
        ApiError, ApiResult, CaptureResponse, InboxResponse, NoteDetailResponse,
        NoteUpdateRequest, NoteUpdateResponse,
    };
    use sqlx::sqlite::SqlitePoolOptions;

    struct FlakyApi {
        capture_result: std::sync::Mutex<Option<ApiResult<CaptureResponse>>>,
    }

    impl FlakyApi {
        fn failing() -> Self {
            Self {
                capture_result: std::sync::Mutex::new(Some(Err(ApiError::Network(
                    "connection refused".to_string(),
                )))),
            }
        }

        fn succeeding(uid: &str) -> Self {
            Self {
                capture_result: std::sync::Mutex::new(Some(Ok(CaptureResponse {
                    path: format!("inbox/{}.md", uid),
                    uid: uid.to_string(),
                }))),
            }
        }
    }

    impl RemoteApi for FlakyApi {
        async fn capture(&self, _request: &CaptureRequest) -> ApiResult<CaptureResponse> {
            self.capture_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(ApiError::NotConfigured))
        }

        async fn get_inbox(
            &self,
            _limit: u32,
            _offset: Option<u32>,
            _status: Option<NoteStatus>,
            _since: Option<&str>,
        ) -> ApiResult<InboxResponse> {
            Err(ApiError::NotConfigured)
        }

        async fn get_note(&self, _uid: &str) -> ApiResult<NoteDetailResponse> {
            Err(ApiError::NotConfigured)
        }

        async fn update_note(
            &self,
            _uid: &str,
            _request: &NoteUpdateRequest,
        ) -> ApiResult<NoteUpdateResponse> {
            Err(ApiError::NotConfigured)
        }

        async fn health_check(&self) -> bool {
            false
        }
    }

    async fn create_test_service(api: FlakyApi) -> NotesService<FlakyApi> {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize_database(&pool).await.unwrap();
        let repo = Repository::new(pool);
        let settings = SettingsService::new(repo.clone());
        NotesService::new(Arc::new(api), repo, settings, SyncHandle::new())
    }

    #[tokio::test]
    async fn test_capture_without_server_queues_offline() {
        let service = create_test_service(FlakyApi::failing()).await;

        let outcome = service
            .capture(CaptureDraft {
                body: "offline note".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(outcome.offline);
        assert!(outcome.uid.starts_with(config::PENDING_UID_PREFIX));

        let note = service.get(&outcome.uid).await.unwrap().unwrap();
        assert!(note.pending_sync);
        assert!(note.client_uuid.is_some());
        assert!(note.synced_at.is_none());
    }

    #[tokio::test]
    async fn test_capture_falls_back_offline_when_server_unreachable() {
        let service = create_test_service(FlakyApi::failing()).await;
        service
            .settings
            .set_server_url("https://capture.example.org")
            .await
            .unwrap();

        let outcome = service
            .capture(CaptureDraft {
                body: "note".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(outcome.offline);
        assert_eq!(service.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_capture_online_stores_server_uid() {
        let service = create_test_service(FlakyApi::succeeding("20260823-1200-note")).await;
        service
            .settings
            .set_server_url("https://capture.example.org")
            .await
            .unwrap();

        let outcome = service
            .capture(CaptureDraft {
                body: "note".to_string(),
                title: Some("Title".to_string()),
                tags: vec!["work".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(!outcome.offline);
        assert_eq!(outcome.uid, "20260823-1200-note");

        let note = service.get(&outcome.uid).await.unwrap().unwrap();
        assert!(!note.pending_sync);
        assert!(note.synced_at.is_some());
        assert_eq!(note.title, "Title");
        assert_eq!(service.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_local_edit_marks_pending() {
        let service = create_test_service(FlakyApi::failing()).await;

        let outcome = service
            .capture(CaptureDraft {
                body: "v1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        service
            .update_content(&outcome.uid, "T", "v2", &["a".to_string()])
            .await
            .unwrap();
        service
            .update_status(&outcome.uid, NoteStatus::Done)
            .await
            .unwrap();

        let note = service.get(&outcome.uid).await.unwrap().unwrap();
        assert!(note.pending_sync);
        assert_eq!(note.body, "v2");
        assert_eq!(note.status, NoteStatus::Done);
    }
}
