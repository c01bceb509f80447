//! End-to-end sync engine tests against an in-process remote.
//!
//! The mock server is a plain `RemoteApi` implementation with injectable
//! failures, so every conflict, partial-failure, and auth scenario runs
//! without a network.

use notesync::config;
use notesync::database::{initialize_database, Note, NoteKind, NoteStatus, Repository};
use notesync::remote::{
    ApiError, ApiResult, CaptureRequest, CaptureResponse, InboxItem, InboxResponse,
    NoteDetailResponse, NoteFrontmatter, NoteUpdateRequest, NoteUpdateResponse, RemoteApi,
};
use notesync::services::SettingsService;
use notesync::sync::{DownloadReconciler, SyncOutcome, UploadDispatcher};
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockApi {
    inbox_items: Mutex<Vec<InboxItem>>,
    inbox_fail: Mutex<Option<u16>>,
    details: Mutex<HashMap<String, NoteDetailResponse>>,
    detail_fail: Mutex<HashSet<String>>,
    capture_uid: Mutex<Option<String>>,
    update_fail: Mutex<HashMap<String, u16>>,
    captured: Mutex<Vec<CaptureRequest>>,
    update_attempts: Mutex<Vec<String>>,
}

fn status_err(status: u16) -> ApiError {
    ApiError::Status {
        status,
        message: "mock failure".to_string(),
    }
}

impl RemoteApi for MockApi {
    async fn capture(&self, request: &CaptureRequest) -> ApiResult<CaptureResponse> {
        self.captured.lock().unwrap().push(request.clone());
        let uid = self
            .capture_uid
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "srv-default".to_string());
        Ok(CaptureResponse {
            path: format!("inbox/{}.md", uid),
            uid,
        })
    }

    async fn get_inbox(
        &self,
        _limit: u32,
        _offset: Option<u32>,
        _status: Option<NoteStatus>,
        _since: Option<&str>,
    ) -> ApiResult<InboxResponse> {
        if let Some(status) = *self.inbox_fail.lock().unwrap() {
            return Err(status_err(status));
        }
        let items = self.inbox_items.lock().unwrap().clone();
        Ok(InboxResponse {
            total_count: items.len() as i64,
            items,
            sync_token: String::new(),
        })
    }

    async fn get_note(&self, uid: &str) -> ApiResult<NoteDetailResponse> {
        if self.detail_fail.lock().unwrap().contains(uid) {
            return Err(status_err(503));
        }
        self.details
            .lock()
            .unwrap()
            .get(uid)
            .cloned()
            .ok_or_else(|| status_err(404))
    }

    async fn update_note(
        &self,
        uid: &str,
        _request: &NoteUpdateRequest,
    ) -> ApiResult<NoteUpdateResponse> {
        self.update_attempts.lock().unwrap().push(uid.to_string());
        if let Some(status) = self.update_fail.lock().unwrap().get(uid) {
            return Err(status_err(*status));
        }
        Ok(NoteUpdateResponse {
            uid: uid.to_string(),
            updated: "2026-08-23T12:00:00.000Z".to_string(),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}

async fn setup() -> (Repository, SettingsService) {
    let pool = SqlitePoolOptions::new()
        .connect("sqlite::memory:")
        .await
        .unwrap();
    initialize_database(&pool).await.unwrap();
    let repo = Repository::new(pool);
    let settings = SettingsService::new(repo.clone());
    settings
        .set_server_url("https://capture.example.org")
        .await
        .unwrap();
    settings.set_auth_token("test-token").await.unwrap();
    (repo, settings)
}

fn inbox_item(uid: &str, updated_at: &str) -> InboxItem {
    InboxItem {
        uid: uid.to_string(),
        path: format!("inbox/{}.md", uid),
        status: NoteStatus::Open,
        kind: NoteKind::OneShot,
        content_hash: String::new(),
        updated_at: updated_at.to_string(),
    }
}

fn detail(uid: &str, body: &str, updated: &str) -> NoteDetailResponse {
    NoteDetailResponse {
        uid: uid.to_string(),
        frontmatter: NoteFrontmatter {
            uid: uid.to_string(),
            title: Some(format!("Title {}", uid)),
            created: "2026-01-01T00:00:00.000Z".to_string(),
            updated: updated.to_string(),
            ..Default::default()
        },
        body: body.to_string(),
        gcal_status: None,
    }
}

fn local_note(uid: &str, body: &str, created: &str, updated: &str, pending: bool) -> Note {
    Note {
        uid: uid.to_string(),
        title: String::new(),
        body: body.to_string(),
        kind: NoteKind::OneShot,
        status: NoteStatus::Open,
        tags: "[]".to_string(),
        priority: None,
        calendar: None,
        date: None,
        start_time: None,
        end_time: None,
        source: "desktop".to_string(),
        gcal_enabled: false,
        gcal_event_id: None,
        gcal_last_pushed_at: None,
        created: created.to_string(),
        updated: updated.to_string(),
        synced_at: None,
        pending_sync: pending,
        client_uuid: None,
        sync_error: None,
    }
}

// --- download reconciler ---

#[tokio::test]
async fn reconcile_merges_unknown_and_stale_notes() {
    let (repo, settings) = setup().await;
    let api = Arc::new(MockApi::default());

    repo.upsert(&local_note(
        "n2",
        "old body",
        "2026-01-01T00:00:00.000Z",
        "2026-01-01T00:00:00.000Z",
        false,
    ))
    .await
    .unwrap();

    *api.inbox_items.lock().unwrap() = vec![
        inbox_item("n1", "2026-02-01T00:00:00.000Z"),
        inbox_item("n2", "2026-02-01T00:00:00.000Z"),
    ];
    api.details.lock().unwrap().extend([
        ("n1".to_string(), detail("n1", "fresh", "2026-02-01T00:00:00.000Z")),
        ("n2".to_string(), detail("n2", "newer body", "2026-02-01T00:00:00.000Z")),
    ]);

    let reconciler = DownloadReconciler::new(api, repo.clone(), settings.clone());
    assert_eq!(reconciler.run().await.unwrap(), SyncOutcome::Success);

    let n1 = repo.get("n1").await.unwrap().unwrap();
    assert_eq!(n1.body, "fresh");
    assert!(!n1.pending_sync);
    assert!(n1.synced_at.is_some());

    let n2 = repo.get("n2").await.unwrap().unwrap();
    assert_eq!(n2.body, "newer body");

    assert!(settings.last_synced_at().await.unwrap().is_some());
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let (repo, settings) = setup().await;
    let api = Arc::new(MockApi::default());

    *api.inbox_items.lock().unwrap() = vec![inbox_item("n1", "2026-02-01T00:00:00.000Z")];
    api.details.lock().unwrap().insert(
        "n1".to_string(),
        detail("n1", "body", "2026-02-01T00:00:00.000Z"),
    );

    let reconciler = DownloadReconciler::new(api, repo.clone(), settings);
    assert_eq!(reconciler.run().await.unwrap(), SyncOutcome::Success);
    let first = repo.get("n1").await.unwrap().unwrap();

    // Second cycle sees local updated == remote updated: nothing stale
    assert_eq!(reconciler.run().await.unwrap(), SyncOutcome::Success);
    let second = repo.get("n1").await.unwrap().unwrap();

    assert_eq!(first.body, second.body);
    assert_eq!(first.updated, second.updated);
    assert_eq!(first.synced_at, second.synced_at);
}

#[tokio::test]
async fn reconcile_never_overwrites_pending_local_edit() {
    let (repo, settings) = setup().await;
    let api = Arc::new(MockApi::default());

    repo.upsert(&local_note(
        "n1",
        "unsynced local edit",
        "2026-01-01T00:00:00.000Z",
        "2026-01-01T00:00:00.000Z",
        true,
    ))
    .await
    .unwrap();

    // Remote copy is strictly newer but must still lose
    *api.inbox_items.lock().unwrap() = vec![inbox_item("n1", "2026-03-01T00:00:00.000Z")];
    api.details.lock().unwrap().insert(
        "n1".to_string(),
        detail("n1", "server body", "2026-03-01T00:00:00.000Z"),
    );

    let reconciler = DownloadReconciler::new(api, repo.clone(), settings);
    assert_eq!(reconciler.run().await.unwrap(), SyncOutcome::Success);

    let note = repo.get("n1").await.unwrap().unwrap();
    assert_eq!(note.body, "unsynced local edit");
    assert!(note.pending_sync);
}

#[tokio::test]
async fn reconcile_timestamp_tie_keeps_local() {
    let (repo, settings) = setup().await;
    let api = Arc::new(MockApi::default());

    let ts = "2026-02-01T00:00:00.000Z";
    repo.upsert(&local_note("n1", "local body", ts, ts, false))
        .await
        .unwrap();

    *api.inbox_items.lock().unwrap() = vec![inbox_item("n1", ts)];
    api.details
        .lock()
        .unwrap()
        .insert("n1".to_string(), detail("n1", "server body", ts));

    let reconciler = DownloadReconciler::new(api, repo.clone(), settings);
    assert_eq!(reconciler.run().await.unwrap(), SyncOutcome::Success);

    assert_eq!(repo.get("n1").await.unwrap().unwrap().body, "local body");
}

#[tokio::test]
async fn reconcile_partial_detail_failure_self_heals() {
    let (repo, settings) = setup().await;
    let api = Arc::new(MockApi::default());

    *api.inbox_items.lock().unwrap() = vec![
        inbox_item("n1", "2026-02-01T00:00:00.000Z"),
        inbox_item("n2", "2026-02-01T00:00:00.000Z"),
    ];
    api.details.lock().unwrap().extend([
        ("n1".to_string(), detail("n1", "one", "2026-02-01T00:00:00.000Z")),
        ("n2".to_string(), detail("n2", "two", "2026-02-01T00:00:00.000Z")),
    ]);
    api.detail_fail.lock().unwrap().insert("n2".to_string());

    let reconciler = DownloadReconciler::new(Arc::clone(&api), repo.clone(), settings);

    // One merge succeeded, so the cycle is not retried as a whole
    assert_eq!(reconciler.run().await.unwrap(), SyncOutcome::Success);
    assert!(repo.get("n1").await.unwrap().is_some());
    assert!(repo.get("n2").await.unwrap().is_none());

    // The failed item is still stale next cycle and heals on its own
    api.detail_fail.lock().unwrap().clear();
    assert_eq!(reconciler.run().await.unwrap(), SyncOutcome::Success);
    assert_eq!(repo.get("n2").await.unwrap().unwrap().body, "two");
}

#[tokio::test]
async fn reconcile_retries_when_every_stale_fetch_fails() {
    let (repo, settings) = setup().await;
    let api = Arc::new(MockApi::default());

    *api.inbox_items.lock().unwrap() = vec![inbox_item("n1", "2026-02-01T00:00:00.000Z")];
    api.detail_fail.lock().unwrap().insert("n1".to_string());

    let reconciler = DownloadReconciler::new(api, repo, settings.clone());
    assert_eq!(reconciler.run().await.unwrap(), SyncOutcome::Retry);
    assert!(settings.last_synced_at().await.unwrap().is_none());
}

#[tokio::test]
async fn reconcile_auth_failure_clears_credential() {
    let (repo, settings) = setup().await;
    let api = Arc::new(MockApi::default());
    *api.inbox_fail.lock().unwrap() = Some(401);

    let reconciler = DownloadReconciler::new(api, repo, settings.clone());
    assert_eq!(reconciler.run().await.unwrap(), SyncOutcome::Fatal);
    assert!(settings.auth_token().await.unwrap().is_none());
}

#[tokio::test]
async fn reconcile_empty_clean_cycle_records_sync_time() {
    let (repo, settings) = setup().await;
    let api = Arc::new(MockApi::default());

    let reconciler = DownloadReconciler::new(api, repo, settings.clone());
    assert_eq!(reconciler.run().await.unwrap(), SyncOutcome::Success);
    assert!(settings.last_synced_at().await.unwrap().is_some());
}

// --- upload dispatcher ---

#[tokio::test]
async fn upload_migrates_offline_capture_to_server_uid() {
    let (repo, settings) = setup().await;
    let api = Arc::new(MockApi::default());
    *api.capture_uid.lock().unwrap() = Some("20260823-1200-note".to_string());

    let mut note = local_note(
        &format!("{}abc", config::PENDING_UID_PREFIX),
        "captured offline",
        "2026-01-01T00:00:00.000Z",
        "2026-01-01T00:00:00.000Z",
        true,
    );
    note.client_uuid = Some("client-uuid-1".to_string());
    repo.upsert(&note).await.unwrap();

    let dispatcher = UploadDispatcher::new(Arc::clone(&api), repo.clone(), settings);
    assert_eq!(dispatcher.run().await.unwrap(), SyncOutcome::Success);

    // Idempotency token travelled with the create
    let captured = api.captured.lock().unwrap();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].uuid.as_deref(), Some("client-uuid-1"));
    drop(captured);

    assert!(repo.get(&note.uid).await.unwrap().is_none());
    let migrated = repo.get("20260823-1200-note").await.unwrap().unwrap();
    assert_eq!(migrated.body, "captured offline");
    assert!(!migrated.pending_sync);
    assert!(migrated.synced_at.is_some());
}

#[tokio::test]
async fn upload_patches_edited_note() {
    let (repo, settings) = setup().await;
    let api = Arc::new(MockApi::default());

    repo.upsert(&local_note(
        "n1",
        "edited",
        "2026-01-01T00:00:00.000Z",
        "2026-01-02T00:00:00.000Z",
        true,
    ))
    .await
    .unwrap();

    let dispatcher = UploadDispatcher::new(Arc::clone(&api), repo.clone(), settings);
    assert_eq!(dispatcher.run().await.unwrap(), SyncOutcome::Success);

    assert_eq!(*api.update_attempts.lock().unwrap(), vec!["n1".to_string()]);
    let note = repo.get("n1").await.unwrap().unwrap();
    assert!(!note.pending_sync);
    assert!(note.synced_at.is_some());
}

#[tokio::test]
async fn upload_halts_on_auth_failure_without_draining_past_it() {
    let (repo, settings) = setup().await;
    let api = Arc::new(MockApi::default());

    // Five pending edits, drained oldest-first; the second hits a 401
    for (i, uid) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        repo.upsert(&local_note(
            uid,
            "body",
            &format!("2026-01-0{}T00:00:00.000Z", i + 1),
            "2026-01-10T00:00:00.000Z",
            true,
        ))
        .await
        .unwrap();
    }
    api.update_fail.lock().unwrap().insert("b".to_string(), 401);

    let dispatcher = UploadDispatcher::new(Arc::clone(&api), repo.clone(), settings.clone());
    assert_eq!(dispatcher.run().await.unwrap(), SyncOutcome::Fatal);

    // Only "a" and "b" were attempted; the rest were never touched
    assert_eq!(
        *api.update_attempts.lock().unwrap(),
        vec!["a".to_string(), "b".to_string()]
    );
    assert!(!repo.get("a").await.unwrap().unwrap().pending_sync);
    for uid in ["b", "c", "d", "e"] {
        assert!(repo.get(uid).await.unwrap().unwrap().pending_sync);
    }
    assert!(settings.auth_token().await.unwrap().is_none());
}

#[tokio::test]
async fn upload_permanent_failure_parks_note_until_manual_retry() {
    let (repo, settings) = setup().await;
    let api = Arc::new(MockApi::default());

    repo.upsert(&local_note(
        "n1",
        "rejected",
        "2026-01-01T00:00:00.000Z",
        "2026-01-02T00:00:00.000Z",
        true,
    ))
    .await
    .unwrap();
    api.update_fail.lock().unwrap().insert("n1".to_string(), 422);

    let dispatcher = UploadDispatcher::new(Arc::clone(&api), repo.clone(), settings);

    // Permanent failures don't make the cycle retryable
    assert_eq!(dispatcher.run().await.unwrap(), SyncOutcome::Success);

    let note = repo.get("n1").await.unwrap().unwrap();
    assert!(note.pending_sync);
    assert_eq!(note.sync_error.as_deref(), Some("HTTP 422: mock failure"));

    // Parked: automatic drains skip it entirely
    assert_eq!(dispatcher.run().await.unwrap(), SyncOutcome::Success);
    assert_eq!(api.update_attempts.lock().unwrap().len(), 1);

    // Manual retry re-arms the row
    api.update_fail.lock().unwrap().clear();
    repo.clear_sync_error("n1").await.unwrap();
    assert_eq!(dispatcher.run().await.unwrap(), SyncOutcome::Success);

    let note = repo.get("n1").await.unwrap().unwrap();
    assert!(!note.pending_sync);
    assert!(note.sync_error.is_none());
}

#[tokio::test]
async fn upload_transient_failure_leaves_others_unaffected() {
    let (repo, settings) = setup().await;
    let api = Arc::new(MockApi::default());

    repo.upsert(&local_note(
        "n1",
        "ok",
        "2026-01-01T00:00:00.000Z",
        "2026-01-02T00:00:00.000Z",
        true,
    ))
    .await
    .unwrap();
    repo.upsert(&local_note(
        "n2",
        "flaky",
        "2026-01-02T00:00:00.000Z",
        "2026-01-02T00:00:00.000Z",
        true,
    ))
    .await
    .unwrap();
    api.update_fail.lock().unwrap().insert("n2".to_string(), 503);

    let dispatcher = UploadDispatcher::new(Arc::clone(&api), repo.clone(), settings);
    assert_eq!(dispatcher.run().await.unwrap(), SyncOutcome::Retry);

    assert!(!repo.get("n1").await.unwrap().unwrap().pending_sync);
    let flaky = repo.get("n2").await.unwrap().unwrap();
    assert!(flaky.pending_sync);
    // Transient failures are not recorded as permanent errors
    assert!(flaky.sync_error.is_none());

    // Next cycle picks the failed row up again
    api.update_fail.lock().unwrap().clear();
    assert_eq!(dispatcher.run().await.unwrap(), SyncOutcome::Success);
    assert!(!repo.get("n2").await.unwrap().unwrap().pending_sync);
}

#[tokio::test]
async fn upload_defers_when_no_server_configured() {
    let pool = SqlitePoolOptions::new()
        .connect("sqlite::memory:")
        .await
        .unwrap();
    initialize_database(&pool).await.unwrap();
    let repo = Repository::new(pool);
    let settings = SettingsService::new(repo.clone());

    repo.upsert(&local_note(
        "n1",
        "waiting",
        "2026-01-01T00:00:00.000Z",
        "2026-01-02T00:00:00.000Z",
        true,
    ))
    .await
    .unwrap();

    let api = Arc::new(MockApi::default());
    let dispatcher = UploadDispatcher::new(Arc::clone(&api), repo, settings);

    assert_eq!(dispatcher.run().await.unwrap(), SyncOutcome::Retry);
    assert!(api.update_attempts.lock().unwrap().is_empty());
}

// --- round trip ---

#[tokio::test]
async fn offline_capture_round_trip_converges() {
    let (repo, settings) = setup().await;
    let api = Arc::new(MockApi::default());
    *api.capture_uid.lock().unwrap() = Some("srv-1".to_string());

    let mut note = local_note(
        &format!("{}xyz", config::PENDING_UID_PREFIX),
        "round trip",
        "2026-01-01T00:00:00.000Z",
        "2026-01-01T00:00:00.000Z",
        true,
    );
    note.client_uuid = Some("client-uuid-2".to_string());
    repo.upsert(&note).await.unwrap();

    let dispatcher = UploadDispatcher::new(Arc::clone(&api), repo.clone(), settings.clone());
    assert_eq!(dispatcher.run().await.unwrap(), SyncOutcome::Success);

    // Server now lists the note; a reconcile right after must not disturb it
    let migrated = repo.get("srv-1").await.unwrap().unwrap();
    *api.inbox_items.lock().unwrap() = vec![inbox_item("srv-1", &migrated.updated)];
    api.details.lock().unwrap().insert(
        "srv-1".to_string(),
        detail("srv-1", "round trip", &migrated.updated),
    );

    let reconciler = DownloadReconciler::new(api, repo.clone(), settings);
    assert_eq!(reconciler.run().await.unwrap(), SyncOutcome::Success);

    let after = repo.get("srv-1").await.unwrap().unwrap();
    assert_eq!(after.body, "round trip");
    assert!(!after.pending_sync);
    assert_eq!(repo.count_pending_sync().await.unwrap(), 0);
}
