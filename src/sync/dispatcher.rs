//! Upload dispatcher
//!
//! Drains every pending local mutation to the server. Notes captured
//! offline (uid prefixed `pending_`) are POSTed to the create endpoint
//! with their client uuid as idempotency token; everything else is
//! PATCHed by uid.
//!
//! Error classification per note:
//! - 401: fatal for the whole cycle — processing stops immediately
//! - other 4xx: permanent — sync_error recorded, automatic retries paused,
//!   the row stays pending so it remains visible as needing attention
//! - 5xx / transport: transient — the row stays in the drain for the next
//!   attempt

use super::SyncOutcome;
use crate::config;
use crate::database::{now_utc, Note, Repository};
use crate::error::{AppError, Result};
use crate::remote::{ApiError, CaptureRequest, NoteUpdateRequest, RemoteApi};
use crate::services::SettingsService;
use std::sync::Arc;

pub struct UploadDispatcher<A: RemoteApi> {
    api: Arc<A>,
    repo: Repository,
    settings: SettingsService,
}

impl<A: RemoteApi + 'static> UploadDispatcher<A> {
    pub fn new(api: Arc<A>, repo: Repository, settings: SettingsService) -> Self {
        Self {
            api,
            repo,
            settings,
        }
    }

    /// Run one upload cycle.
    pub async fn run(&self) -> Result<SyncOutcome> {
        let pending = self.repo.list_pending_sync().await?;
        if pending.is_empty() {
            return Ok(SyncOutcome::Success);
        }

        if self.settings.server_url().await?.is_none() {
            tracing::debug!("Upload deferred: no server configured, {} pending", pending.len());
            return Ok(SyncOutcome::Retry);
        }

        let mut uploaded = 0usize;
        let mut retryable = 0usize;
        let mut permanent = 0usize;
        let mut auth_failure = false;

        for note in &pending {
            let result = if note.uid.starts_with(config::PENDING_UID_PREFIX) {
                self.upload_new_capture(note).await
            } else {
                self.upload_update(note).await
            };

            match result {
                Ok(()) => uploaded += 1,
                Err(AppError::Api(api_err)) => {
                    if api_err.is_auth() {
                        // Do not partially drain past an auth break
                        tracing::error!("Upload rejected with 401, halting cycle");
                        self.settings.clear_auth_token().await?;
                        auth_failure = true;
                        break;
                    } else if api_err.is_permanent() {
                        if let ApiError::Status { status, message } = &api_err {
                            self.repo
                                .mark_sync_error(
                                    &note.uid,
                                    &format!("HTTP {}: {}", status, message),
                                )
                                .await?;
                        }
                        tracing::warn!("Upload failed permanently for {}: {}", note.uid, api_err);
                        permanent += 1;
                    } else {
                        tracing::warn!("Upload failed for {}: {}", note.uid, api_err);
                        retryable += 1;
                    }
                }
                // Local store failures are not per-note outcomes
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            "Upload complete: {} ok, {} retryable, {} permanent",
            uploaded,
            retryable,
            permanent
        );

        if auth_failure {
            Ok(SyncOutcome::Fatal)
        } else if retryable > 0 {
            Ok(SyncOutcome::Retry)
        } else {
            Ok(SyncOutcome::Success)
        }
    }

    /// POST a note captured offline, then migrate its temporary uid to the
    /// server-assigned one.
    async fn upload_new_capture(&self, note: &Note) -> Result<()> {
        let tags = note.tag_list();
        let request = CaptureRequest {
            body: note.body.clone(),
            title: (!note.title.is_empty()).then(|| note.title.clone()),
            tags: (!tags.is_empty()).then_some(tags),
            kind: Some(note.kind),
            date: note.date.clone(),
            start_time: note.start_time.clone(),
            end_time: note.end_time.clone(),
            calendar: note.calendar.clone(),
            priority: note.priority,
            source: note.source.clone(),
            uuid: note.client_uuid.clone(),
        };

        let response = self.api.capture(&request).await.map_err(AppError::Api)?;
        let now = now_utc();

        if response.uid == note.uid {
            self.repo.mark_synced(&note.uid, &now).await
        } else {
            self.repo.migrate_uid(&note.uid, &response.uid, &now).await
        }
    }

    /// PATCH an edited note by its server uid.
    async fn upload_update(&self, note: &Note) -> Result<()> {
        let request = NoteUpdateRequest {
            status: Some(note.status),
            tags: Some(note.tag_list()),
            body: Some(note.body.clone()),
            title: Some(note.title.clone()),
        };

        self.api
            .update_note(&note.uid, &request)
            .await
            .map_err(AppError::Api)?;

        self.repo.mark_synced(&note.uid, &now_utc()).await
    }
}
