//! Download reconciler
//!
//! Pulls server state into the local store without disturbing unsynced
//! local work. Lists lightweight summaries, filters them through the
//! conflict resolver, fetches full detail for the stale subset with
//! bounded fan-out, and merges each successful fetch.

use super::resolver;
use super::SyncOutcome;
use crate::config;
use crate::database::{now_utc, Note, Repository};
use crate::remote::{ApiError, RemoteApi};
use crate::services::SettingsService;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct DownloadReconciler<A: RemoteApi> {
    api: Arc<A>,
    repo: Repository,
    settings: SettingsService,
}

impl<A: RemoteApi + 'static> DownloadReconciler<A> {
    pub fn new(api: Arc<A>, repo: Repository, settings: SettingsService) -> Self {
        Self {
            api,
            repo,
            settings,
        }
    }

    /// Run one reconcile cycle.
    pub async fn run(&self) -> Result<SyncOutcome> {
        if self.settings.server_url().await?.is_none() {
            tracing::debug!("Reconcile skipped: no server configured");
            return Ok(SyncOutcome::Success);
        }

        let inbox = match self
            .api
            .get_inbox(config::INBOX_PAGE_SIZE, None, None, None)
            .await
        {
            Ok(inbox) => inbox,
            Err(e) if e.is_auth() => {
                // Credential is dead; drop it and surface a re-auth notice
                tracing::error!("Inbox listing rejected with 401, clearing credential");
                self.settings.clear_auth_token().await?;
                return Ok(SyncOutcome::Fatal);
            }
            Err(ApiError::NotConfigured) => return Ok(SyncOutcome::Success),
            Err(e) => {
                tracing::warn!("Inbox listing failed: {}", e);
                return Ok(SyncOutcome::Retry);
            }
        };

        let now = now_utc();

        // Identify stale items via serial store reads (fast, local)
        let mut stale = Vec::new();
        for item in &inbox.items {
            let local = self.repo.get(&item.uid).await?;
            if resolver::should_fetch_and_merge(local.as_ref(), &item.updated_at) {
                stale.push(item.clone());
            }
        }
        let candidates = stale.len();

        // Fetch full detail for stale items with bounded fan-out. A failed
        // fetch is recorded and skipped; its timestamp still marks it stale
        // next cycle, so individual failures self-heal.
        let semaphore = Arc::new(Semaphore::new(config::DETAIL_FETCH_CONCURRENCY));
        let mut fetches: JoinSet<Option<Note>> = JoinSet::new();

        for item in stale {
            let api = Arc::clone(&self.api);
            let semaphore = Arc::clone(&semaphore);
            let synced_at = now.clone();

            fetches.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                match api.get_note(&item.uid).await {
                    Ok(detail) => Some(detail.into_note(&synced_at)),
                    Err(e) => {
                        tracing::warn!("Failed to fetch note {}: {}", item.uid, e);
                        None
                    }
                }
            });
        }

        let mut merged = 0usize;
        let mut failed = 0usize;
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok(Some(note)) => {
                    self.repo.upsert(&note).await?;
                    merged += 1;
                }
                Ok(None) => failed += 1,
                Err(e) => {
                    tracing::warn!("Detail fetch task failed: {}", e);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            tracing::warn!("Reconcile completed with errors: {} ok, {} failed", merged, failed);
        } else {
            tracing::info!("Reconcile complete: {} merged of {} listed", merged, inbox.items.len());
        }

        // An empty, clean cycle still counts as a successful sync
        if merged > 0 || (failed == 0 && candidates == 0) {
            self.settings.set_last_synced_at(&now_utc()).await?;
        }

        // Only retry when every stale item failed (systemic issue such as
        // the network going down mid-cycle)
        if failed > 0 && merged == 0 && candidates > 0 {
            Ok(SyncOutcome::Retry)
        } else {
            Ok(SyncOutcome::Success)
        }
    }
}
