//! Settings service
//!
//! Typed accessors over the persisted key/value settings table: server
//! URL, auth credential, sync interval, and the single last-successful-sync
//! scalar.

use crate::config;
use crate::database::Repository;
use crate::error::{AppError, Result};

const KEY_SERVER_URL: &str = "server_url";
const KEY_AUTH_TOKEN: &str = "auth_token";
const KEY_SYNC_INTERVAL: &str = "sync_interval_minutes";
const KEY_LAST_SYNCED_AT: &str = "last_synced_at";

#[derive(Clone)]
pub struct SettingsService {
    repo: Repository,
}

impl SettingsService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Configured server base URL, or None when sync is not set up
    pub async fn server_url(&self) -> Result<Option<String>> {
        Ok(self
            .repo
            .get_setting(KEY_SERVER_URL)
            .await?
            .filter(|url| !url.trim().is_empty()))
    }

    /// Store the server base URL. HTTPS is required except for local
    /// development hosts; trailing slashes are normalized away.
    pub async fn set_server_url(&self, url: &str) -> Result<()> {
        let normalized = url.trim().trim_end_matches('/').to_string();

        if !is_valid_server_url(&normalized) {
            return Err(AppError::InvalidServerUrl(format!(
                "{} (HTTPS required, or localhost for development)",
                normalized
            )));
        }

        self.repo.set_setting(KEY_SERVER_URL, &normalized).await
    }

    /// Current bearer token, or None when absent or cleared
    pub async fn auth_token(&self) -> Result<Option<String>> {
        Ok(self
            .repo
            .get_setting(KEY_AUTH_TOKEN)
            .await?
            .filter(|token| !token.trim().is_empty()))
    }

    pub async fn set_auth_token(&self, token: &str) -> Result<()> {
        self.repo.set_setting(KEY_AUTH_TOKEN, token).await
    }

    /// Drop the stored credential. Called when the server answers 401 so
    /// the next cycle surfaces a re-authentication requirement instead of
    /// hammering with a dead token.
    pub async fn clear_auth_token(&self) -> Result<()> {
        self.repo.delete_setting(KEY_AUTH_TOKEN).await
    }

    /// Configured periodic sync interval, clamped to the minimum
    pub async fn sync_interval_minutes(&self) -> Result<u64> {
        let minutes = self
            .repo
            .get_setting(KEY_SYNC_INTERVAL)
            .await?
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(config::DEFAULT_SYNC_INTERVAL_MINUTES);

        Ok(minutes.max(config::MIN_SYNC_INTERVAL_MINUTES))
    }

    pub async fn set_sync_interval_minutes(&self, minutes: u64) -> Result<()> {
        self.repo
            .set_setting(KEY_SYNC_INTERVAL, &minutes.to_string())
            .await
    }

    /// Timestamp of the last fully successful download reconcile
    pub async fn last_synced_at(&self) -> Result<Option<String>> {
        self.repo.get_setting(KEY_LAST_SYNCED_AT).await
    }

    pub async fn set_last_synced_at(&self, timestamp: &str) -> Result<()> {
        self.repo.set_setting(KEY_LAST_SYNCED_AT, timestamp).await
    }
}

/// HTTPS required; plaintext HTTP is allowed only for local development
fn is_valid_server_url(url: &str) -> bool {
    if url.is_empty() {
        // Empty means "not configured"
        return true;
    }
    let lower = url.to_lowercase();
    lower.starts_with("https://")
        || lower.starts_with("http://localhost")
        || lower.starts_with("http://127.0.0.1")
}
