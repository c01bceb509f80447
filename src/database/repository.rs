//! Repository layer for the local note store
//!
//! Provides the narrow per-row operations shared by the UI surface, the
//! download reconciler, and the upload dispatcher. Every mutating
//! operation is atomic with respect to a single uid row, and every
//! mutation publishes a change event so live subscriptions can refresh.

use super::models::{Note, NoteStatus};
use crate::error::{AppError, Result};
use sqlx::SqlitePool;
use tokio::sync::{broadcast, watch};

/// Change event published after every store mutation
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub uid: String,
}

/// Repository for note store operations
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    changes: broadcast::Sender<StoreChange>,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self { pool, changes }
    }

    fn notify(&self, uid: &str) {
        // No receivers is fine; the send result only reports subscriber count
        let _ = self.changes.send(StoreChange {
            uid: uid.to_string(),
        });
    }

    /// Subscribe to raw change events
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Get a note by uid
    pub async fn get(&self, uid: &str) -> Result<Option<Note>> {
        let note = sqlx::query_as::<_, Note>("SELECT * FROM notes WHERE uid = ?")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;

        Ok(note)
    }

    /// Insert or fully replace a note row. No partial-field merge: callers
    /// needing partial updates must read-modify-write or use the dedicated
    /// update operations below.
    pub async fn upsert(&self, note: &Note) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO notes (
                uid, title, body, kind, status, tags, priority, calendar,
                date, start_time, end_time, source,
                gcal_enabled, gcal_event_id, gcal_last_pushed_at,
                created, updated, synced_at, pending_sync, client_uuid, sync_error
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&note.uid)
        .bind(&note.title)
        .bind(&note.body)
        .bind(note.kind)
        .bind(note.status)
        .bind(&note.tags)
        .bind(note.priority)
        .bind(&note.calendar)
        .bind(&note.date)
        .bind(&note.start_time)
        .bind(&note.end_time)
        .bind(&note.source)
        .bind(note.gcal_enabled)
        .bind(&note.gcal_event_id)
        .bind(&note.gcal_last_pushed_at)
        .bind(&note.created)
        .bind(&note.updated)
        .bind(&note.synced_at)
        .bind(note.pending_sync)
        .bind(&note.client_uuid)
        .bind(&note.sync_error)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Upserted note: {}", note.uid);
        self.notify(&note.uid);
        Ok(())
    }

    /// Upsert a batch of notes in one transaction
    pub async fn upsert_all(&self, notes: &[Note]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for note in notes {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO notes (
                    uid, title, body, kind, status, tags, priority, calendar,
                    date, start_time, end_time, source,
                    gcal_enabled, gcal_event_id, gcal_last_pushed_at,
                    created, updated, synced_at, pending_sync, client_uuid, sync_error
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&note.uid)
            .bind(&note.title)
            .bind(&note.body)
            .bind(note.kind)
            .bind(note.status)
            .bind(&note.tags)
            .bind(note.priority)
            .bind(&note.calendar)
            .bind(&note.date)
            .bind(&note.start_time)
            .bind(&note.end_time)
            .bind(&note.source)
            .bind(note.gcal_enabled)
            .bind(&note.gcal_event_id)
            .bind(&note.gcal_last_pushed_at)
            .bind(&note.created)
            .bind(&note.updated)
            .bind(&note.synced_at)
            .bind(note.pending_sync)
            .bind(&note.client_uuid)
            .bind(&note.sync_error)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        for note in notes {
            self.notify(&note.uid);
        }
        Ok(())
    }

    /// List rows awaiting upload, in stable created order.
    ///
    /// Rows carrying a sync_error are excluded: a permanent 4xx pauses
    /// automatic retries until [`clear_sync_error`](Self::clear_sync_error)
    /// re-arms the row.
    pub async fn list_pending_sync(&self) -> Result<Vec<Note>> {
        let notes = sqlx::query_as::<_, Note>(
            r#"
            SELECT * FROM notes
            WHERE pending_sync = 1 AND sync_error IS NULL
            ORDER BY created ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(notes)
    }

    /// List rows whose last upload failed permanently
    pub async fn list_sync_errors(&self) -> Result<Vec<Note>> {
        let notes = sqlx::query_as::<_, Note>(
            "SELECT * FROM notes WHERE sync_error IS NOT NULL ORDER BY created ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(notes)
    }

    /// List notes by lifecycle status, newest first
    pub async fn list_by_status(&self, status: NoteStatus) -> Result<Vec<Note>> {
        let notes =
            sqlx::query_as::<_, Note>("SELECT * FROM notes WHERE status = ? ORDER BY created DESC")
                .bind(status)
                .fetch_all(&self.pool)
                .await?;

        Ok(notes)
    }

    /// Live-updating view of notes with the given status.
    ///
    /// The returned receiver holds the current result set and refreshes
    /// whenever any store mutation lands. Dropping all receivers stops the
    /// refresh task.
    pub fn watch_by_status(&self, status: NoteStatus) -> watch::Receiver<Vec<Note>> {
        let (tx, rx) = watch::channel(Vec::new());
        let repo = self.clone();
        let mut changes = self.changes.subscribe();

        tokio::spawn(async move {
            loop {
                match repo.list_by_status(status).await {
                    Ok(notes) => {
                        if tx.send(notes).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Live query refresh failed: {}", e),
                }

                match changes.recv().await {
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        rx
    }

    pub async fn count_by_status(&self, status: NoteStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE status = ?")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    pub async fn count_pending_sync(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE pending_sync = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Search open notes by title or body.
    ///
    /// Queries of 3+ characters go through the FTS index with a prefix
    /// wildcard; shorter queries fall back to a LIKE scan.
    pub async fn search(&self, query: &str) -> Result<Vec<Note>> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return self.list_by_status(NoteStatus::Open).await;
        }

        if trimmed.chars().count() >= crate::config::FTS_MIN_QUERY_CHARS {
            // Strip FTS operators before appending the prefix wildcard
            let escaped: String = trimmed
                .chars()
                .map(|c| match c {
                    '*' | '^' | '~' | '"' | '\'' | '-' | '(' | ')' | ':' => ' ',
                    _ => c,
                })
                .collect();
            let escaped = escaped.trim().to_string();

            if !escaped.is_empty() {
                let notes = sqlx::query_as::<_, Note>(
                    r#"
                    SELECT notes.* FROM notes
                    JOIN notes_fts ON notes.rowid = notes_fts.rowid
                    WHERE notes_fts MATCH ? AND notes.status = 'open'
                    ORDER BY notes.created DESC
                    "#,
                )
                .bind(format!("{}*", escaped))
                .fetch_all(&self.pool)
                .await?;

                return Ok(notes);
            }
        }

        let notes = sqlx::query_as::<_, Note>(
            r#"
            SELECT * FROM notes
            WHERE status = 'open' AND (title LIKE '%' || ? || '%' OR body LIKE '%' || ? || '%')
            ORDER BY created DESC
            "#,
        )
        .bind(trimmed)
        .bind(trimmed)
        .fetch_all(&self.pool)
        .await?;

        Ok(notes)
    }

    /// Clear pending state after a confirmed upload or merge
    pub async fn mark_synced(&self, uid: &str, synced_at: &str) -> Result<()> {
        sqlx::query(
            "UPDATE notes SET pending_sync = 0, synced_at = ?, sync_error = NULL WHERE uid = ?",
        )
        .bind(synced_at)
        .bind(uid)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Marked synced: {}", uid);
        self.notify(uid);
        Ok(())
    }

    /// Record a permanent upload failure. The row stays pending so the
    /// edit remains visible as needing attention, but automatic retries
    /// are paused until the error is cleared.
    pub async fn mark_sync_error(&self, uid: &str, message: &str) -> Result<()> {
        sqlx::query("UPDATE notes SET sync_error = ? WHERE uid = ?")
            .bind(message)
            .bind(uid)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Marked sync error on {}: {}", uid, message);
        self.notify(uid);
        Ok(())
    }

    /// Re-arm a row for upload after a permanent failure (manual retry)
    pub async fn clear_sync_error(&self, uid: &str) -> Result<()> {
        sqlx::query("UPDATE notes SET sync_error = NULL WHERE uid = ?")
            .bind(uid)
            .execute(&self.pool)
            .await?;

        self.notify(uid);
        Ok(())
    }

    /// Local status mutation: stamps `updated` and marks the row pending
    pub async fn update_status(&self, uid: &str, status: NoteStatus, updated: &str) -> Result<()> {
        let rows = sqlx::query(
            "UPDATE notes SET status = ?, updated = ?, pending_sync = 1 WHERE uid = ?",
        )
        .bind(status)
        .bind(updated)
        .bind(uid)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::NoteNotFound(uid.to_string()));
        }

        self.notify(uid);
        Ok(())
    }

    /// Local content mutation: stamps `updated` and marks the row pending
    pub async fn update_content(
        &self,
        uid: &str,
        title: &str,
        body: &str,
        tags: &str,
        updated: &str,
    ) -> Result<()> {
        let rows = sqlx::query(
            r#"
            UPDATE notes SET title = ?, body = ?, tags = ?, updated = ?, pending_sync = 1
            WHERE uid = ?
            "#,
        )
        .bind(title)
        .bind(body)
        .bind(tags)
        .bind(updated)
        .bind(uid)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::NoteNotFound(uid.to_string()));
        }

        self.notify(uid);
        Ok(())
    }

    /// Replace a temporary offline-capture uid with the server-assigned
    /// one after a successful create upload.
    ///
    /// Runs in a transaction: if the reconciler already merged the server
    /// copy under the new uid (idempotent create), that row is dropped in
    /// favor of the migrated local one so the temporary key never lingers.
    pub async fn migrate_uid(&self, old_uid: &str, new_uid: &str, synced_at: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM notes WHERE uid = ?")
            .bind(new_uid)
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query(
            r#"
            UPDATE notes SET uid = ?, pending_sync = 0, synced_at = ?, sync_error = NULL
            WHERE uid = ?
            "#,
        )
        .bind(new_uid)
        .bind(synced_at)
        .bind(old_uid)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            tx.rollback().await?;
            return Err(AppError::NoteNotFound(old_uid.to_string()));
        }

        tx.commit().await?;

        tracing::debug!("Migrated uid {} -> {}", old_uid, new_uid);
        self.notify(old_uid);
        self.notify(new_uid);
        Ok(())
    }

    /// Get a persisted scalar setting
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    /// Set a persisted scalar setting
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a persisted scalar setting
    pub async fn delete_setting(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
