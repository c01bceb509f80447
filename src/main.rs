//! Headless sync daemon
//!
//! Wires the store, remote client, and sync engine together and runs the
//! periodic schedule until interrupted. Embedding surfaces use the
//! library crate directly; this binary is the standalone deployment.

use anyhow::Context;
use notesync::database::{create_pool, Repository};
use notesync::remote::RemoteClient;
use notesync::services::SettingsService;
use notesync::sync::{DownloadReconciler, SyncCoordinator, UploadDispatcher};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("notesync=debug,info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_path = std::env::var("NOTESYNC_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("notesync.db"));

    let pool = create_pool(&db_path)
        .await
        .context("Failed to initialize database")?;

    let repo = Repository::new(pool);
    let settings = SettingsService::new(repo.clone());
    let client = Arc::new(RemoteClient::new(settings.clone()).context("Failed to build HTTP client")?);

    let reconciler = DownloadReconciler::new(Arc::clone(&client), repo.clone(), settings.clone());
    let dispatcher = UploadDispatcher::new(Arc::clone(&client), repo, settings.clone());

    let coordinator = SyncCoordinator::new(reconciler, dispatcher)
        .await
        .context("Failed to create sync coordinator")?;
    coordinator.start().await.context("Failed to start sync coordinator")?;

    let interval = settings.sync_interval_minutes().await?;
    coordinator.schedule_periodic(interval).await?;

    // First cycle right away instead of waiting for the first tick
    let handle = coordinator.handle();
    handle.trigger_reconcile();
    handle.trigger_upload();

    tracing::info!("notesync running (database {:?})", db_path);
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down");
    coordinator.shutdown().await?;

    Ok(())
}
