pub mod detector;
pub mod poller;
pub mod sync_loop;

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

use crate::cadapter::{InMemoryRecordStore, RecordStore, ReductClient};
use crate::config::Config;
use poller::DirPoller;
use sync_loop::SyncLoop;

/// Provision the bucket, then poll the watched directory until shutdown.
///
/// Only configuration and bucket provisioning failures are returned; everything
/// after that is logged and retried on the next cycle.
pub async fn run(config: Config) -> anyhow::Result<()> {
    if config.dry_run {
        info!("Dry run, records are kept in memory");
        let store = Arc::new(InMemoryRecordStore::new(config.reduct.chunk_size));
        return watch(store, &config, "memory".to_string()).await;
    }
    let store = Arc::new(ReductClient::new(config.reduct.clone())?);
    watch(store, &config, config.reduct.url.to_string()).await
}

async fn watch<S: RecordStore + 'static>(
    store: Arc<S>,
    config: &Config,
    target: String,
) -> anyhow::Result<()> {
    let poller = prepare(store, config).await?;
    info!("Using bucket `{}` at {target}", config.bucket);

    let sync_loop = SyncLoop::new(poller, config.interval);
    let token = sync_loop.cancellation_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });

    info!(
        "Watching {:?} every {:?}",
        config.watched_dir, config.interval
    );
    let poller = sync_loop.run().await;
    info!("Stopped after tracking {} files", poller.state().len());
    Ok(())
}

/// Provision the bucket and build a poller, loading stored records when resuming.
pub async fn prepare<S: RecordStore + 'static>(
    store: Arc<S>,
    config: &Config,
) -> anyhow::Result<DirPoller<S>> {
    let bucket = store
        .ensure_bucket(&config.bucket, &config.bucket_settings)
        .await
        .with_context(|| format!("Failed to create bucket `{}`", config.bucket))?;

    let mut poller = DirPoller::new(
        config.watched_dir.clone(),
        store,
        bucket,
        config.upload_timeout,
    );
    if config.resume {
        match poller.resume_from_store().await {
            Ok(n) => info!("Loaded latest records of {n} entries"),
            Err(e) => warn!("Could not load stored records, every file will be uploaded: {e}"),
        }
    }
    Ok(poller)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down...");
}
