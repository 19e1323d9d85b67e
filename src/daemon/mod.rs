pub mod scheduler;

use crate::builder::FolderScanBuilder;
use crate::core::settings::Settings;
use crate::core::store::CacheHolder;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use scheduler::{RefreshHandle, RefreshScheduler};

/// Serves the registry cache until Ctrl-C.
pub async fn run(settings: Settings) -> Result<()> {
    tracing::info!(
        package_folder = %settings.registry.package_folder.display(),
        "Starting registry cache daemon"
    );

    let holder = CacheHolder::new();
    let handle = RefreshScheduler::from_settings(
        Arc::new(FolderScanBuilder::new()),
        holder.clone(),
        &settings,
    )
    .spawn();

    let reporter = tokio::spawn(report_progress(
        holder.clone(),
        settings.progress_log_interval(),
        handle.cancel_token(),
    ));

    wait_for_shutdown(&handle).await?;

    tracing::info!("Shutdown requested");
    handle.shutdown().await?;
    join_background("progress reporter", reporter).await;

    let status = holder.status().await;
    tracing::info!(
        generation = status.generation,
        cycles = status.stats.cycles,
        "Registry cache daemon stopped"
    );
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown(handle: &RefreshHandle) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                return result.context("Failed to listen for Ctrl-C");
            }
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, refreshing registry cache");
                handle.trigger();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_handle: &RefreshHandle) -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")
}

/// Awaits a background task, logging instead of dropping a panic or cancellation.
async fn join_background(name: &'static str, task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(task = name, error = %e, "Background task failed");
            false
        }
    }
}

async fn report_progress(holder: CacheHolder, every: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let progress = holder.progress();
        if progress.is_known() && !progress.is_complete() {
            let percent = progress.fraction().map_or(0.0, |f| f * 100.0);
            tracing::info!(
                current = progress.current,
                total = progress.total,
                percent,
                ready = holder.is_ready(),
                "Registry cache build in progress"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_background_reports_panicked_task() {
        let ok = tokio::spawn(async {});
        assert!(join_background("ok", ok).await);

        let panicked = tokio::spawn(async { panic!("reporter crashed") });
        assert!(!join_background("panicked", panicked).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_progress_stops_on_cancel() {
        let holder = CacheHolder::new();
        holder.set_progress(3, 10);
        let cancel = CancellationToken::new();
        let reporter = tokio::spawn(report_progress(
            holder,
            Duration::from_secs(1),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(3)).await;
        cancel.cancel();

        assert!(join_background("progress reporter", reporter).await);
    }
}
