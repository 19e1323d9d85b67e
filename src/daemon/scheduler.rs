use crate::builder::CatalogBuilder;
use crate::core::models::{CycleOutcome, Snapshot};
use crate::core::retry::RetryState;
use crate::core::settings::{BuildParameters, Settings, ShutdownMode};
use crate::core::store::CacheHolder;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Repeats build → evaluate → publish/discard → wait until cancelled.
///
/// At most one build is in flight at a time because the loop awaits each
/// one before doing anything else. Nothing is locked across a build; the
/// holder is only touched for progress updates and the final publish.
pub struct RefreshScheduler {
    builder: Arc<dyn CatalogBuilder>,
    holder: CacheHolder,
    parameters: BuildParameters,
    interval: Duration,
    retry_base_delay: Option<Duration>,
    shutdown: ShutdownMode,
    wake: Arc<Notify>,
}

impl RefreshScheduler {
    pub fn new(
        builder: Arc<dyn CatalogBuilder>,
        holder: CacheHolder,
        parameters: BuildParameters,
        interval: Duration,
    ) -> Self {
        Self {
            builder,
            holder,
            parameters,
            interval,
            retry_base_delay: None,
            shutdown: ShutdownMode::default(),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn from_settings(
        builder: Arc<dyn CatalogBuilder>,
        holder: CacheHolder,
        settings: &Settings,
    ) -> Self {
        Self::new(
            builder,
            holder,
            settings.build_parameters(),
            settings.interval(),
        )
        .with_retry(settings.retry_base_delay())
        .with_shutdown(settings.shutdown)
    }

    pub fn with_retry(mut self, base_delay: Option<Duration>) -> Self {
        self.retry_base_delay = base_delay;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownMode) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Runs the refresh loop on the current runtime.
    pub fn spawn(self) -> RefreshHandle {
        let cancel = CancellationToken::new();
        let wake = Arc::clone(&self.wake);
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(token).await });

        RefreshHandle { cancel, wake, task }
    }

    /// Runs cycles until `cancel` fires. A failing cycle never ends the loop.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            builder = self.builder.name(),
            interval_secs = self.interval.as_secs(),
            shutdown = ?self.shutdown,
            "Refresh scheduler started"
        );

        let mut retry = RetryState::new(self.retry_base_delay);

        while !cancel.is_cancelled() {
            let outcome = self.run_cycle(&cancel).await;
            self.holder.record_outcome(&outcome).await;

            if outcome == CycleOutcome::Abandoned {
                break;
            }
            if outcome.is_failure() {
                retry.record_failure();
            } else {
                retry.record_success();
            }

            if cancel.is_cancelled() {
                break;
            }

            let delay = retry.next_delay(self.interval);
            if retry.is_in_backoff() {
                tracing::debug!(
                    consecutive_failures = retry.consecutive_failures(),
                    delay_secs = delay.as_secs(),
                    "Waiting before retrying failed refresh"
                );
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.wake.notified() => {
                    tracing::info!("Immediate refresh requested");
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Refresh scheduler stopped");
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> CycleOutcome {
        tracing::info!("Starting to update registry cache");
        self.holder.reset_progress();

        let holder = self.holder.clone();
        let on_progress = move |current: u32, total: u32| holder.set_progress(current, total);
        let build = self.builder.build(&self.parameters, &on_progress);

        let result = match self.shutdown {
            ShutdownMode::Drain => build.await,
            ShutdownMode::Abort => tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Shutdown requested, abandoning in-flight build");
                    return CycleOutcome::Abandoned;
                }
                result = build => result,
            },
        };

        self.evaluate(result)
    }

    fn evaluate(&self, result: Result<Snapshot>) -> CycleOutcome {
        match result {
            Ok(snapshot) if !snapshot.is_publishable() => {
                tracing::warn!("Registry cache not updated due to errors, see previous logs");
                CycleOutcome::Discarded
            }
            Ok(snapshot) => {
                let packages = snapshot.catalog.len();
                let generation = self.holder.publish(Arc::new(snapshot));
                tracing::info!(generation, packages, "Registry cache successfully updated");
                CycleOutcome::Published {
                    generation,
                    packages,
                }
            }
            Err(e) => {
                let reason = format!("{e:#}");
                tracing::error!(error = %reason, "Error while building a new registry cache");
                CycleOutcome::Failed(reason)
            }
        }
    }
}

/// Owns a spawned [`RefreshScheduler`].
pub struct RefreshHandle {
    cancel: CancellationToken,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Skips the current wait. If a build is running, the next cycle starts
    /// as soon as it finishes.
    pub fn trigger(&self) {
        self.wake.notify_one();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.task.await.context("Refresh scheduler task failed")
    }
}
