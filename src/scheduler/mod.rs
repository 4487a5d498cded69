//! Iteration scheduler
//!
//! Runs waves of concurrent transfers. A wave spawns `wave_width` tasks,
//! collects every outcome over a bounded channel, and only then sleeps
//! `wave_delay` before the next wave starts. Individual failures never stop
//! the loop; only a shutdown signal or `max_waves` does.

use crate::metrics;
use crate::s3::ObjectStore;
use crate::source::ByteSource;
use crate::upload::{TransferOutcome, TransferSpec, TransferStatus, TransferTask};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

/// Aggregate of one wave
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaveReport {
    pub iteration: u64,
    pub launched: usize,
    pub succeeded: usize,
    pub upload_failed: usize,
    pub delete_failed: usize,
    /// Tasks that ended without reporting an outcome
    pub panicked: usize,
    pub elapsed: Duration,
}

impl WaveReport {
    fn new(iteration: u64, launched: usize) -> Self {
        Self {
            iteration,
            launched,
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: &TransferOutcome) {
        match outcome.status {
            TransferStatus::Succeeded => self.succeeded += 1,
            TransferStatus::UploadFailed => self.upload_failed += 1,
            TransferStatus::DeleteFailed => self.delete_failed += 1,
        }
    }

    /// Outcomes received so far
    pub fn reported(&self) -> usize {
        self.succeeded + self.upload_failed + self.delete_failed
    }

    pub fn failed(&self) -> usize {
        self.upload_failed + self.delete_failed + self.panicked
    }
}

/// Totals over a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub waves: u64,
    pub succeeded: u64,
    pub upload_failed: u64,
    pub delete_failed: u64,
    pub panicked: u64,
}

impl RunSummary {
    fn add(&mut self, report: &WaveReport) {
        self.waves += 1;
        self.succeeded += report.succeeded as u64;
        self.upload_failed += report.upload_failed as u64;
        self.delete_failed += report.delete_failed as u64;
        self.panicked += report.panicked as u64;
    }
}

/// Wave-based fan-out/fan-in loop over [`TransferTask`]s
pub struct IterationScheduler {
    store: Arc<dyn ObjectStore>,
    source: Arc<dyn ByteSource>,
    spec: Arc<TransferSpec>,
    wave_width: usize,
    wave_delay: Duration,
    max_waves: Option<u64>,
}

impl IterationScheduler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        source: Arc<dyn ByteSource>,
        spec: TransferSpec,
        wave_width: usize,
        wave_delay: Duration,
    ) -> Self {
        Self {
            store,
            source,
            spec: Arc::new(spec),
            wave_width,
            wave_delay,
            max_waves: None,
        }
    }

    /// Stop after `max_waves` waves; `None` runs until shutdown
    pub fn with_max_waves(mut self, max_waves: Option<u64>) -> Self {
        self.max_waves = max_waves;
        self
    }

    pub fn wave_width(&self) -> usize {
        self.wave_width
    }

    /// Run one wave and wait for all of its tasks.
    ///
    /// Outcomes arrive in completion order. A task that panics drops its
    /// sender without reporting and is counted in `panicked`.
    pub async fn run_wave(&self, iteration: u64) -> WaveReport {
        let span = tracing::info_span!("wave", iteration = iteration);
        self.collect_wave(iteration).instrument(span).await
    }

    async fn collect_wave(&self, iteration: u64) -> WaveReport {
        let start = Instant::now();
        tracing::info!(
            wave_width = self.wave_width,
            "Starting wave of {} transfers",
            self.wave_width
        );

        let (tx, mut rx) = mpsc::channel::<TransferOutcome>(self.wave_width.max(1));
        for task_index in 1..=self.wave_width {
            let task = TransferTask::new(
                Arc::clone(&self.store),
                Arc::clone(&self.source),
                Arc::clone(&self.spec),
                iteration,
                task_index,
            );
            let tx = tx.clone();
            tokio::spawn(
                async move {
                    let outcome = task.run().await;
                    let _ = tx.send(outcome).await;
                }
                .in_current_span(),
            );
        }
        drop(tx);

        let mut report = WaveReport::new(iteration, self.wave_width);
        while let Some(outcome) = rx.recv().await {
            report.record(&outcome);
        }
        report.panicked = report.launched - report.reported();
        report.elapsed = start.elapsed();

        metrics::record_wave(report.elapsed.as_secs_f64());
        if report.panicked > 0 {
            tracing::error!(panicked = report.panicked, "Transfer tasks ended without an outcome");
        }
        tracing::info!(
            launched = report.launched,
            succeeded = report.succeeded,
            upload_failed = report.upload_failed,
            delete_failed = report.delete_failed,
            panicked = report.panicked,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "wave complete"
        );
        report
    }

    /// Run waves until `shutdown` turns true or `max_waves` is reached.
    ///
    /// A shutdown never interrupts a running wave; during the inter-wave
    /// delay it ends the delay immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut iteration: u64 = 1;

        loop {
            if *shutdown.borrow() {
                tracing::info!("Shutdown requested, not starting another wave");
                break;
            }

            let report = self.run_wave(iteration).await;
            summary.add(&report);

            if self.max_waves.is_some_and(|max| summary.waves >= max) {
                tracing::info!(waves = summary.waves, "Reached wave limit");
                break;
            }

            tracing::info!(
                iteration = iteration,
                delay_secs = self.wave_delay.as_secs_f64(),
                "Pausing before next wave"
            );
            iteration += 1;

            tokio::select! {
                _ = tokio::time::sleep(self.wave_delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => {}
            }
        }

        tracing::info!(
            waves = summary.waves,
            succeeded = summary.succeeded,
            upload_failed = summary.upload_failed,
            delete_failed = summary.delete_failed,
            panicked = summary.panicked,
            "Load run finished"
        );
        summary
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        // Sender gone, so no shutdown can arrive any more
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadMode;
    use crate::s3::{MockObjectStore, S3ClientError};
    use crate::source::MemorySource;

    fn spec() -> TransferSpec {
        TransferSpec {
            bucket: "bucket".into(),
            key_prefix: "obj".into(),
            key_suffix: ".bin".into(),
            part_size: 8,
            mode: UploadMode::Put,
        }
    }

    fn scheduler(mock: MockObjectStore, width: usize) -> IterationScheduler {
        IterationScheduler::new(
            Arc::new(mock),
            Arc::new(MemorySource::zeroed(16)),
            spec(),
            width,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn test_wave_counts_outcomes() {
        let mut mock = MockObjectStore::new();
        mock.expect_put_object()
            .times(4)
            .returning(|_, key, _| {
                if key.starts_with("obj-1-1-") {
                    Err(S3ClientError::service("SlowDown", "slow"))
                } else {
                    Ok(None)
                }
            });
        mock.expect_delete_object()
            .times(3)
            .returning(|_, key| {
                if key.starts_with("obj-1-2-") {
                    Err(S3ClientError::service("AccessDenied", "no"))
                } else {
                    Ok(())
                }
            });

        let report = scheduler(mock, 4).run_wave(1).await;

        assert_eq!(report.launched, 4);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.upload_failed, 1);
        assert_eq!(report.delete_failed, 1);
        assert_eq!(report.panicked, 0);
        assert_eq!(report.failed(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_at_max_waves() {
        let mut mock = MockObjectStore::new();
        mock.expect_put_object().times(6).returning(|_, _, _| Ok(None));
        mock.expect_delete_object().times(6).returning(|_, _| Ok(()));

        let (_tx, rx) = watch::channel(false);
        let summary = scheduler(mock, 2).with_max_waves(Some(3)).run(rx).await;

        assert_eq!(summary.waves, 3);
        assert_eq!(summary.succeeded, 6);
    }

    #[tokio::test]
    async fn test_run_honours_initial_shutdown() {
        let mut mock = MockObjectStore::new();
        mock.expect_put_object().never();

        let (_tx, rx) = watch::channel(true);
        let summary = scheduler(mock, 2).run(rx).await;

        assert_eq!(summary, RunSummary::default());
    }

    #[tokio::test]
    async fn test_dropped_sender_keeps_running() {
        let mut mock = MockObjectStore::new();
        mock.expect_put_object().times(4).returning(|_, _, _| Ok(None));
        mock.expect_delete_object().times(4).returning(|_, _| Ok(()));

        let (tx, rx) = watch::channel(false);
        drop(tx);
        let summary = scheduler(mock, 2).with_max_waves(Some(2)).run(rx).await;

        assert_eq!(summary.waves, 2);
    }
}
