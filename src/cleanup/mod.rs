//! Stale multipart cleanup
//!
//! Sweeps in-progress multipart uploads a load run left behind, for example
//! when an abort failed or the process was killed mid-wave.

use crate::classifier;
use crate::metrics;
use crate::s3::{ObjectStore, PendingUpload, S3ClientError};
use futures::stream::{self, StreamExt};

/// Result of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub found: usize,
    pub aborted: usize,
    pub failed: usize,
}

/// Abort every in-progress upload under `prefix` in `bucket`.
///
/// Aborts run with at most `concurrency` in flight. Individual abort
/// failures are logged and counted; only a failed listing is an error.
#[tracing::instrument(skip(store))]
pub async fn abort_stale(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    concurrency: usize,
) -> Result<CleanupSummary, S3ClientError> {
    let uploads = store.list_multipart_uploads(bucket, prefix).await?;

    let mut summary = CleanupSummary {
        found: uploads.len(),
        ..Default::default()
    };
    if uploads.is_empty() {
        tracing::info!("No multipart uploads to abort");
        return Ok(summary);
    }
    tracing::info!(found = uploads.len(), "Aborting stale multipart uploads");

    let results: Vec<bool> = stream::iter(uploads)
        .map(|upload| abort_one(store, bucket, upload))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    summary.aborted = results.iter().filter(|ok| **ok).count();
    summary.failed = results.len() - summary.aborted;

    tracing::info!(
        found = summary.found,
        aborted = summary.aborted,
        failed = summary.failed,
        "Stale upload cleanup finished"
    );
    Ok(summary)
}

async fn abort_one(store: &dyn ObjectStore, bucket: &str, upload: PendingUpload) -> bool {
    tracing::info!(key = %upload.key, upload_id = %upload.upload_id, "Aborting multipart upload");
    match store
        .abort_multipart_upload(bucket, &upload.key, &upload.upload_id)
        .await
    {
        Ok(()) => {
            metrics::record_abort(true);
            true
        }
        Err(e) => {
            metrics::record_abort(false);
            classifier::log_store_error(&upload.key, "abort", &e);
            false
        }
    }
}
