//! Transfer task
//!
//! One object's life cycle: generate a key, upload it (multipart or single
//! shot), then delete it. Every failure is contained in the returned
//! [`TransferOutcome`]; nothing escapes to the scheduler.

use super::chunk::{self, ChunkReader};
use super::multipart::MultipartSession;
use super::put_object::PutObjectHandler;
use super::{TransferOutcome, TransferStatus, UploadError, UploadResult};
use crate::classifier;
use crate::config::{LoadConfig, S3Config, UploadMode};
use crate::metrics;
use crate::s3::ObjectStore;
use crate::source::{ByteSource, OpenedSource};
use bytes::Bytes;
use rand::Rng;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tracing::Instrument;

const KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const KEY_RANDOM_LEN: usize = 6;

/// Parameters shared by every transfer of a run
#[derive(Debug, Clone)]
pub struct TransferSpec {
    pub bucket: String,
    pub key_prefix: String,
    pub key_suffix: String,
    pub part_size: usize,
    pub mode: UploadMode,
}

impl TransferSpec {
    pub fn from_config(s3: &S3Config, load: &LoadConfig) -> Self {
        Self {
            bucket: s3.bucket.clone(),
            key_prefix: load.key_prefix.clone(),
            key_suffix: load.key_suffix.clone(),
            part_size: load.part_size_bytes() as usize,
            mode: load.mode,
        }
    }
}

/// `{prefix}-{iteration}-{task}-{random}{suffix}`, random being six
/// characters of `[a-z0-9]`
pub fn generate_object_key(prefix: &str, iteration: u64, task_index: usize, suffix: &str) -> String {
    let mut rng = rand::rng();
    let random: String = (0..KEY_RANDOM_LEN)
        .map(|_| KEY_ALPHABET[rng.random_range(0..KEY_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}-{}-{}{}", prefix, iteration, task_index, random, suffix)
}

/// Upload failure together with what the store had acknowledged
struct Failed {
    error: UploadError,
    bytes_uploaded: u64,
}

/// Log an upload failure and wrap it for the outcome
fn fail(key: &str, error: UploadError, bytes_uploaded: u64) -> Failed {
    log_failure(key, &error);
    Failed {
        error,
        bytes_uploaded,
    }
}

/// A single object transfer within a wave
pub struct TransferTask {
    store: Arc<dyn ObjectStore>,
    source: Arc<dyn ByteSource>,
    spec: Arc<TransferSpec>,
    iteration: u64,
    task_index: usize,
}

impl TransferTask {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        source: Arc<dyn ByteSource>,
        spec: Arc<TransferSpec>,
        iteration: u64,
        task_index: usize,
    ) -> Self {
        Self {
            store,
            source,
            spec,
            iteration,
            task_index,
        }
    }

    /// Upload, then delete, one freshly keyed object.
    ///
    /// Delete is only attempted after a successful upload.
    pub async fn run(self) -> TransferOutcome {
        let key = generate_object_key(
            &self.spec.key_prefix,
            self.iteration,
            self.task_index,
            &self.spec.key_suffix,
        );
        let span = tracing::info_span!(
            "transfer",
            iteration = self.iteration,
            task = self.task_index,
            key = %key
        );
        self.run_with_key(key).instrument(span).await
    }

    async fn run_with_key(self, key: String) -> TransferOutcome {
        let start = Instant::now();
        let _in_flight = metrics::transfer_in_flight();

        let upload = match self.spec.mode {
            UploadMode::Multipart => self.upload_multipart(&key).await,
            UploadMode::Put => self.upload_single(&key).await,
        };

        let outcome = match upload {
            Ok(result) => self.delete(key, result).await,
            Err(failed) => TransferOutcome {
                object_key: key,
                status: TransferStatus::UploadFailed,
                error: Some(failed.error),
                bytes_uploaded: failed.bytes_uploaded,
            },
        };

        metrics::record_transfer(
            self.spec.mode.as_str(),
            outcome.status.as_str(),
            start.elapsed().as_secs_f64(),
        );
        outcome
    }

    async fn upload_multipart(&self, key: &str) -> Result<UploadResult, Failed> {
        let opened = self
            .source
            .open()
            .await
            .map_err(|e| fail(key, e.into(), 0))?;
        let total_parts = chunk::part_count(opened.size, self.spec.part_size as u64);
        tracing::info!(
            size = opened.size,
            part_size = self.spec.part_size,
            total_parts = total_parts,
            "Starting multipart upload"
        );

        let mut session = MultipartSession::new(
            Arc::clone(&self.store),
            self.spec.bucket.as_str(),
            key,
            self.spec.part_size as u64,
        );
        session
            .initiate()
            .await
            .map_err(|e| fail(key, e, 0))?;

        match self.send_parts(&mut session, opened, total_parts).await {
            Ok(etag) => {
                metrics::record_multipart_complete(session.completed_parts().len());
                Ok(UploadResult {
                    etag,
                    parts: session.completed_parts().len(),
                    bytes_written: session.bytes_uploaded(),
                })
            }
            Err(error) => {
                let failed = fail(key, error, session.bytes_uploaded());
                let _ = session.abort().await;
                Err(failed)
            }
        }
    }

    async fn send_parts(
        &self,
        session: &mut MultipartSession,
        opened: OpenedSource,
        total_parts: u64,
    ) -> Result<Option<String>, UploadError> {
        let mut reader = ChunkReader::new(opened.reader, self.spec.part_size);

        while let Some(part) = reader.next_part().await? {
            let part_number = session.next_part_number();
            let size = part.len() as u64;
            session.upload_part(part_number, part).await?;
            metrics::record_upload_bytes(size);

            let etag = session
                .completed_parts()
                .last()
                .map(|p| p.etag.as_str())
                .unwrap_or_default();
            tracing::info!(
                part_number = part_number,
                total_parts = total_parts,
                bytes = size,
                etag = %etag,
                "Uploaded part {}/{}",
                part_number,
                total_parts
            );
        }

        session.complete().await
    }

    async fn upload_single(&self, key: &str) -> Result<UploadResult, Failed> {
        let mut opened = self
            .source
            .open()
            .await
            .map_err(|e| fail(key, e.into(), 0))?;
        let mut body = Vec::with_capacity(opened.size as usize);
        opened
            .reader
            .read_to_end(&mut body)
            .await
            .map_err(|e| fail(key, e.into(), 0))?;
        tracing::info!(size = body.len(), "Starting single-shot upload");

        PutObjectHandler::new(Arc::clone(&self.store))
            .upload(&self.spec.bucket, key, Bytes::from(body))
            .await
            .map_err(|e| fail(key, e, 0))
    }

    async fn delete(&self, key: String, result: UploadResult) -> TransferOutcome {
        match self.store.delete_object(&self.spec.bucket, &key).await {
            Ok(()) => {
                tracing::info!(
                    bytes = result.bytes_written,
                    parts = result.parts,
                    "Transfer succeeded, object deleted"
                );
                TransferOutcome {
                    object_key: key,
                    status: TransferStatus::Succeeded,
                    error: None,
                    bytes_uploaded: result.bytes_written,
                }
            }
            Err(e) => {
                classifier::log_store_error(&key, "delete", &e);
                TransferOutcome {
                    object_key: key,
                    status: TransferStatus::DeleteFailed,
                    error: Some(UploadError::DeleteError(e)),
                    bytes_uploaded: result.bytes_written,
                }
            }
        }
    }
}

fn log_failure(key: &str, error: &UploadError) {
    match error.store_error() {
        Some(store_error) => classifier::log_store_error(key, error.phase(), store_error),
        None => tracing::error!(key = %key, phase = error.phase(), error = %error, "Transfer failed"),
    }
}
