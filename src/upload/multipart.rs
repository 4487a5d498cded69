//! Multipart upload session
//!
//! Drives a single upload id through the S3 multipart protocol:
//!
//! ```text
//! Uninitiated --initiate--> Active --complete--> Completed
//!                             |  \
//!                             |   complete fails --> Failed --abort--> Aborted
//!                             +--abort--> Aborted
//! ```
//!
//! Every step is individually failable. A failed `upload_part` leaves the
//! session `Active`; the caller decides whether to abort. `abort` is
//! best-effort: it is attempted at most once and its failure is only logged.

use super::UploadError;
use crate::classifier;
use crate::metrics;
use crate::s3::{ObjectStore, S3CompletedPart};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// Multipart session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitiated,
    Active,
    Completed,
    /// Completion was rejected; only `abort` is allowed
    Failed,
    Aborted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One object's multipart upload, exclusively owned by its transfer
pub struct MultipartSession {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
    part_size: u64,
    upload_id: Option<String>,
    next_part_number: i32,
    parts: Vec<S3CompletedPart>,
    bytes_uploaded: u64,
    state: SessionState,
}

impl MultipartSession {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        part_size: u64,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            key: key.into(),
            part_size,
            upload_id: None,
            next_part_number: 1,
            parts: Vec::new(),
            bytes_uploaded: 0,
            state: SessionState::Uninitiated,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Upload id issued by the store, once initiated
    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// Part number the next `upload_part` call must carry
    pub fn next_part_number(&self) -> i32 {
        self.next_part_number
    }

    /// Parts acknowledged so far, in upload order
    pub fn completed_parts(&self) -> &[S3CompletedPart] {
        &self.parts
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded
    }

    fn expect_state(&self, expected: SessionState, operation: &str) -> Result<(), UploadError> {
        if self.state != expected {
            return Err(UploadError::InvalidState(format!(
                "cannot {} in state {}",
                operation, self.state
            )));
        }
        Ok(())
    }

    fn active_upload_id(&self) -> Result<&str, UploadError> {
        self.upload_id
            .as_deref()
            .ok_or_else(|| UploadError::InvalidState("session has no upload id".into()))
    }

    /// Request an upload id from the store.
    ///
    /// The state is unchanged on failure.
    #[tracing::instrument(
        name = "upload.multipart.initiate",
        skip(self),
        fields(s3.bucket = %self.bucket, s3.key = %self.key),
        err
    )]
    pub async fn initiate(&mut self) -> Result<(), UploadError> {
        self.expect_state(SessionState::Uninitiated, "initiate")?;

        let upload_id = self
            .store
            .create_multipart_upload(&self.bucket, &self.key)
            .await
            .map_err(UploadError::InitiateError)?;

        tracing::info!(upload_id = %upload_id, "Created multipart upload");

        self.upload_id = Some(upload_id);
        self.state = SessionState::Active;
        Ok(())
    }

    /// Upload one part and record its entity tag.
    ///
    /// Part numbers must arrive as 1, 2, 3, ... with no gaps or repeats, and
    /// no part may exceed the session's part size. Either violation is
    /// rejected before the store is contacted. On a store error the session
    /// stays `Active` and nothing is recorded.
    #[tracing::instrument(
        name = "upload.multipart.upload_part",
        skip(self, body),
        fields(s3.key = %self.key, upload.bytes = body.len()),
        err
    )]
    pub async fn upload_part(&mut self, part_number: i32, body: Bytes) -> Result<(), UploadError> {
        self.expect_state(SessionState::Active, "upload part")?;

        if part_number != self.next_part_number {
            return Err(UploadError::InvalidState(format!(
                "part {} out of order, expected part {}",
                part_number, self.next_part_number
            )));
        }

        let size = body.len() as u64;
        if size > self.part_size {
            return Err(UploadError::InvalidState(format!(
                "part {} is {} bytes, larger than the part size {}",
                part_number, size, self.part_size
            )));
        }

        let upload_id = self.active_upload_id()?;

        let etag = self
            .store
            .upload_part(&self.bucket, &self.key, upload_id, part_number, body)
            .await
            .map_err(|source| UploadError::UploadPartError {
                part_number,
                source,
            })?;

        tracing::debug!(part_number = part_number, etag = %etag, size = size, "Uploaded part");

        self.parts.push(S3CompletedPart { part_number, etag });
        self.next_part_number += 1;
        self.bytes_uploaded += size;
        Ok(())
    }

    /// Submit the ordered part list for assembly.
    ///
    /// On failure the session moves to `Failed`: the caller must treat the
    /// object as not uploaded and may only abort.
    #[tracing::instrument(
        name = "upload.multipart.complete",
        skip(self),
        fields(s3.key = %self.key, parts_count = self.parts.len()),
        err
    )]
    pub async fn complete(&mut self) -> Result<Option<String>, UploadError> {
        self.expect_state(SessionState::Active, "complete")?;

        if self.parts.is_empty() {
            self.state = SessionState::Failed;
            return Err(UploadError::InvalidState("no parts uploaded".into()));
        }

        let upload_id = self.active_upload_id()?;
        let result = self
            .store
            .complete_multipart_upload(&self.bucket, &self.key, upload_id, self.parts.clone())
            .await;

        match result {
            Ok(etag) => {
                self.state = SessionState::Completed;
                tracing::info!(
                    parts = self.parts.len(),
                    bytes = self.bytes_uploaded,
                    etag = ?etag,
                    "Completed multipart upload"
                );
                Ok(etag)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(UploadError::CompleteError(e))
            }
        }
    }

    /// Ask the store to discard all parts.
    ///
    /// Allowed from `Active` or `Failed`. The store is contacted at most once
    /// per session; calling again after an abort is a no-op. A store error is
    /// logged and returned, and the session is `Aborted` either way.
    #[tracing::instrument(
        name = "upload.multipart.abort",
        skip(self),
        fields(s3.key = %self.key, upload_id = ?self.upload_id)
    )]
    pub async fn abort(&mut self) -> Result<(), UploadError> {
        match self.state {
            SessionState::Aborted => return Ok(()),
            SessionState::Active | SessionState::Failed => {}
            other => {
                return Err(UploadError::InvalidState(format!(
                    "cannot abort in state {}",
                    other
                )));
            }
        }

        let upload_id = self.active_upload_id()?.to_string();
        self.state = SessionState::Aborted;

        tracing::warn!(upload_id = %upload_id, parts = self.parts.len(), "Aborting multipart upload");

        match self
            .store
            .abort_multipart_upload(&self.bucket, &self.key, &upload_id)
            .await
        {
            Ok(()) => {
                metrics::record_abort(true);
                Ok(())
            }
            Err(e) => {
                metrics::record_abort(false);
                classifier::log_store_error(&self.key, "abort", &e);
                Err(UploadError::AbortError(e))
            }
        }
    }
}
