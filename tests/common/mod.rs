//! Shared test infrastructure
//!
//! [`RecordingStore`] is an in-process [`ObjectStore`] that records every
//! call with a timestamp, optionally sleeps to simulate latency, and fails
//! calls selected by an injected rule.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use s3_loadgen::s3::{ObjectStore, PendingUpload, S3ClientError, S3CompletedPart};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub const MIB: usize = 1024 * 1024;

/// A store call as seen by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { key: String },
    UploadPart { key: String, part_number: i32, size: usize },
    Complete { key: String, parts: Vec<i32> },
    Abort { key: String, upload_id: String },
    Put { key: String, size: usize },
    Delete { key: String },
    List { prefix: String },
}

impl Call {
    pub fn key(&self) -> Option<&str> {
        match self {
            Call::Create { key }
            | Call::UploadPart { key, .. }
            | Call::Complete { key, .. }
            | Call::Abort { key, .. }
            | Call::Put { key, .. }
            | Call::Delete { key } => Some(key),
            Call::List { .. } => None,
        }
    }

    /// Iteration encoded in keys shaped `{prefix}-{iteration}-{task}-...`
    pub fn iteration(&self) -> Option<u64> {
        self.key()?.split('-').nth(1)?.parse().ok()
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub call: Call,
    pub at: Instant,
}

type FailureRule = Box<dyn Fn(&Call) -> Option<S3ClientError> + Send + Sync>;

pub struct RecordingStore {
    events: Mutex<Vec<Event>>,
    failure: Option<FailureRule>,
    latency: Duration,
    pending: Vec<PendingUpload>,
    next_upload_id: AtomicU64,
}

impl Default for RecordingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            failure: None,
            latency: Duration::ZERO,
            pending: Vec::new(),
            next_upload_id: AtomicU64::new(1),
        }
    }

    /// Fail (or panic on) the calls the rule selects
    pub fn with_failure<F>(mut self, rule: F) -> Self
    where
        F: Fn(&Call) -> Option<S3ClientError> + Send + Sync + 'static,
    {
        self.failure = Some(Box::new(rule));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Uploads returned by `list_multipart_uploads`
    pub fn with_pending(mut self, pending: Vec<PendingUpload>) -> Self {
        self.pending = pending;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.events.lock().iter().map(|e| e.call.clone()).collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(&e.call)).count()
    }

    async fn handle(&self, call: Call) -> Result<(), S3ClientError> {
        self.events.lock().push(Event {
            call: call.clone(),
            at: Instant::now(),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.failure.as_ref().and_then(|rule| rule(&call)) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Transient server-side failure
pub fn internal_error() -> S3ClientError {
    S3ClientError::service("InternalError", "We encountered an internal error")
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn create_multipart_upload(&self, _bucket: &str, key: &str) -> Result<String, S3ClientError> {
        self.handle(Call::Create { key: key.into() }).await?;
        let id = self.next_upload_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("upload-{}", id))
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        key: &str,
        _upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String, S3ClientError> {
        self.handle(Call::UploadPart {
            key: key.into(),
            part_number,
            size: body.len(),
        })
        .await?;
        Ok(format!("\"etag-{}\"", part_number))
    }

    async fn complete_multipart_upload(
        &self,
        _bucket: &str,
        key: &str,
        _upload_id: &str,
        parts: Vec<S3CompletedPart>,
    ) -> Result<Option<String>, S3ClientError> {
        self.handle(Call::Complete {
            key: key.into(),
            parts: parts.iter().map(|p| p.part_number).collect(),
        })
        .await?;
        Ok(Some(format!("\"final-{}\"", parts.len())))
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), S3ClientError> {
        self.handle(Call::Abort {
            key: key.into(),
            upload_id: upload_id.into(),
        })
        .await
    }

    async fn put_object(
        &self,
        _bucket: &str,
        key: &str,
        body: Bytes,
    ) -> Result<Option<String>, S3ClientError> {
        self.handle(Call::Put {
            key: key.into(),
            size: body.len(),
        })
        .await?;
        Ok(Some("\"put\"".into()))
    }

    async fn delete_object(&self, _bucket: &str, key: &str) -> Result<(), S3ClientError> {
        self.handle(Call::Delete { key: key.into() }).await
    }

    async fn list_multipart_uploads(
        &self,
        _bucket: &str,
        prefix: &str,
    ) -> Result<Vec<PendingUpload>, S3ClientError> {
        self.handle(Call::List {
            prefix: prefix.into(),
        })
        .await?;
        Ok(self
            .pending
            .iter()
            .filter(|p| p.key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
