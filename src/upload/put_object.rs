//! Single-request uploads
//!
//! Single-request upload of a whole payload, used in `put` mode.

use super::{UploadError, UploadResult};
use crate::metrics;
use crate::s3::ObjectStore;
use bytes::Bytes;
use std::sync::Arc;

/// Single-shot upload handler
pub struct PutObjectHandler {
    store: Arc<dyn ObjectStore>,
}

impl PutObjectHandler {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(
        name = "upload.put_object",
        skip(self, body),
        fields(
            s3.bucket = %bucket,
            s3.key = %key,
            upload.bytes = body.len(),
            s3.etag = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
    ) -> Result<UploadResult, UploadError> {
        let bytes_written = body.len() as u64;

        let etag = self
            .store
            .put_object(bucket, key, body)
            .await
            .map_err(UploadError::PutError)?;

        metrics::record_upload_bytes(bytes_written);
        if let Some(etag) = &etag {
            tracing::Span::current().record("s3.etag", etag.as_str());
        }
        tracing::info!(bytes_written = bytes_written, etag = ?etag, "PutObject upload completed");

        Ok(UploadResult {
            etag,
            parts: 1,
            bytes_written,
        })
    }
}
