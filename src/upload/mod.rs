//! Upload module
//!
//! The multipart protocol driver and the per-object transfer built on it.
//!
//! - [`chunk::ChunkReader`] splits a source into fixed-size parts
//! - [`multipart::MultipartSession`] owns one upload id from initiate to
//!   complete or abort
//! - [`put_object::PutObjectHandler`] is the single-shot alternative
//! - [`transfer::TransferTask`] uploads one object, then deletes it

use crate::s3::S3ClientError;
use std::fmt;
use thiserror::Error;

pub mod chunk;
pub mod multipart;
pub mod put_object;
pub mod transfer;

pub use chunk::ChunkReader;
pub use multipart::{MultipartSession, SessionState};
pub use put_object::PutObjectHandler;
pub use transfer::{TransferSpec, TransferTask};

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Initiate error: {0}")]
    InitiateError(#[source] S3ClientError),

    #[error("Upload part {part_number} error: {source}")]
    UploadPartError {
        part_number: i32,
        #[source]
        source: S3ClientError,
    },

    #[error("Complete error: {0}")]
    CompleteError(#[source] S3ClientError),

    #[error("Abort error: {0}")]
    AbortError(#[source] S3ClientError),

    #[error("Put error: {0}")]
    PutError(#[source] S3ClientError),

    #[error("Delete error: {0}")]
    DeleteError(#[source] S3ClientError),

    #[error("Read error: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

impl UploadError {
    /// Protocol phase the error belongs to, used in logs and metrics
    pub fn phase(&self) -> &'static str {
        match self {
            UploadError::InitiateError(_) => "initiate",
            UploadError::UploadPartError { .. } => "upload_part",
            UploadError::CompleteError(_) => "complete",
            UploadError::AbortError(_) => "abort",
            UploadError::PutError(_) => "put",
            UploadError::DeleteError(_) => "delete",
            UploadError::ReadError(_) => "read",
            UploadError::InvalidState(_) => "state",
        }
    }

    /// Underlying store error, if the failure came from the store
    pub fn store_error(&self) -> Option<&S3ClientError> {
        match self {
            UploadError::InitiateError(e)
            | UploadError::CompleteError(e)
            | UploadError::AbortError(e)
            | UploadError::PutError(e)
            | UploadError::DeleteError(e)
            | UploadError::UploadPartError { source: e, .. } => Some(e),
            UploadError::ReadError(_) | UploadError::InvalidState(_) => None,
        }
    }
}

/// How a transfer ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferStatus {
    Succeeded,
    UploadFailed,
    DeleteFailed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Succeeded => "succeeded",
            TransferStatus::UploadFailed => "upload_failed",
            TransferStatus::DeleteFailed => "delete_failed",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one transfer, produced exactly once per task
#[derive(Debug)]
pub struct TransferOutcome {
    pub object_key: String,
    pub status: TransferStatus,
    pub error: Option<UploadError>,
    /// Bytes acknowledged by the store before the outcome was decided
    pub bytes_uploaded: u64,
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        self.status == TransferStatus::Succeeded
    }
}

/// Upload result
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub etag: Option<String>,
    pub parts: usize,
    pub bytes_written: u64,
}
