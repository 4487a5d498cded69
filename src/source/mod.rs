//! Source byte providers
//!
//! Every transfer reads its payload from a [`ByteSource`] once, strictly
//! sequentially. The load run uses a generated local file; tests use
//! in-memory buffers.

use async_trait::async_trait;
use bytes::Bytes;
use rand::RngCore;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWriteExt};

/// Size of the random block repeated to fill a generated file
const GENERATE_BLOCK_SIZE: usize = 1024 * 1024;

/// Source errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error on {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Readable payload handed to a transfer, with its total length
pub struct OpenedSource {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub size: u64,
}

/// Something a transfer can open and read from start to end
#[async_trait]
pub trait ByteSource: Send + Sync {
    async fn open(&self) -> std::io::Result<OpenedSource>;
}

/// A local file, reopened by every transfer
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ByteSource for FileSource {
    async fn open(&self) -> std::io::Result<OpenedSource> {
        let file = tokio::fs::File::open(&self.path).await?;
        let size = file.metadata().await?.len();
        Ok(OpenedSource {
            reader: Box::new(file),
            size,
        })
    }
}

/// An in-memory payload; cloning the bytes is cheap
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// A zero-filled payload of `size` bytes
    pub fn zeroed(size: usize) -> Self {
        Self::new(vec![0u8; size])
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn open(&self) -> std::io::Result<OpenedSource> {
        Ok(OpenedSource {
            size: self.data.len() as u64,
            reader: Box::new(Cursor::new(self.data.clone())),
        })
    }
}

/// Create `path` filled with `size_bytes` of random data unless it exists.
///
/// Returns `true` when a new file was written. An existing file is left
/// untouched whatever its size.
pub async fn generate_file(path: &Path, size_bytes: u64) -> Result<bool, SourceError> {
    let io_err = |source| SourceError::IoError {
        path: path.to_path_buf(),
        source,
    };

    if tokio::fs::try_exists(path).await.map_err(io_err)? {
        tracing::info!(path = %path.display(), "Source file already exists, skipping generation");
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    tracing::info!(
        path = %path.display(),
        size_bytes = size_bytes,
        "Generating source file"
    );

    let mut block = vec![0u8; GENERATE_BLOCK_SIZE];
    rand::rng().fill_bytes(&mut block);

    let mut file = tokio::fs::File::create(path).await.map_err(io_err)?;
    let mut written: u64 = 0;
    while written < size_bytes {
        let n = (size_bytes - written).min(GENERATE_BLOCK_SIZE as u64) as usize;
        file.write_all(&block[..n]).await.map_err(io_err)?;
        written += n as u64;

        if written % (1024 * GENERATE_BLOCK_SIZE as u64) == 0 {
            tracing::info!(written_gb = written / (1024 * GENERATE_BLOCK_SIZE as u64), "Generating");
        }
    }
    file.flush().await.map_err(io_err)?;

    tracing::info!(path = %path.display(), "Source file created");
    Ok(true)
}
