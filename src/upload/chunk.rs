//! Fixed-size part reader
//!
//! Splits a byte stream into parts of exactly `part_size` bytes, except the
//! last one which carries the remainder.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Sequential, non-restartable part reader over an [`AsyncRead`]
pub struct ChunkReader<R> {
    reader: R,
    part_size: usize,
    finished: bool,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Create a reader producing parts of `part_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `part_size` is zero.
    pub fn new(reader: R, part_size: usize) -> Self {
        assert!(part_size > 0, "part size must be greater than zero");
        Self {
            reader,
            part_size,
            finished: false,
            bytes_read: 0,
        }
    }

    /// Read the next part.
    ///
    /// Returns `Ok(None)` once the source is exhausted; every later call
    /// returns `Ok(None)` as well. Short reads from the underlying source are
    /// retried until the part is full or the source ends.
    pub async fn next_part(&mut self) -> std::io::Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = BytesMut::with_capacity(self.part_size);
        while buf.len() < self.part_size {
            // read_buf never reads past the remaining capacity
            let n = (&mut self.reader)
                .take((self.part_size - buf.len()) as u64)
                .read_buf(&mut buf)
                .await?;
            if n == 0 {
                self.finished = true;
                break;
            }
        }

        if buf.is_empty() {
            return Ok(None);
        }

        self.bytes_read += buf.len() as u64;
        Ok(Some(buf.freeze()))
    }

    /// Total bytes handed out so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }
}

/// Number of parts a source of `size` bytes splits into
pub fn part_count(size: u64, part_size: u64) -> u64 {
    size.div_ceil(part_size)
}
