//! ChunkReader: pulls a file in fixed-size windows for a streaming record write.

use std::io;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// One window of a record payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data: Bytes,
    /// Set on the chunk that brings the bytes read up to the size recorded at open.
    pub last: bool,
}

/// Lazy, finite and non-restartable sequence of chunks over one file.
///
/// The total size is captured once, when the upload starts. A file that shrinks
/// underneath the reader fails with `UnexpectedEof`; a file whose length no
/// longer matches once every expected byte was read fails instead of producing
/// a final chunk, so a half-updated payload is never committed.
pub struct ChunkReader {
    file: File,
    path: PathBuf,
    total: u64,
    read: u64,
    buf: BytesMut,
    finished: bool,
}

impl ChunkReader {
    pub fn new(file: File, total: u64, path: impl Into<PathBuf>) -> Self {
        Self {
            file,
            path: path.into(),
            total,
            read: 0,
            buf: BytesMut::new(),
            finished: false,
        }
    }

    /// Open `path` and record its current length as the payload size.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        let total = file.metadata().await?.len();
        Ok(Self::new(file, total, path))
    }

    pub fn total_size(&self) -> u64 {
        self.total
    }

    /// Pull the next chunk of at most `max_len` bytes.
    ///
    /// Returns `Ok(None)` once the final chunk was handed out or after an error.
    pub async fn next_chunk(&mut self, max_len: usize) -> io::Result<Option<Chunk>> {
        if self.finished {
            return Ok(None);
        }
        match self.fill(max_len).await {
            Ok(chunk) => Ok(Some(chunk)),
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    async fn fill(&mut self, max_len: usize) -> io::Result<Chunk> {
        let remaining = self.total - self.read;
        let want = remaining.min(max_len as u64) as usize;
        if want == 0 && remaining > 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "chunk size must be greater than zero",
            ));
        }

        self.buf.clear();
        self.buf.reserve(want);
        while self.buf.len() < want {
            let limit = (want - self.buf.len()) as u64;
            let n = (&mut self.file).take(limit).read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "{:?} ended after {} of {} bytes",
                        self.path,
                        self.read + self.buf.len() as u64,
                        self.total
                    ),
                ));
            }
        }

        let offset = self.read;
        self.read += want as u64;
        let last = self.read == self.total;
        if last {
            let now = self.file.metadata().await?.len();
            if now != self.total {
                return Err(io::Error::other(format!(
                    "{:?} changed size during upload: expected {} bytes, found {}",
                    self.path, self.total, now
                )));
            }
            self.finished = true;
        }

        debug!(path = ?self.path, offset, len = want, last, "chunk read");
        Ok(Chunk {
            data: self.buf.split().freeze(),
            last,
        })
    }

    /// Consume the reader as a body stream pulling `chunk_size` windows.
    pub fn into_stream(self, chunk_size: usize) -> impl Stream<Item = io::Result<Bytes>> + Send {
        futures::stream::try_unfold(self, move |mut reader| async move {
            let next = reader.next_chunk(chunk_size).await?;
            Ok::<_, io::Error>(next.map(|chunk| (chunk.data, reader)))
        })
    }
}
