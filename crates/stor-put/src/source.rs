//! Byte sources for uploads
//!
//! A file can be reopened at offset 0 for every attempt. Standard input
//! cannot be replayed, so it may be opened exactly once.

use crate::{Result, UploadError};
use bytes::BytesMut;
use futures::{StreamExt, TryStreamExt};
use parking_lot::Mutex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stor_client::ByteStream;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read size for streaming a source
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Where the bytes come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// A file on disk
    File(PathBuf),
    /// Standard input
    Stdin,
}

impl Source {
    /// Base name of the source, if it has one
    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::File(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
            Self::Stdin => None,
        }
    }

    /// Can the source be read more than once
    pub fn is_replayable(&self) -> bool {
        matches!(self, Self::File(_))
    }

    /// Path of a file source
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Stdin => None,
        }
    }

    /// Human-readable origin, used in diagnostics
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Stdin => "standard input".to_string(),
        }
    }

    /// Size of a file source, from its metadata
    pub async fn file_size(&self) -> Result<Option<u64>> {
        match self {
            Self::File(path) => {
                let metadata = tokio::fs::metadata(path)
                    .await
                    .map_err(|e| UploadError::read_failure(self.describe(), e))?;
                if !metadata.is_file() {
                    return Err(UploadError::read_failure(self.describe(), not_a_file()));
                }
                Ok(Some(metadata.len()))
            }
            Self::Stdin => Ok(None),
        }
    }
}

/// Opens a [`Source`] for each attempt, refusing to replay standard input.
///
/// A read error inside an opened stream reaches the store client as a
/// transport failure, so the handle keeps a copy for the attempt to inspect.
#[derive(Debug)]
pub struct SourceHandle {
    source: Source,
    opens: u32,
    read_error: Arc<Mutex<Option<io::Error>>>,
}

impl SourceHandle {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            opens: 0,
            read_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// How many times the source has been opened
    pub fn opens(&self) -> u32 {
        self.opens
    }

    /// Open the source from its start
    pub async fn open(&mut self) -> Result<ByteStream> {
        let stream = match &self.source {
            Source::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| UploadError::read_failure(self.source.describe(), e))?;
                let metadata = file
                    .metadata()
                    .await
                    .map_err(|e| UploadError::read_failure(self.source.describe(), e))?;
                if !metadata.is_file() {
                    return Err(UploadError::read_failure(
                        self.source.describe(),
                        not_a_file(),
                    ));
                }
                reader_stream(file)
            }
            Source::Stdin => {
                if self.opens > 0 {
                    return Err(UploadError::read_failure(
                        self.source.describe(),
                        io::Error::new(io::ErrorKind::Unsupported, "cannot be replayed"),
                    ));
                }
                reader_stream(tokio::io::stdin())
            }
        };

        self.opens += 1;
        *self.read_error.lock() = None;
        Ok(self.record_failures(stream))
    }

    /// Read error hit by the stream of the latest open, if any
    pub fn take_read_error(&self) -> Option<UploadError> {
        self.read_error
            .lock()
            .take()
            .map(|e| UploadError::read_failure(self.source.describe(), e))
    }

    fn record_failures(&self, stream: ByteStream) -> ByteStream {
        let slot = Arc::clone(&self.read_error);
        stream
            .inspect_err(move |e| {
                *slot.lock() = Some(io::Error::new(e.kind(), e.to_string()));
            })
            .boxed()
    }
}

fn not_a_file() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "not a regular file")
}

/// Turn a reader into a stream of chunks of at most [`CHUNK_SIZE`] bytes
pub fn reader_stream<R>(reader: R) -> ByteStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    futures::stream::try_unfold(reader, |mut reader| async move {
        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        let n = reader.read_buf(&mut buf).await?;
        let next = if n == 0 {
            None
        } else {
            Some((buf.freeze(), reader))
        };
        Ok::<_, io::Error>(next)
    })
    .boxed()
}
