//! Blob providers backed by async readers and files.

use bytes::BytesMut;
use futures::stream::{self, StreamExt, TryStreamExt};
use respipe_protocol::{BlobProvider, ByteStream};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default chunk size for reads (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Turns an async reader into a stream of chunks of at most `chunk_size`
/// bytes, ending at EOF.
pub fn reader_stream<R>(reader: R, chunk_size: usize) -> ByteStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let chunk_size = chunk_size.max(1);
    stream::try_unfold(reader, move |mut reader| async move {
        let mut buf = BytesMut::with_capacity(chunk_size);
        if reader.read_buf(&mut buf).await? == 0 {
            return Ok(None);
        }
        Ok(Some((buf.freeze(), reader)))
    })
    .boxed()
}

/// A file sent as a sized argument.
///
/// The size is taken when the blob is opened. The file is re-opened on every
/// [`stream`](BlobProvider::stream) call; if it changed size in between, the
/// write fails instead of sending a corrupt frame.
#[derive(Debug, Clone)]
pub struct FileBlob {
    path: PathBuf,
    size: u64,
    chunk_size: usize,
}

impl FileBlob {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(Self {
            path,
            size: metadata.len(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlobProvider for FileBlob {
    fn size(&self) -> u64 {
        self.size
    }

    fn stream(&self) -> ByteStream {
        let path = self.path.clone();
        let chunk_size = self.chunk_size;
        stream::once(File::open(path))
            .map_ok(move |file| reader_stream(file, chunk_size))
            .try_flatten()
            .boxed()
    }
}
