//! Pull source of decoded replies over a byte stream.

use crate::error::ClientError;
use respipe_protocol::{Decoder, DecoderConfig, Reply};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Reads bytes from `R` and decodes them one reply at a time.
pub struct ReplyReader<R> {
    reader: R,
    decoder: Decoder,
    buf: Vec<u8>,
}

impl<R> ReplyReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, config: DecoderConfig, read_buffer_size: usize) -> Self {
        Self {
            reader,
            decoder: Decoder::with_config(config),
            buf: vec![0u8; read_buffer_size.max(1)],
        }
    }

    /// Returns the next reply in wire order.
    ///
    /// `Ok(None)` means the stream ended cleanly between replies. Ending in
    /// the middle of a reply is an `UnexpectedEof` error.
    ///
    /// Cancel safe: bytes read before cancellation stay buffered.
    pub async fn next_reply(&mut self) -> Result<Option<Reply>, ClientError> {
        loop {
            if let Some(reply) = self.decoder.decode_reply()? {
                return Ok(Some(reply));
            }

            let n = self.reader.read(&mut self.buf).await?;
            tracing::trace!("read {} bytes", n);

            if n == 0 {
                let buffered = self.decoder.buffered();
                if buffered == 0 {
                    return Ok(None);
                }
                return Err(ClientError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended inside a reply ({buffered} bytes buffered)"),
                )));
            }

            self.decoder.extend(&self.buf[..n]);
        }
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.decoder.buffered()
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}
