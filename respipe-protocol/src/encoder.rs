//! Command encoder queue.
//!
//! Commands are buffered until [`CommandEncoderQueue::flush`] renders a batch
//! of them into RESP request frames:
//!
//! ```text
//! *<argc>\r\n                          array header, name + arguments
//! $<len>\r\n<bytes>\r\n                text, numbers, raw bytes, sized blobs
//! $?\r\n;<n>\r\n<chunk>...;0\r\n       payloads of unknown length
//! ```
//!
//! Framing text accumulates in a single buffer and only becomes a separate
//! composer part when a raw or streamed payload has to be interleaved.

use crate::byte_count::utf8_len;
use crate::command::{Argument, BlobProvider, ByteStream, Command};
use crate::composer::{Composed, FrameComposer};
use bytes::{BufMut, Bytes, BytesMut};
use futures::future;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::VecDeque;
use std::io;

/// Maximum number of commands rendered by one flush of the write loop.
pub const DEFAULT_BATCH_LIMIT: usize = 10_000;

/// Text shorter than this is copied into the framing buffer; longer text is
/// handed to the composer as its own part.
pub const INLINE_TEXT_LIMIT: usize = 1024;

const CRLF: &[u8] = b"\r\n";
const STREAMED_HEADER: &[u8] = b"$?\r\n";
const STREAMED_TERMINATOR: &[u8] = b";0\r\n";

/// Initial capacity of the framing buffer.
const HEAD_CAPACITY: usize = 8 * 1024;

/// FIFO of commands waiting to be rendered.
#[derive(Debug)]
pub struct CommandEncoderQueue {
    commands: VecDeque<Command>,
    composer: FrameComposer,
    head: BytesMut,
}

impl CommandEncoderQueue {
    pub fn new() -> Self {
        Self {
            commands: VecDeque::new(),
            composer: FrameComposer::new(),
            head: BytesMut::with_capacity(HEAD_CAPACITY),
        }
    }

    /// Queues a command.
    pub fn add(&mut self, cmd: Command) {
        self.commands.push_back(cmd);
    }

    /// Number of commands not yet rendered.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drops every pending command and any partially composed output.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.composer.clear();
        self.head.clear();
    }

    /// Removes up to `max` of the oldest commands and renders them into one
    /// composed output.
    ///
    /// Returns `None` when `max` is zero or nothing is pending. Removed
    /// commands are consumed whether or not the output is ever written.
    pub fn flush(&mut self, max: usize) -> Option<Composed> {
        let count = max.min(self.commands.len());
        if count == 0 {
            return None;
        }

        let mut frame = FrameWriter {
            head: &mut self.head,
            composer: &mut self.composer,
        };

        if count == 1 {
            if let Some(cmd) = self.commands.pop_front() {
                frame.command(cmd);
            }
        } else {
            for cmd in self.commands.drain(..count) {
                frame.command(cmd);
            }
        }

        frame.seal();
        self.composer.compose()
    }
}

impl Default for CommandEncoderQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders commands into the framing buffer and the composer.
struct FrameWriter<'a> {
    head: &'a mut BytesMut,
    composer: &'a mut FrameComposer,
}

impl FrameWriter<'_> {
    fn command(&mut self, cmd: Command) {
        let (name, args) = cmd.into_parts();

        self.prefixed(b'*', 1 + args.len() as u64);
        self.text(name);

        for arg in args {
            match arg {
                Argument::Text(s) => self.text(s),
                Argument::Wide(units) => self.wide(&units),
                Argument::Bytes(b) => self.raw(b),
                Argument::Int(n) => self.inline(Decimal::signed(n).as_bytes()),
                Argument::UInt(n) => self.inline(Decimal::unsigned(n).as_bytes()),
                Argument::Float(n) => self.inline(n.to_string().as_bytes()),
                Argument::Blob(provider) => self.blob(provider.as_ref()),
                Argument::Stream(stream) => self.streamed(stream),
            }
        }
    }

    /// Moves the framing text accumulated so far into the composer.
    fn seal(&mut self) {
        if !self.head.is_empty() {
            self.composer.add_chunk(self.head.split().freeze());
        }
    }

    fn prefixed(&mut self, prefix: u8, n: u64) {
        self.head.put_u8(prefix);
        self.head.put_slice(Decimal::unsigned(n).as_bytes());
        self.head.put_slice(CRLF);
    }

    fn inline(&mut self, bytes: &[u8]) {
        self.prefixed(b'$', bytes.len() as u64);
        self.head.put_slice(bytes);
        self.head.put_slice(CRLF);
    }

    fn text(&mut self, s: String) {
        if s.len() < INLINE_TEXT_LIMIT {
            self.inline(s.as_bytes());
        } else {
            self.raw(Bytes::from(s));
        }
    }

    fn wide(&mut self, units: &[u16]) {
        if units.len() >= INLINE_TEXT_LIMIT {
            self.raw(Bytes::from(String::from_utf16_lossy(units)));
            return;
        }

        let len = utf8_len(units);
        self.prefixed(b'$', len as u64);
        self.head.reserve(len + CRLF.len());

        let mut tmp = [0u8; 4];
        for c in char::decode_utf16(units.iter().copied()) {
            let c = c.unwrap_or(char::REPLACEMENT_CHARACTER);
            self.head.put_slice(c.encode_utf8(&mut tmp).as_bytes());
        }
        self.head.put_slice(CRLF);
    }

    fn raw(&mut self, bytes: Bytes) {
        self.prefixed(b'$', bytes.len() as u64);
        self.seal();
        self.composer.add_chunk(bytes);
        self.head.put_slice(CRLF);
    }

    fn blob(&mut self, provider: &dyn BlobProvider) {
        let size = provider.size();
        self.prefixed(b'$', size);
        self.seal();
        self.composer.add_stream(sized(provider.stream(), size));
        self.head.put_slice(CRLF);
    }

    fn streamed(&mut self, source: ByteStream) {
        self.head.put_slice(STREAMED_HEADER);
        self.seal();
        self.composer.add_stream(chunked(source));
        self.head.put_slice(STREAMED_TERMINATOR);
    }
}

/// Fails the stream if it yields more or fewer than `size` bytes, which would
/// otherwise desynchronize the framing.
fn sized(source: ByteStream, size: u64) -> ByteStream {
    stream::unfold(
        (source, 0u64, false),
        move |(mut source, seen, done)| async move {
            if done {
                return None;
            }
            match source.next().await {
                Some(Ok(chunk)) => {
                    let seen = seen + chunk.len() as u64;
                    if seen > size {
                        let err = invalid_size(size, format!("at least {seen}"));
                        Some((Err(err), (source, seen, true)))
                    } else {
                        Some((Ok(chunk), (source, seen, false)))
                    }
                }
                Some(Err(e)) => Some((Err(e), (source, seen, true))),
                None if seen != size => {
                    let err = invalid_size(size, seen.to_string());
                    Some((Err(err), (source, seen, true)))
                }
                None => None,
            }
        },
    )
    .boxed()
}

fn invalid_size(expected: u64, actual: String) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("blob declared {expected} bytes but produced {actual}"),
    )
}

/// Prefixes every non-empty chunk with `;<len>\r\n`.
fn chunked(source: ByteStream) -> ByteStream {
    source
        .try_filter(|chunk| future::ready(!chunk.is_empty()))
        .map_ok(|chunk| {
            let mut header = BytesMut::with_capacity(24);
            header.put_u8(b';');
            header.put_slice(Decimal::unsigned(chunk.len() as u64).as_bytes());
            header.put_slice(CRLF);
            stream::iter([Ok::<_, io::Error>(header.freeze()), Ok(chunk)])
        })
        .try_flatten()
        .boxed()
}

/// Decimal rendering of an integer on the stack.
struct Decimal {
    buf: [u8; 20],
    start: usize,
}

impl Decimal {
    fn unsigned(mut n: u64) -> Self {
        let mut buf = [0u8; 20];
        let mut start = buf.len();
        loop {
            start -= 1;
            buf[start] = b'0' + (n % 10) as u8;
            n /= 10;
            if n == 0 {
                break;
            }
        }
        Self { buf, start }
    }

    fn signed(n: i64) -> Self {
        let mut out = Self::unsigned(n.unsigned_abs());
        if n < 0 {
            out.start -= 1;
            out.buf[out.start] = b'-';
        }
        out
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[self.start..]
    }
}
