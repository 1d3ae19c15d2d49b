//! Incremental RESP2/RESP3 reply decoder.

use crate::error::ProtocolError;
use crate::reply::Reply;
use bytes::{Buf, Bytes, BytesMut};

/// Default upper bound for a single bulk payload (512 MiB, the server limit).
pub const DEFAULT_MAX_BULK_LEN: u64 = 512 * 1024 * 1024;

/// Maximum nesting of aggregate replies.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Aggregate lengths above this are not preallocated.
const MAX_PREALLOC: usize = 1024;

/// Decoder options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Produce [`Reply::Map`] and [`Reply::Set`]; when false both are
    /// flattened into [`Reply::Array`].
    pub use_maps: bool,
    /// Decode bulk strings into [`Reply::String`] when they are valid UTF-8;
    /// when false they stay [`Reply::Bytes`].
    pub decode_bulk: bool,
    /// Keep attribute maps as [`Reply::Attributed`]; when false they are
    /// dropped.
    pub use_attributes: bool,
    /// Largest accepted bulk payload.
    pub max_bulk_len: u64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            use_maps: true,
            decode_bulk: true,
            use_attributes: true,
            max_bulk_len: DEFAULT_MAX_BULK_LEN,
        }
    }
}

impl DecoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_maps(mut self, use_maps: bool) -> Self {
        self.use_maps = use_maps;
        self
    }

    pub fn with_decode_bulk(mut self, decode_bulk: bool) -> Self {
        self.decode_bulk = decode_bulk;
        self
    }

    pub fn with_attributes(mut self, use_attributes: bool) -> Self {
        self.use_attributes = use_attributes;
        self
    }

    pub fn with_max_bulk_len(mut self, max_bulk_len: u64) -> Self {
        self.max_bulk_len = max_bulk_len;
        self
    }
}

/// Buffers incoming bytes and decodes complete replies.
pub struct Decoder {
    buffer: BytesMut,
    config: DecoderConfig,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            config,
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Appends bytes to the internal buffer.
    pub fn extend_bytes(&mut self, data: Bytes) {
        self.buffer.extend_from_slice(&data);
    }

    /// Attempts to decode the next reply from the buffer.
    ///
    /// Returns `Ok(None)` when the buffer holds no complete reply yet; partial
    /// input is left in place.
    pub fn decode_reply(&mut self) -> Result<Option<Reply>, ProtocolError> {
        let mut parser = Parser {
            buf: &self.buffer,
            pos: 0,
            config: &self.config,
        };

        match parser.reply(0)? {
            Some(reply) => {
                let consumed = parser.pos;
                self.buffer.advance(consumed);
                Ok(Some(reply))
            }
            None => Ok(None),
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Unwraps a complete value or bails out with `Ok(None)`.
macro_rules! need {
    ($e:expr) => {
        match $e? {
            Some(value) => value,
            None => return Ok(None),
        }
    };
}

type Parsed<T> = Result<Option<T>, ProtocolError>;

struct Parser<'a> {
    buf: &'a [u8],
    pos: usize,
    config: &'a DecoderConfig,
}

impl<'a> Parser<'a> {
    fn reply(&mut self, depth: usize) -> Parsed<Reply> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ProtocolError::NestingTooDeep(MAX_NESTING_DEPTH));
        }

        let Some(&prefix) = self.buf.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;
        let line = need!(self.line());

        let reply = match prefix {
            b'+' => Reply::Status(text(line)?),
            b'-' => Reply::Error(text(line)?),
            b':' => Reply::Integer(integer(line)?),
            b'_' => Reply::Null,
            b',' => Reply::Double(double(line)?),
            b'#' => Reply::Boolean(boolean(line)?),
            b'(' => Reply::BigNumber(text(line)?),
            b'$' => match self.len_or_null(line)? {
                Some(len) => {
                    let data = need!(self.payload(len));
                    self.bulk(data)
                }
                None => Reply::Null,
            },
            b'!' => {
                let len = self.len(line)?;
                Reply::Error(String::from_utf8_lossy(need!(self.payload(len))).into_owned())
            }
            b'=' => {
                let len = self.len(line)?;
                verbatim(need!(self.payload(len)))?
            }
            b'*' => match self.len_or_null(line)? {
                Some(count) => Reply::Array(need!(self.items(count, depth))),
                None => Reply::Null,
            },
            b'~' => {
                let items = need!(self.items(self.len(line)?, depth));
                if self.config.use_maps {
                    Reply::Set(items)
                } else {
                    Reply::Array(items)
                }
            }
            b'>' => Reply::Push(need!(self.items(self.len(line)?, depth))),
            b'%' => {
                let pairs = need!(self.pairs(self.len(line)?, depth));
                if self.config.use_maps {
                    Reply::Map(pairs)
                } else {
                    Reply::Array(pairs.into_iter().flat_map(|(k, v)| [k, v]).collect())
                }
            }
            b'|' => {
                let attributes = need!(self.pairs(self.len(line)?, depth));
                let reply = need!(self.reply(depth));
                if self.config.use_attributes {
                    Reply::Attributed {
                        attributes,
                        reply: Box::new(reply),
                    }
                } else {
                    reply
                }
            }
            other => return Err(ProtocolError::InvalidPrefix(other)),
        };

        Ok(Some(reply))
    }

    /// Reads up to the next CRLF, which is consumed but not returned.
    fn line(&mut self) -> Parsed<&'a [u8]> {
        let buf = self.buf;
        let rest = &buf[self.pos..];
        match rest.windows(2).position(|w| w == b"\r\n") {
            Some(end) => {
                self.pos += end + 2;
                Ok(Some(&rest[..end]))
            }
            None => Ok(None),
        }
    }

    /// Reads `len` bytes followed by CRLF.
    fn payload(&mut self, len: usize) -> Parsed<&'a [u8]> {
        let buf = self.buf;
        let rest = &buf[self.pos..];
        let end = len.checked_add(2).ok_or(ProtocolError::BulkTooLarge {
            size: len as u64,
            max: self.config.max_bulk_len,
        })?;
        if rest.len() < end {
            return Ok(None);
        }
        if &rest[len..end] != b"\r\n" {
            return Err(ProtocolError::MissingCrlf);
        }
        self.pos += end;
        Ok(Some(&rest[..len]))
    }

    fn items(&mut self, count: usize, depth: usize) -> Parsed<Vec<Reply>> {
        let mut items = Vec::with_capacity(count.min(MAX_PREALLOC));
        for _ in 0..count {
            items.push(need!(self.reply(depth + 1)));
        }
        Ok(Some(items))
    }

    fn pairs(&mut self, count: usize, depth: usize) -> Parsed<Vec<(Reply, Reply)>> {
        let mut pairs = Vec::with_capacity(count.min(MAX_PREALLOC));
        for _ in 0..count {
            let key = need!(self.reply(depth + 1));
            let value = need!(self.reply(depth + 1));
            pairs.push((key, value));
        }
        Ok(Some(pairs))
    }

    fn bulk(&self, data: &[u8]) -> Reply {
        if !self.config.decode_bulk {
            return Reply::Bytes(Bytes::copy_from_slice(data));
        }
        match String::from_utf8(data.to_vec()) {
            Ok(s) => Reply::String(s),
            Err(e) => Reply::Bytes(Bytes::from(e.into_bytes())),
        }
    }

    /// Parses a length where `-1` means null.
    fn len_or_null(&self, line: &[u8]) -> Result<Option<usize>, ProtocolError> {
        if line == b"-1" {
            return Ok(None);
        }
        self.len(line).map(Some)
    }

    fn len(&self, line: &[u8]) -> Result<usize, ProtocolError> {
        let invalid = || ProtocolError::InvalidLength(String::from_utf8_lossy(line).into_owned());
        let len: u64 = std::str::from_utf8(line)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(invalid)?;
        if len > self.config.max_bulk_len {
            return Err(ProtocolError::BulkTooLarge {
                size: len,
                max: self.config.max_bulk_len,
            });
        }
        usize::try_from(len).map_err(|_| invalid())
    }
}

fn text(line: &[u8]) -> Result<String, ProtocolError> {
    std::str::from_utf8(line)
        .map(str::to_owned)
        .map_err(|_| ProtocolError::InvalidUtf8)
}

fn integer(line: &[u8]) -> Result<i64, ProtocolError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProtocolError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))
}

fn double(line: &[u8]) -> Result<f64, ProtocolError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProtocolError::InvalidDouble(String::from_utf8_lossy(line).into_owned()))
}

fn boolean(line: &[u8]) -> Result<bool, ProtocolError> {
    match line {
        b"t" => Ok(true),
        b"f" => Ok(false),
        _ => Err(ProtocolError::InvalidBoolean(
            String::from_utf8_lossy(line).into_owned(),
        )),
    }
}

/// `=<len>\r\n<fmt>:<text>\r\n`, where `fmt` is exactly three bytes.
fn verbatim(data: &[u8]) -> Result<Reply, ProtocolError> {
    if data.len() < 4 || data[3] != b':' {
        return Err(ProtocolError::InvalidVerbatim);
    }
    let format = text(&data[..3])?;
    match String::from_utf8(data[4..].to_vec()) {
        Ok(text) => Ok(Reply::Verbatim { format, text }),
        Err(e) => Ok(Reply::Bytes(Bytes::from(e.into_bytes()))),
    }
}
