//! Commands and their arguments.
//!
//! A [`Command`] is a name followed by zero or more [`Argument`]s. Exactly one
//! representation is active per argument, and the encoder matches on all of
//! them exhaustively.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::io;

/// A stream of byte chunks used for blob and streamed arguments.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// A sized payload that can produce a fresh byte stream of exactly
/// [`size`](BlobProvider::size) bytes.
pub trait BlobProvider: Send + Sync {
    /// Length of the payload in bytes.
    fn size(&self) -> u64;

    /// Opens a new stream over the payload.
    fn stream(&self) -> ByteStream;
}

/// In-memory blob, mostly useful to stream a large buffer in pieces.
#[derive(Debug, Clone)]
pub struct BytesBlob {
    data: Bytes,
    chunk_size: usize,
}

impl BytesBlob {
    /// Default size of the chunks yielded by [`BlobProvider::stream`].
    pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl BlobProvider for BytesBlob {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn stream(&self) -> ByteStream {
        let data = self.data.clone();
        let chunk_size = self.chunk_size;
        let chunks = (0..data.len())
            .step_by(chunk_size)
            .map(move |start| Ok(data.slice(start..(start + chunk_size).min(data.len()))));
        stream::iter(chunks.collect::<Vec<_>>()).boxed()
    }
}

/// A single command argument.
pub enum Argument {
    /// UTF-8 text.
    Text(String),
    /// UTF-16 text. Unpaired surrogates are sent as U+FFFD.
    Wide(Vec<u16>),
    /// Raw bytes, written without copying.
    Bytes(Bytes),
    /// Signed integer, sent in decimal form.
    Int(i64),
    /// Unsigned integer, sent in decimal form.
    UInt(u64),
    /// Floating point number, sent in its `Display` form: the shortest
    /// decimal that round-trips, never in exponent notation (`1e21` is sent
    /// as `1000000000000000000000`). Infinities are sent as `inf` and `-inf`,
    /// which Redis accepts for float arguments, and NaN as `NaN`.
    Float(f64),
    /// Payload of known size, streamed from its provider.
    Blob(Box<dyn BlobProvider>),
    /// Payload of unknown size, sent as a RESP3 streamed string.
    Stream(ByteStream),
}

impl Argument {
    /// Wraps a blob provider.
    pub fn blob(provider: impl BlobProvider + 'static) -> Self {
        Argument::Blob(Box::new(provider))
    }

    /// Wraps a stream of unknown length.
    pub fn stream<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Argument::Stream(stream.boxed())
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Argument::Wide(w) => f
                .debug_tuple("Wide")
                .field(&String::from_utf16_lossy(w))
                .finish(),
            Argument::Bytes(b) => f.debug_tuple("Bytes").field(b).finish(),
            Argument::Int(n) => f.debug_tuple("Int").field(n).finish(),
            Argument::UInt(n) => f.debug_tuple("UInt").field(n).finish(),
            Argument::Float(n) => f.debug_tuple("Float").field(n).finish(),
            Argument::Blob(b) => f.debug_struct("Blob").field("size", &b.size()).finish(),
            Argument::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Argument::Text(value)
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Argument::Text(value.to_owned())
    }
}

impl From<&String> for Argument {
    fn from(value: &String) -> Self {
        Argument::Text(value.clone())
    }
}

impl From<Bytes> for Argument {
    fn from(value: Bytes) -> Self {
        Argument::Bytes(value)
    }
}

impl From<Vec<u8>> for Argument {
    fn from(value: Vec<u8>) -> Self {
        Argument::Bytes(Bytes::from(value))
    }
}

impl From<&[u8]> for Argument {
    fn from(value: &[u8]) -> Self {
        Argument::Bytes(Bytes::copy_from_slice(value))
    }
}

impl<const N: usize> From<&[u8; N]> for Argument {
    fn from(value: &[u8; N]) -> Self {
        Argument::Bytes(Bytes::copy_from_slice(value))
    }
}

impl From<Vec<u16>> for Argument {
    fn from(value: Vec<u16>) -> Self {
        Argument::Wide(value)
    }
}

impl From<f64> for Argument {
    fn from(value: f64) -> Self {
        Argument::Float(value)
    }
}

impl From<f32> for Argument {
    fn from(value: f32) -> Self {
        Argument::Float(value as f64)
    }
}

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for Argument {
            fn from(value: $t) -> Self {
                Argument::Int(value as i64)
            }
        })*
    };
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for Argument {
            fn from(value: $t) -> Self {
                Argument::UInt(value as u64)
            }
        })*
    };
}

impl_from_signed!(i8, i16, i32, i64, isize);
impl_from_unsigned!(u8, u16, u32, u64, usize);

/// A command name followed by its arguments.
///
/// Ownership moves into the encoder queue when the command is submitted.
#[derive(Debug)]
pub struct Command {
    name: String,
    args: Vec<Argument>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument.
    pub fn arg(mut self, arg: impl Into<Argument>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends every argument yielded by `args`.
    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Argument>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.args
    }

    /// Number of wire elements: the name plus every argument.
    pub fn len(&self) -> usize {
        1 + self.args.len()
    }

    /// Always false, a command carries at least its name.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub(crate) fn into_parts(self) -> (String, Vec<Argument>) {
        (self.name, self.args)
    }
}

/// Builds a [`Command`] from a name and a list of arguments.
///
/// ```
/// use respipe_protocol::command;
///
/// let cmd = command!("HSET", "key", "field", 42);
/// assert_eq!(cmd.name(), "HSET");
/// assert_eq!(cmd.len(), 4);
/// ```
#[macro_export]
macro_rules! command {
    ($name:expr $(, $arg:expr)* $(,)?) => {
        $crate::Command::new($name)$(.arg($arg))*
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::TryStreamExt;

    #[test]
    fn test_command_builder() {
        let cmd = Command::new("SET").arg("key").arg(42).arg(b"raw");
        assert_eq!(cmd.name(), "SET");
        assert_eq!(cmd.len(), 4);
        assert!(matches!(cmd.arguments()[0], Argument::Text(ref s) if s == "key"));
        assert!(matches!(cmd.arguments()[1], Argument::Int(42)));
        assert!(matches!(cmd.arguments()[2], Argument::Bytes(ref b) if b == "raw"));
    }

    #[test]
    fn test_command_macro() {
        let cmd = command!("PING");
        assert_eq!(cmd.len(), 1);

        let cmd = command!("MSET", "a", 1u32, "b", 2.5,);
        assert_eq!(cmd.len(), 5);
        assert!(matches!(cmd.arguments()[1], Argument::UInt(1)));
        assert!(matches!(cmd.arguments()[3], Argument::Float(f) if f == 2.5));
    }

    #[test]
    fn test_args_extend() {
        let cmd = Command::new("DEL").args(["a", "b", "c"]);
        assert_eq!(cmd.len(), 4);
    }

    #[test]
    fn test_bytes_blob_chunks() {
        let blob = BytesBlob::new(&b"0123456789"[..]).with_chunk_size(4);
        assert_eq!(blob.size(), 10);

        let chunks: Vec<Bytes> = block_on(blob.stream().try_collect()).unwrap();
        assert_eq!(chunks, vec![&b"0123"[..], &b"4567"[..], &b"89"[..]]);

        // Each call yields a fresh stream.
        let again: Vec<Bytes> = block_on(blob.stream().try_collect()).unwrap();
        assert_eq!(again.len(), 3);
    }

    #[test]
    fn test_argument_debug() {
        let arg = Argument::blob(BytesBlob::new(vec![0u8; 3]));
        assert_eq!(format!("{:?}", arg), "Blob { size: 3 }");

        let arg = Argument::from(vec![0x68u16, 0x69]);
        assert_eq!(format!("{:?}", arg), "Wide(\"hi\")");
    }
}
