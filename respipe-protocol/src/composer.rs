//! Coalesces encoded parts into as few transport writes as possible.

use crate::command::ByteStream;
use bytes::{Bytes, BytesMut};
use futures::future;
use futures::stream::{self, StreamExt};
use std::fmt;

/// One piece of encoded output.
pub enum Part {
    /// Bytes that are already materialized.
    Chunk(Bytes),
    /// Bytes that are produced on demand.
    Stream(ByteStream),
}

impl fmt::Debug for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Part::Chunk(b) => f.debug_tuple("Chunk").field(&b.len()).finish(),
            Part::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Result of [`FrameComposer::compose`]: one contiguous buffer or one stream.
pub enum Composed {
    Buffer(Bytes),
    Stream(ByteStream),
}

impl Composed {
    /// Returns the buffer, if the composed output is fully materialized.
    pub fn as_buffer(&self) -> Option<&Bytes> {
        match self {
            Composed::Buffer(b) => Some(b),
            Composed::Stream(_) => None,
        }
    }

    /// Converts the output into a stream, regardless of its representation.
    pub fn into_stream(self) -> ByteStream {
        match self {
            Composed::Buffer(b) => stream::once(future::ready(Ok(b))).boxed(),
            Composed::Stream(s) => s,
        }
    }
}

impl fmt::Debug for Composed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Composed::Buffer(b) => f.debug_tuple("Buffer").field(&b.len()).finish(),
            Composed::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Ordered list of parts, consumed exactly once by [`compose`](Self::compose).
#[derive(Debug, Default)]
pub struct FrameComposer {
    parts: Vec<Part>,
    streams: usize,
}

impl FrameComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a materialized chunk. Empty chunks are ignored.
    pub fn add_chunk(&mut self, chunk: Bytes) {
        if !chunk.is_empty() {
            self.parts.push(Part::Chunk(chunk));
        }
    }

    /// Appends a streamed part.
    pub fn add_stream(&mut self, stream: ByteStream) {
        self.streams += 1;
        self.parts.push(Part::Stream(stream));
    }

    pub fn add(&mut self, part: Part) {
        match part {
            Part::Chunk(chunk) => self.add_chunk(chunk),
            Part::Stream(stream) => self.add_stream(stream),
        }
    }

    /// Number of parts accumulated so far.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Total size of the materialized chunks.
    pub fn buffered_bytes(&self) -> usize {
        self.parts
            .iter()
            .map(|part| match part {
                Part::Chunk(b) => b.len(),
                Part::Stream(_) => 0,
            })
            .sum()
    }

    /// Drops every accumulated part.
    pub fn clear(&mut self) {
        self.parts.clear();
        self.streams = 0;
    }

    /// Drains the parts into a single output.
    ///
    /// - no parts: `None`
    /// - one part: that part, untouched
    /// - only chunks: one newly allocated buffer holding all of them
    /// - otherwise: one stream yielding every part in order, sub-streams
    ///   flattened in place
    pub fn compose(&mut self) -> Option<Composed> {
        let streams = std::mem::take(&mut self.streams);
        let mut parts = std::mem::take(&mut self.parts);

        match parts.len() {
            0 => None,
            1 => parts.pop().map(|part| match part {
                Part::Chunk(b) => Composed::Buffer(b),
                Part::Stream(s) => Composed::Stream(s),
            }),
            _ if streams == 0 => {
                let size = parts
                    .iter()
                    .map(|part| match part {
                        Part::Chunk(b) => b.len(),
                        Part::Stream(_) => 0,
                    })
                    .sum();
                let mut out = BytesMut::with_capacity(size);
                for part in parts {
                    if let Part::Chunk(b) = part {
                        out.extend_from_slice(&b);
                    }
                }
                Some(Composed::Buffer(out.freeze()))
            }
            _ => {
                let flat = stream::iter(parts)
                    .map(|part| match part {
                        Part::Chunk(b) => stream::once(future::ready(Ok(b))).boxed(),
                        Part::Stream(s) => s,
                    })
                    .flatten();
                Some(Composed::Stream(flat.boxed()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::TryStreamExt;
    use std::io;

    fn collect(composed: Composed) -> Vec<u8> {
        let chunks: Vec<Bytes> = block_on(composed.into_stream().try_collect()).unwrap();
        chunks.concat()
    }

    fn chunks(items: &[&'static [u8]]) -> ByteStream {
        let items: Vec<io::Result<Bytes>> =
            items.iter().map(|b| Ok(Bytes::from_static(*b))).collect();
        stream::iter(items).boxed()
    }

    #[test]
    fn test_compose_empty() {
        let mut composer = FrameComposer::new();
        assert!(composer.compose().is_none());

        composer.add_chunk(Bytes::new());
        assert!(composer.is_empty());
        assert!(composer.compose().is_none());
    }

    #[test]
    fn test_single_chunk_is_not_copied() {
        let chunk = Bytes::from_static(b"*1\r\n$4\r\nPING\r\n");
        let ptr = chunk.as_ptr();

        let mut composer = FrameComposer::new();
        composer.add_chunk(chunk);

        let composed = composer.compose().unwrap();
        let buffer = composed.as_buffer().unwrap();
        assert_eq!(buffer.as_ptr(), ptr);
        assert!(composer.is_empty());
    }

    #[test]
    fn test_single_stream_is_returned_as_is() {
        let mut composer = FrameComposer::new();
        composer.add_stream(chunks(&[b"ab", b"cd"]));

        let composed = composer.compose().unwrap();
        assert!(matches!(composed, Composed::Stream(_)));
        assert_eq!(collect(composed), b"abcd");
    }

    #[test]
    fn test_chunks_are_concatenated() {
        let mut composer = FrameComposer::new();
        composer.add_chunk(Bytes::from_static(b"hello "));
        composer.add_chunk(Bytes::from_static(b"wide "));
        composer.add_chunk(Bytes::from_static(b"world"));
        assert_eq!(composer.len(), 3);
        assert_eq!(composer.buffered_bytes(), 16);

        let composed = composer.compose().unwrap();
        assert_eq!(composed.as_buffer().unwrap(), &b"hello wide world"[..]);

        // Parts are consumed exactly once.
        assert!(composer.compose().is_none());
    }

    #[test]
    fn test_mixed_parts_are_flattened_in_order() {
        let mut composer = FrameComposer::new();
        composer.add_chunk(Bytes::from_static(b"<"));
        composer.add_stream(chunks(&[b"1", b"2"]));
        composer.add_chunk(Bytes::from_static(b"|"));
        composer.add_stream(chunks(&[b"3"]));
        composer.add_chunk(Bytes::from_static(b">"));

        let composed = composer.compose().unwrap();
        assert!(composed.as_buffer().is_none());
        assert_eq!(collect(composed), b"<12|3>");
    }

    #[test]
    fn test_stream_errors_pass_through() {
        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"ok")),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")),
        ])
        .boxed();

        let mut composer = FrameComposer::new();
        composer.add_chunk(Bytes::from_static(b"head"));
        composer.add_stream(failing);

        let result: io::Result<Vec<Bytes>> =
            block_on(composer.compose().unwrap().into_stream().try_collect());
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_clear() {
        let mut composer = FrameComposer::new();
        composer.add(Part::Chunk(Bytes::from_static(b"x")));
        composer.add(Part::Stream(chunks(&[b"y"])));
        composer.clear();
        assert!(composer.compose().is_none());
    }
}
