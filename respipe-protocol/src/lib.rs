//! # respipe-protocol
//!
//! RESP request encoding and reply decoding for pipelined clients.
//!
//! This crate provides:
//! - Commands built from typed arguments, including sized blobs and streams
//! - A queue that renders batches of commands into as few writes as possible
//! - The frame composer that coalesces encoded parts
//! - An incremental RESP2/RESP3 reply decoder
//!
//! It does no I/O of its own; see `respipe-client` for the transport side.

pub mod byte_count;
pub mod codec;
pub mod command;
pub mod composer;
pub mod encoder;
pub mod error;
pub mod reply;

pub use byte_count::utf8_len;
pub use codec::{Decoder, DecoderConfig, DEFAULT_MAX_BULK_LEN, MAX_NESTING_DEPTH};
pub use command::{Argument, BlobProvider, ByteStream, BytesBlob, Command};
pub use composer::{Composed, FrameComposer, Part};
pub use encoder::{CommandEncoderQueue, DEFAULT_BATCH_LIMIT, INLINE_TEXT_LIMIT};
pub use error::ProtocolError;
pub use reply::Reply;

/// Default port of RESP servers.
pub const DEFAULT_PORT: u16 = 6379;
