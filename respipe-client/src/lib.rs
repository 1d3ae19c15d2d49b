//! # respipe-client
//!
//! Async pipelining client for RESP servers.
//!
//! This crate provides:
//! - A command processor with a single-flight write loop and ordered reads
//! - The `Client` facade: send, read, read many, lazy reply streams
//! - TCP connection bootstrap with optional TLS
//! - File and reader backed blob arguments

pub mod blob;
pub mod client;
pub mod connection;
pub mod error;
pub mod processor;
pub mod reader;
pub mod stream;
pub mod tls;

pub use blob::{reader_stream, FileBlob};
pub use client::Client;
pub use connection::{connect, ConnectionConfig, TcpClient};
pub use error::ClientError;
pub use processor::{CommandProcessor, PipelineConfig, ProcessHandle};
pub use reader::ReplyReader;
pub use stream::ClientStream;
pub use tls::TlsClientConfig;

pub use respipe_protocol::{command, Argument, Command, DecoderConfig, Reply};
