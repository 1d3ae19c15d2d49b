//! Client error types.

use respipe_protocol::ProtocolError;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The write loop failed. Every caller coalesced on that write observes
    /// the same error.
    #[error("write failed: {0}")]
    Write(Arc<io::Error>),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("connect timeout")]
    Timeout,

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),
}

impl ClientError {
    /// Returns whether reconnecting and resending may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Write(_)
                | ClientError::Timeout
                | ClientError::ConnectionClosed
        )
    }

    /// Kind of the underlying I/O error, if any.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            ClientError::Io(e) => Some(e.kind()),
            ClientError::Write(e) => Some(e.kind()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::ConnectionClosed.is_retryable());
        assert!(ClientError::Write(Arc::new(io::ErrorKind::BrokenPipe.into())).is_retryable());
        assert!(!ClientError::Protocol(ProtocolError::MissingCrlf).is_retryable());
        assert!(!ClientError::TlsConfig("bad".into()).is_retryable());
    }

    #[test]
    fn test_io_kind() {
        let err = ClientError::Write(Arc::new(io::Error::new(io::ErrorKind::InvalidData, "x")));
        assert_eq!(err.io_kind(), Some(io::ErrorKind::InvalidData));
        assert_eq!(ClientError::Timeout.io_kind(), None);
    }
}
