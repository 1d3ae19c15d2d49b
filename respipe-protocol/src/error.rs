//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding replies.
///
/// Encoding never fails: every [`Argument`](crate::Argument) variant has a
/// wire representation.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid type prefix: {0:#04x}")]
    InvalidPrefix(u8),

    #[error("invalid length: {0:?}")]
    InvalidLength(String),

    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    #[error("invalid double: {0:?}")]
    InvalidDouble(String),

    #[error("invalid boolean: {0:?}")]
    InvalidBoolean(String),

    #[error("invalid verbatim string header")]
    InvalidVerbatim,

    #[error("missing CRLF terminator")]
    MissingCrlf,

    #[error("invalid UTF-8 in reply line")]
    InvalidUtf8,

    #[error("bulk too large: {size} bytes (max {max})")]
    BulkTooLarge { size: u64, max: u64 },

    #[error("nesting too deep (max {0})")]
    NestingTooDeep(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::InvalidPrefix(b'x');
        assert_eq!(err.to_string(), "invalid type prefix: 0x78");

        let err = ProtocolError::InvalidLength("-7".to_string());
        assert!(err.to_string().contains("-7"));

        let err = ProtocolError::BulkTooLarge { size: 100, max: 50 };
        let msg = err.to_string();
        assert!(msg.contains("100") && msg.contains("50"));

        let err = ProtocolError::NestingTooDeep(64);
        assert!(err.to_string().contains("64"));

        let err = ProtocolError::InvalidUtf8;
        assert!(err.to_string().contains("UTF-8"));
    }
}
