//! Decoded reply values.

use bytes::Bytes;
use std::fmt;

/// A decoded RESP2/RESP3 reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Simple string (`+`).
    Status(String),
    /// Simple or bulk error (`-`, `!`).
    Error(String),
    /// Integer (`:`).
    Integer(i64),
    /// Bulk string decoded as UTF-8 text.
    String(String),
    /// Bulk string kept as raw bytes.
    Bytes(Bytes),
    /// Null (`_`, `$-1`, `*-1`).
    Null,
    /// Double (`,`).
    Double(f64),
    /// Boolean (`#`).
    Boolean(bool),
    /// Big number (`(`), kept in its decimal form.
    BigNumber(String),
    /// Verbatim string (`=`) with its three letter format.
    Verbatim { format: String, text: String },
    /// Array (`*`), and maps or sets when those are flattened.
    Array(Vec<Reply>),
    /// Set (`~`).
    Set(Vec<Reply>),
    /// Map (`%`), in wire order.
    Map(Vec<(Reply, Reply)>),
    /// Out-of-band push message (`>`).
    Push(Vec<Reply>),
    /// Reply preceded by an attribute map (`|`).
    Attributed {
        attributes: Vec<(Reply, Reply)>,
        reply: Box<Reply>,
    },
}

impl Reply {
    /// True for server-initiated messages that answer no command.
    pub fn is_push(&self) -> bool {
        matches!(self, Reply::Push(_))
    }

    pub fn is_error(&self) -> bool {
        match self {
            Reply::Error(_) => true,
            Reply::Attributed { reply, .. } => reply.is_error(),
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Reply::Null)
    }

    /// First word of an error reply, e.g. `ERR` or `WRONGTYPE`.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Reply::Error(msg) => msg.split_whitespace().next(),
            Reply::Attributed { reply, .. } => reply.error_code(),
            _ => None,
        }
    }

    /// Text content of string-like replies.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Status(s) | Reply::String(s) | Reply::BigNumber(s) => Some(s),
            Reply::Verbatim { text, .. } => Some(text),
            Reply::Bytes(b) => std::str::from_utf8(b).ok(),
            Reply::Attributed { reply, .. } => reply.as_str(),
            _ => None,
        }
    }

    /// Raw content of string-like replies.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Status(s) | Reply::String(s) | Reply::BigNumber(s) => Some(s.as_bytes()),
            Reply::Verbatim { text, .. } => Some(text.as_bytes()),
            Reply::Bytes(b) => Some(b),
            Reply::Attributed { reply, .. } => reply.as_bytes(),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            Reply::Attributed { reply, .. } => reply.as_integer(),
            _ => None,
        }
    }

    /// Elements of an array, set or push message.
    pub fn into_items(self) -> Option<Vec<Reply>> {
        match self {
            Reply::Array(items) | Reply::Set(items) | Reply::Push(items) => Some(items),
            Reply::Attributed { reply, .. } => reply.into_items(),
            _ => None,
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{s}"),
            Reply::Error(s) => write!(f, "(error) {s}"),
            Reply::Integer(n) => write!(f, "(integer) {n}"),
            Reply::String(s) => write!(f, "\"{}\"", s.escape_debug()),
            Reply::Bytes(b) => write!(f, "\"{}\"", b.escape_ascii()),
            Reply::Null => write!(f, "(nil)"),
            Reply::Double(n) => write!(f, "(double) {n}"),
            Reply::Boolean(b) => write!(f, "({b})"),
            Reply::BigNumber(n) => write!(f, "(big number) {n}"),
            Reply::Verbatim { text, .. } => write!(f, "{text}"),
            Reply::Array(items) | Reply::Set(items) | Reply::Push(items) => {
                if items.is_empty() {
                    return write!(f, "(empty array)");
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, "\n{:indent$}", "")?;
                    }
                    let label = format!("{}) ", i + 1);
                    write!(f, "{label}")?;
                    item.fmt_indented(f, indent + label.len())?;
                }
                Ok(())
            }
            Reply::Map(pairs) => {
                if pairs.is_empty() {
                    return write!(f, "(empty hash)");
                }
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, "\n{:indent$}", "")?;
                    }
                    let label = format!("{}# ", i + 1);
                    write!(f, "{label}")?;
                    key.fmt_indented(f, indent + label.len())?;
                    write!(f, " => ")?;
                    value.fmt_indented(f, indent + label.len() + 4)?;
                }
                Ok(())
            }
            Reply::Attributed { reply, .. } => reply.fmt_indented(f, indent),
        }
    }
}

/// Renders the reply the way `redis-cli` does.
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
