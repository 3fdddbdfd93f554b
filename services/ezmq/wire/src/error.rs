//! Wire protocol error types.

use thiserror::Error;

/// Topic validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    /// Topic string was empty
    #[error("topic is empty")]
    Empty,

    /// Topic contains a character outside `[A-Za-z0-9_.-/]`
    #[error("invalid character {ch:?} in topic {topic:?}")]
    InvalidChar {
        /// Offending topic as given
        topic: String,
        /// First rejected character
        ch: char,
    },
}

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Incomplete frame (need more data)
    #[error("incomplete frame")]
    Incomplete,

    /// Unsupported protocol version
    #[error("version unsupported: {0}")]
    Version(u8),

    /// Size limit exceeded
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// Reserved flag bits set
    #[error("unknown flags {0:#04x}")]
    Flags(u8),

    /// Malformed frame structure
    #[error("malformed frame")]
    Malformed,

    /// Topic segment failed validation
    #[error("invalid topic: {0}")]
    Topic(#[from] TopicError),

    /// Unknown content type tag
    #[error("unknown content type {0}")]
    ContentType(u8),

    /// Content type tag is reserved for future use
    #[error("reserved content type {0}")]
    Reserved(u8),

    /// Protobuf payload could not be decoded
    #[error("event decode failed: {0}")]
    Decode(#[from] prost::DecodeError),
}
