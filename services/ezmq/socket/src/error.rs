//! Endpoint error types.

use ezmq_wire::{TopicError, WireError};
use std::net::SocketAddr;
use thiserror::Error;

/// Result codes exposed to boundary callers
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Success
    Ok = 0,
    /// Any failure other than topic validation
    Error = 1,
    /// Topic failed validation
    InvalidTopic = 2,
}

/// Publisher, subscriber and context errors
#[derive(Error, Debug)]
pub enum EzmqError {
    /// Invalid argument (empty address, empty handler list, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Topic failed validation, or an empty topic list was given
    #[error("invalid topic: {0}")]
    InvalidTopic(#[from] TopicError),

    /// The context is not initialized
    #[error("context not initialized")]
    NotInitialized,

    /// Operation requires a started endpoint
    #[error("endpoint not started")]
    NotStarted,

    /// Endpoint was already started
    #[error("endpoint already started")]
    AlreadyStarted,

    /// Endpoint was already stopped
    #[error("endpoint already stopped")]
    AlreadyStopped,

    /// Publisher port is taken
    #[error("address in use: {0}")]
    AddressInUse(SocketAddr),

    /// Publisher socket could not be bound
    #[error("bind to {addr} failed: {source}")]
    BindFailure {
        /// Address we tried to bind
        addr: SocketAddr,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Frame could not be encoded or decoded
    #[error("wire error: {0}")]
    Decode(#[from] WireError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unclassified failure
    #[error("{0}")]
    Error(String),
}

impl EzmqError {
    /// Collapse into a boundary result code
    pub fn code(&self) -> ErrorCode {
        match self {
            EzmqError::InvalidTopic(_) => ErrorCode::InvalidTopic,
            _ => ErrorCode::Error,
        }
    }

    /// Error for an empty topic list
    pub(crate) fn empty_topic_list() -> Self {
        EzmqError::InvalidTopic(TopicError::Empty)
    }
}

/// Map a result to its boundary code
pub fn result_code<T>(result: &Result<T, EzmqError>) -> ErrorCode {
    match result {
        Ok(_) => ErrorCode::Ok,
        Err(e) => e.code(),
    }
}

/// Errors reported by a [`TopicRegistry`](crate::TopicRegistry)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The filter is already registered
    #[error("topic {0} already subscribed")]
    DuplicateTopic(String),

    /// The filter is not registered
    #[error("topic {0} not subscribed")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(result_code::<()>(&Ok(())), ErrorCode::Ok);
        assert_eq!(
            result_code::<()>(&Err(EzmqError::empty_topic_list())),
            ErrorCode::InvalidTopic
        );
        assert_eq!(result_code::<()>(&Err(EzmqError::NotStarted)), ErrorCode::Error);
        assert_eq!(
            EzmqError::Decode(WireError::Malformed).code(),
            ErrorCode::Error
        );
    }
}
