//! Topics, Event/Reading records, envelope codec and transport framing for ezmq.
//!
//! This crate holds everything that goes over the wire between an ezmq
//! publisher and its subscribers. It performs no I/O.
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u32 frame_len        | length of bytes that follow|
//! +----------------------+----------------------------+
//! | u8 version           | WIRE_VERSION               |
//! +----------------------+----------------------------+
//! | u8 flags             | bit 0: topic present       |
//! +----------------------+----------------------------+
//! | u16 topic_len (opt)  | topic bytes (opt)          |
//! +----------------------+----------------------------+
//! | u8 content_type      | 0 = Event, 1 = ByteData    |
//! +----------------------+----------------------------+
//! | u32 payload_len      | payload                    |
//! +----------------------+----------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod envelope;
pub mod error;
pub mod event;
pub mod frame;
pub mod header;
pub mod topic;

// Re-export main types
pub use envelope::{ByteData, Envelope};
pub use error::{TopicError, WireError};
pub use event::{Event, Reading};
pub use frame::{Frame, FrameDecoder, DEFAULT_MAX_FRAME_SIZE, HARD_MAX_FRAME_SIZE, MAX_TOPIC_SIZE};
pub use header::{
    decode_greeting, encode_greeting, ContentType, Flags, GREETING_MAGIC, GREETING_SIZE,
    WIRE_VERSION,
};
pub use topic::Topic;
