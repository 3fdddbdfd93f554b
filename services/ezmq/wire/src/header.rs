//! Fixed header fields of the transport frame.
//!
//! Every frame starts with a version byte and a flags byte; the content type
//! tag follows the optional topic segment.

use bitflags::bitflags;
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Wire protocol version
pub const WIRE_VERSION: u8 = 1;

/// Magic bytes that open the greeting sent by a publisher on accept
pub const GREETING_MAGIC: &[u8; 4] = b"EZMQ";

/// Greeting size in bytes (magic + version)
pub const GREETING_SIZE: usize = GREETING_MAGIC.len() + 1;

/// Payload content types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    /// Protobuf encoded [`Event`](crate::Event)
    Event = 0,
    /// Opaque [`ByteData`](crate::ByteData)
    ByteData = 1,
}

impl TryFrom<u8> for ContentType {
    type Error = crate::WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ContentType::Event),
            1 => Ok(ContentType::ByteData),
            2 | 3 => Err(crate::WireError::Reserved(value)),
            _ => Err(crate::WireError::ContentType(value)),
        }
    }
}

bitflags! {
    /// Frame flags bitmask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Flags: u8 {
        /// A topic segment follows the flags byte
        const TOPIC = 1 << 0;
    }
}

/// Build the greeting a publisher writes on every accepted connection
pub fn encode_greeting<B: BufMut>(buf: &mut B) {
    buf.put_slice(GREETING_MAGIC);
    buf.put_u8(WIRE_VERSION);
}

/// Check a received greeting and return the peer's wire version
pub fn decode_greeting<B: Buf>(buf: &mut B) -> Result<u8, crate::WireError> {
    if buf.remaining() < GREETING_SIZE {
        return Err(crate::WireError::Incomplete);
    }

    let mut magic = [0u8; 4];
    buf.copy_to_slice(&mut magic);
    if &magic != GREETING_MAGIC {
        return Err(crate::WireError::Malformed);
    }

    let version = buf.get_u8();
    if version != WIRE_VERSION {
        return Err(crate::WireError::Version(version));
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WireError;
    use bytes::BytesMut;

    #[test]
    fn test_content_type_tags() {
        assert_eq!(ContentType::try_from(0).unwrap(), ContentType::Event);
        assert_eq!(ContentType::try_from(1).unwrap(), ContentType::ByteData);
        assert!(matches!(ContentType::try_from(2), Err(WireError::Reserved(2))));
        assert!(matches!(ContentType::try_from(3), Err(WireError::Reserved(3))));
        assert!(matches!(
            ContentType::try_from(9),
            Err(WireError::ContentType(9))
        ));
    }

    #[test]
    fn test_greeting() {
        let mut buf = BytesMut::new();
        encode_greeting(&mut buf);
        assert_eq!(buf.len(), GREETING_SIZE);
        assert_eq!(decode_greeting(&mut buf.freeze()).unwrap(), WIRE_VERSION);

        let mut bad = &b"ZMTP\x01"[..];
        assert!(matches!(decode_greeting(&mut bad), Err(WireError::Malformed)));

        let mut future = &b"EZMQ\x07"[..];
        assert!(matches!(decode_greeting(&mut future), Err(WireError::Version(7))));
    }
}
