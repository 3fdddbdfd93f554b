//! Message envelopes.
//!
//! An [`Envelope`] is the unit handed to a publisher and delivered to a
//! subscriber callback. The variant decides the content type tag, so the tag
//! and the payload can never disagree.

use crate::event::Event;
use crate::header::ContentType;
use bytes::Bytes;
use prost::Message;

/// Immutable opaque payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ByteData(Bytes);

impl ByteData {
    /// Wrap the given bytes
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    /// Borrow the payload
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Cheap clone of the underlying buffer
    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }
}

impl From<Vec<u8>> for ByteData {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&'static [u8]> for ByteData {
    fn from(value: &'static [u8]) -> Self {
        Self(Bytes::from_static(value))
    }
}

/// Typed payload of one published message
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Structured device event
    Event(Event),
    /// Opaque bytes
    ByteData(ByteData),
}

impl Envelope {
    /// Content type tag matching the variant
    pub fn content_type(&self) -> ContentType {
        match self {
            Envelope::Event(_) => ContentType::Event,
            Envelope::ByteData(_) => ContentType::ByteData,
        }
    }

    /// Serialize the payload (without the content type tag)
    pub fn serialize(&self) -> Bytes {
        match self {
            Envelope::Event(event) => Bytes::from(event.encode_to_vec()),
            Envelope::ByteData(data) => data.to_bytes(),
        }
    }

    /// Rebuild an envelope from a payload and its content type tag
    pub fn deserialize(payload: Bytes, content_type: ContentType) -> Result<Self, crate::WireError> {
        match content_type {
            ContentType::Event => Ok(Envelope::Event(Event::decode(payload)?)),
            ContentType::ByteData => Ok(Envelope::ByteData(ByteData(payload))),
        }
    }

    /// The event, if this envelope carries one
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Envelope::Event(event) => Some(event),
            Envelope::ByteData(_) => None,
        }
    }

    /// The byte data, if this envelope carries it
    pub fn as_byte_data(&self) -> Option<&ByteData> {
        match self {
            Envelope::ByteData(data) => Some(data),
            Envelope::Event(_) => None,
        }
    }
}

impl From<Event> for Envelope {
    fn from(value: Event) -> Self {
        Envelope::Event(value)
    }
}

impl From<ByteData> for Envelope {
    fn from(value: ByteData) -> Self {
        Envelope::ByteData(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WireError;

    #[test]
    fn test_event_roundtrip() {
        let mut event = Event::new("id", "device");
        let reading = event.add_reading();
        reading.name = "reading1".into();
        reading.value = "25".into();

        let envelope = Envelope::from(event);
        let payload = envelope.serialize();
        let decoded = Envelope::deserialize(payload, envelope.content_type()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_byte_data_passes_through() {
        let data = ByteData::new(vec![0x40, 0x05, 0x10, 0x11, 0x12]);
        let envelope = Envelope::from(data.clone());
        assert_eq!(envelope.content_type(), ContentType::ByteData);

        let payload = envelope.serialize();
        assert_eq!(&payload[..], data.as_bytes());
        assert_eq!(
            Envelope::deserialize(payload, ContentType::ByteData).unwrap(),
            envelope
        );
    }

    #[test]
    fn test_tag_payload_mismatch() {
        // 0xFF is not a valid protobuf key
        let payload = Bytes::from_static(&[0xFF, 0xFF, 0xFF]);
        assert!(matches!(
            Envelope::deserialize(payload, ContentType::Event),
            Err(WireError::Decode(_))
        ));
    }
}
