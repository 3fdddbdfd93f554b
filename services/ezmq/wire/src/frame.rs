//! Message framing for the wire protocol.
//!
//! One frame carries one published message: an optional topic segment, the
//! content type tag and the length-prefixed payload.

use crate::envelope::Envelope;
use crate::header::{ContentType, Flags, WIRE_VERSION};
use crate::topic::Topic;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

/// Maximum frame size (16 MiB default, 64 MiB hard limit)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
/// Hard maximum frame size limit (64 MiB)
pub const HARD_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Maximum topic length in bytes
pub const MAX_TOPIC_SIZE: usize = u16::MAX as usize;

/// Complete wire frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Topic the message was published on, `None` for the default channel
    pub topic: Option<Topic>,
    /// Payload content type
    pub content_type: ContentType,
    /// Serialized envelope
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame for `envelope`, optionally on a topic
    pub fn new(topic: Option<Topic>, envelope: &Envelope) -> Self {
        Self {
            topic,
            content_type: envelope.content_type(),
            payload: envelope.serialize(),
        }
    }

    /// Rebuild the envelope carried by this frame
    pub fn envelope(&self) -> Result<Envelope, crate::WireError> {
        Envelope::deserialize(self.payload.clone(), self.content_type)
    }

    fn flags(&self) -> Flags {
        if self.topic.is_some() {
            Flags::TOPIC
        } else {
            Flags::empty()
        }
    }

    /// Get the total frame size when encoded
    pub fn encoded_size(&self) -> usize {
        let mut size = 4; // frame_len u32
        size += 2; // version + flags

        if let Some(ref topic) = self.topic {
            size += 2 + topic.as_bytes().len();
        }

        size += 1; // content type
        size += 4; // payload_len u32
        size += self.payload.len();

        size
    }

    /// Encode frame to a contiguous buffer.
    ///
    /// `max_frame_size` is capped at [`HARD_MAX_FRAME_SIZE`], so the length
    /// prefix always fits in a `u32`.
    pub fn encode(&self, max_frame_size: usize) -> Result<Bytes, crate::WireError> {
        let total_size = self.encoded_size();
        if total_size > max_frame_size.min(HARD_MAX_FRAME_SIZE) {
            return Err(crate::WireError::Size(total_size));
        }

        let mut buf = BytesMut::with_capacity(total_size);

        // Frame length (everything after this u32)
        buf.put_u32((total_size - 4) as u32);

        buf.put_u8(WIRE_VERSION);
        buf.put_u8(self.flags().bits());

        if let Some(ref topic) = self.topic {
            let topic = topic.as_bytes();
            if topic.len() > MAX_TOPIC_SIZE {
                return Err(crate::WireError::Size(topic.len()));
            }
            buf.put_u16(topic.len() as u16);
            buf.put_slice(topic);
        }

        buf.put_u8(self.content_type as u8);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);

        Ok(buf.freeze())
    }
}

/// Frame decoder for parsing incoming frames
#[derive(Debug)]
pub struct FrameDecoder {
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Create a decoder with a custom size limit (capped at the hard limit)
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.min(HARD_MAX_FRAME_SIZE),
        }
    }

    /// Decode one frame from a buffer.
    ///
    /// Returns `Ok(None)` until a whole frame is buffered. Once the length
    /// prefix has been accepted the frame bytes are consumed even if the
    /// contents turn out to be invalid, so the next call starts at the next
    /// frame. Only [`WireError::Size`](crate::WireError::Size) leaves the
    /// stream unusable.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, crate::WireError> {
        // Need at least 4 bytes for frame length
        if buf.len() < 4 {
            return Ok(None);
        }

        // Peek at frame length
        let frame_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

        // Check frame size limits
        if frame_len > self.max_frame_size {
            return Err(crate::WireError::Size(frame_len));
        }

        // Check if we have the complete frame
        if buf.len() < 4 + frame_len {
            return Ok(None);
        }

        buf.advance(4);
        let frame_buf = buf.split_to(frame_len).freeze();
        trace!("Decoding frame of {} bytes, {} buffered", frame_len, buf.len());
        parse_frame(frame_buf).map(Some)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_frame(mut frame_buf: Bytes) -> Result<Frame, crate::WireError> {
    if frame_buf.len() < 2 {
        return Err(crate::WireError::Malformed);
    }

    let version = frame_buf.get_u8();
    if version != WIRE_VERSION {
        return Err(crate::WireError::Version(version));
    }

    let raw_flags = frame_buf.get_u8();
    let flags = Flags::from_bits(raw_flags).ok_or(crate::WireError::Flags(raw_flags))?;

    let topic = if flags.contains(Flags::TOPIC) {
        if frame_buf.len() < 2 {
            return Err(crate::WireError::Malformed);
        }
        let topic_len = frame_buf.get_u16() as usize;
        if frame_buf.len() < topic_len {
            return Err(crate::WireError::Malformed);
        }
        let raw = frame_buf.split_to(topic_len);
        let raw = std::str::from_utf8(&raw).map_err(|_| crate::WireError::Malformed)?;
        Some(Topic::new(raw)?)
    } else {
        None
    };

    if frame_buf.len() < 5 {
        return Err(crate::WireError::Malformed);
    }
    let content_type = ContentType::try_from(frame_buf.get_u8())?;

    let payload_len = frame_buf.get_u32() as usize;
    if frame_buf.len() != payload_len {
        return Err(crate::WireError::Malformed);
    }

    Ok(Frame {
        topic,
        content_type,
        payload: frame_buf,
    })
}
