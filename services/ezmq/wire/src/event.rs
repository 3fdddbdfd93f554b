//! Structured Event/Reading records.
//!
//! Both messages are Protocol Buffers encoded with fixed field tags, so
//! readers skip fields they do not know and older peers keep working when a
//! field is added.

use serde::{Deserialize, Serialize};

/// A single sensor reading carried inside an [`Event`]
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct Reading {
    /// Reading ID
    #[prost(string, tag = "1")]
    pub id: String,
    /// Creation timestamp
    #[prost(int64, tag = "2")]
    pub created: i64,
    /// Modification timestamp
    #[prost(int64, tag = "3")]
    pub modified: i64,
    /// Origin timestamp
    #[prost(int64, tag = "4")]
    pub origin: i64,
    /// Push timestamp
    #[prost(int64, tag = "5")]
    pub pushed: i64,
    /// Reading name, e.g. `temperature`
    #[prost(string, tag = "6")]
    pub name: String,
    /// Reading value as text
    #[prost(string, tag = "7")]
    pub value: String,
    /// Device that produced the reading
    #[prost(string, tag = "8")]
    pub device: String,
}

/// Device event holding an ordered list of readings
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct Event {
    /// Event ID
    #[prost(string, tag = "1")]
    pub id: String,
    /// Creation timestamp
    #[prost(int64, tag = "2")]
    pub created: i64,
    /// Modification timestamp
    #[prost(int64, tag = "3")]
    pub modified: i64,
    /// Origin timestamp
    #[prost(int64, tag = "4")]
    pub origin: i64,
    /// Push timestamp
    #[prost(int64, tag = "5")]
    pub pushed: i64,
    /// Source device
    #[prost(string, tag = "6")]
    pub device: String,
    /// Readings in insertion order
    #[prost(message, repeated, tag = "7")]
    pub reading: Vec<Reading>,
}

impl Event {
    /// Create an event with the given ID and device and no readings
    pub fn new(id: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            device: device.into(),
            ..Default::default()
        }
    }

    /// Append an empty reading and return it for filling in
    pub fn add_reading(&mut self) -> &mut Reading {
        self.reading.push(Reading::default());
        let last = self.reading.len() - 1;
        &mut self.reading[last]
    }

    /// Readings in insertion order
    pub fn readings(&self) -> &[Reading] {
        &self.reading
    }

    /// Reading at `index`, if present
    pub fn get_reading(&self, index: usize) -> Option<&Reading> {
        self.reading.get(index)
    }

    /// Number of readings
    pub fn reading_count(&self) -> usize {
        self.reading.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    fn sample_event() -> Event {
        let mut event = Event::new("id", "device");
        event.created = 10;
        event.modified = 20;
        event.origin = 20;
        event.pushed = 10;

        let reading = event.add_reading();
        reading.id = "id1".into();
        reading.created = 25;
        reading.name = "reading1".into();
        reading.value = "25".into();
        reading.device = "device".into();

        let reading = event.add_reading();
        reading.id = "id2".into();
        reading.created = 30;
        reading.name = "reading2".into();
        reading.value = "20".into();
        reading.device = "device".into();

        event
    }

    #[test]
    fn test_add_reading_keeps_order() {
        let event = sample_event();
        assert_eq!(event.reading_count(), 2);
        assert_eq!(event.get_reading(0).unwrap().name, "reading1");
        assert_eq!(event.get_reading(1).unwrap().value, "20");
        assert!(event.get_reading(2).is_none());
    }

    #[test]
    fn test_protobuf_roundtrip() {
        for readings in 0..4 {
            let mut event = Event::new("id", "device");
            for i in 0..readings {
                let reading = event.add_reading();
                reading.name = format!("reading{i}");
                reading.value = i.to_string();
                reading.pushed = i as i64;
            }
            let bytes = event.encode_to_vec();
            assert_eq!(Event::decode(bytes.as_slice()).unwrap(), event);
        }
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let mut bytes = sample_event().encode_to_vec();
        // Field 15, wire type 0 (varint), value 1
        bytes.extend_from_slice(&[0x78, 0x01]);
        assert_eq!(Event::decode(bytes.as_slice()).unwrap(), sample_event());
    }

    #[test]
    fn test_json_view() {
        let json = serde_json::to_value(sample_event()).unwrap();
        assert_eq!(json["reading"][0]["name"], "reading1");
        assert_eq!(json["device"], "device");
    }
}
