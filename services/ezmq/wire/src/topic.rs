//! Topic names.
//!
//! A topic is a path-like string such as `home/livingroom/`. Only letters,
//! digits and `_ - . /` are accepted. The stored form always ends with `/`
//! so that prefix matching cannot confuse `topic1/` with `topic/`.

use crate::error::TopicError;
use std::fmt;

/// Validated, normalized topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    /// Validate `raw` and append a trailing `/` if it is missing
    pub fn new(raw: &str) -> Result<Self, TopicError> {
        if raw.is_empty() {
            return Err(TopicError::Empty);
        }

        if let Some(ch) = raw.chars().find(|c| !is_topic_char(*c)) {
            return Err(TopicError::InvalidChar {
                topic: raw.to_string(),
                ch,
            });
        }

        let mut topic = String::with_capacity(raw.len() + 1);
        topic.push_str(raw);
        if !topic.ends_with('/') {
            topic.push('/');
        }
        Ok(Self(topic))
    }

    /// Validate every entry of a list; the first failure aborts the whole list
    pub fn list<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Self>, TopicError> {
        raw.iter().map(|t| Self::new(t.as_ref())).collect()
    }

    /// Normalized topic, always ending in `/`
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Topic bytes as carried on the wire
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Whether a frame published on `other` falls under this filter
    pub fn is_prefix_of(&self, other: &Topic) -> bool {
        other.0.starts_with(&self.0)
    }
}

fn is_topic_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/')
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Topic {
    type Error = TopicError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_topics() {
        for raw in [
            "topic",
            "123",
            "1a2b3",
            "topic/",
            "topic/13/4jtjos/",
            "123a/1this3/4jtjos",
            "topic/122/livingroom/",
            "topic/122/livingroom/-",
            "topic/122/livingroom_",
            "topic/122.livingroom.",
        ] {
            let topic = Topic::new(raw).unwrap();
            assert!(topic.as_str().ends_with('/'), "{raw}");
            assert!(topic.as_str().starts_with(raw));

            // Re-validating the normalized form is a no-op
            assert_eq!(Topic::new(topic.as_str()).unwrap(), topic);
        }
    }

    #[test]
    fn test_invalid_topics() {
        assert_eq!(Topic::new(""), Err(TopicError::Empty));
        for raw in ["topic#", "@home", "living room", "a*b", "ü"] {
            assert!(
                matches!(Topic::new(raw), Err(TopicError::InvalidChar { .. })),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_prefix_match() {
        let filter = Topic::new("topic").unwrap();
        assert!(filter.is_prefix_of(&Topic::new("topic/").unwrap()));
        assert!(filter.is_prefix_of(&Topic::new("topic/kitchen").unwrap()));
        assert!(!filter.is_prefix_of(&Topic::new("topic1").unwrap()));
        assert!(!filter.is_prefix_of(&Topic::new("top").unwrap()));
    }

    #[test]
    fn test_list_rejects_whole_batch() {
        assert!(Topic::list(&["t1", "t2"]).is_ok());
        assert_eq!(Topic::list(&["t1", ""]), Err(TopicError::Empty));
    }
}
