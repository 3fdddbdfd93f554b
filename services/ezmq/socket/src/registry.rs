//! Subscription filters.

use crate::error::RegistryError;
use ezmq_wire::Topic;
use std::collections::BTreeSet;

/// Topic filters held by a subscriber, globally or for one publisher.
///
/// A filter claims a frame when the filter is a prefix of the frame's
/// topic. Both sides end in `/`, so `home/` claims `home/kitchen/` but
/// not `homework/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicRegistry {
    unfiltered: bool,
    topics: BTreeSet<Topic>,
}

impl TopicRegistry {
    /// Empty registry; claims nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a topic filter
    pub fn add(&mut self, topic: Topic) -> Result<(), RegistryError> {
        if self.topics.contains(&topic) {
            return Err(RegistryError::DuplicateTopic(topic.to_string()));
        }
        self.topics.insert(topic);
        Ok(())
    }

    /// Remove a topic filter
    pub fn remove(&mut self, topic: &Topic) -> Result<(), RegistryError> {
        if self.topics.remove(topic) {
            Ok(())
        } else {
            Err(RegistryError::NotFound(topic.to_string()))
        }
    }

    /// Accept frames published without a topic
    pub fn set_unfiltered(&mut self) {
        self.unfiltered = true;
    }

    /// Stop accepting frames published without a topic
    pub fn clear_unfiltered(&mut self) {
        self.unfiltered = false;
    }

    /// Whether frames without a topic are accepted
    pub fn is_unfiltered(&self) -> bool {
        self.unfiltered
    }

    /// Whether some filter claims a frame published on `topic`
    pub fn claims(&self, topic: &Topic) -> bool {
        self.topics.iter().any(|filter| filter.is_prefix_of(topic))
    }

    /// Whether `topic` is registered as a filter
    pub fn contains(&self, topic: &Topic) -> bool {
        self.topics.contains(topic)
    }

    /// Registered filters in order
    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.topics.iter()
    }

    /// Number of registered filters
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Whether no topic filter is registered
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(raw: &str) -> Topic {
        Topic::new(raw).unwrap()
    }

    #[test]
    fn test_add_and_remove() {
        let mut registry = TopicRegistry::new();
        registry.add(topic("t1")).unwrap();
        assert_eq!(
            registry.add(topic("t1/")),
            Err(RegistryError::DuplicateTopic("t1/".into()))
        );
        assert_eq!(registry.len(), 1);

        registry.remove(&topic("t1")).unwrap();
        assert_eq!(
            registry.remove(&topic("t1")),
            Err(RegistryError::NotFound("t1/".into()))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_prefix_claims() {
        let mut registry = TopicRegistry::new();
        registry.add(topic("home")).unwrap();

        assert!(registry.claims(&topic("home")));
        assert!(registry.claims(&topic("home/kitchen")));
        assert!(!registry.claims(&topic("homework")));
        assert!(!registry.claims(&topic("office")));
    }

    #[test]
    fn test_unfiltered_flag_is_separate() {
        let mut registry = TopicRegistry::new();
        registry.set_unfiltered();
        assert!(registry.is_unfiltered());
        assert!(!registry.claims(&topic("anything")));

        registry.clear_unfiltered();
        assert!(!registry.is_unfiltered());
    }
}
