use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::protocol::{PropValue, Refusal};

#[derive(Debug)]
pub struct Topic {
    props: BTreeMap<String, PropValue>,
}

/// Owns topic existence and the per-topic property map. Properties are opaque here:
///  whoever set them decides what they mean.
pub struct TopicRegistry {
    topics: FxHashMap<String, Topic>,
}

impl TopicRegistry {
    pub fn new() -> TopicRegistry {
        TopicRegistry {
            topics: Default::default(),
        }
    }

    pub fn create(&mut self, name: &str, initial_props: Vec<(String, PropValue)>) -> Result<(), Refusal> {
        if self.topics.contains_key(name) {
            return Err(Refusal::TopicExists);
        }

        self.topics.insert(name.to_string(), Topic {
            props: initial_props.into_iter().collect(),
        });
        Ok(())
    }

    /// Plain removal. The caller is responsible for refusing deletion while producer
    ///  or consumer records still reference the topic.
    pub fn delete(&mut self, name: &str) -> Result<(), Refusal> {
        self.topics.remove(name)
            .map(|_| ())
            .ok_or(Refusal::UnknownTopic)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.topics.contains_key(name)
    }

    pub fn get_prop(&self, name: &str, key: &str) -> Result<PropValue, Refusal> {
        let topic = self.topics.get(name).ok_or(Refusal::UnknownTopic)?;
        topic.props.get(key)
            .cloned()
            .ok_or(Refusal::PropNotFound)
    }

    pub fn set_prop(&mut self, name: &str, key: &str, value: PropValue) -> Result<(), Refusal> {
        let topic = self.topics.get_mut(name).ok_or(Refusal::UnknownTopic)?;
        topic.props.insert(key.to_string(), value);
        Ok(())
    }

    /// The full property map, ordered by key.
    pub fn snapshot(&self, name: &str) -> Result<Vec<(String, PropValue)>, Refusal> {
        let topic = self.topics.get(name).ok_or(Refusal::UnknownTopic)?;
        Ok(topic.props.iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn props(pairs: &[(&str, u64)]) -> Vec<(String, PropValue)> {
        pairs.iter()
            .map(|(k, v)| (k.to_string(), PropValue::Number(*v)))
            .collect()
    }

    #[test]
    fn test_create_and_duplicate() {
        let mut registry = TopicRegistry::new();

        registry.create("alpha", props(&[("channel_size", 256)])).unwrap();
        assert!(registry.exists("alpha"));
        assert_eq!(registry.create("alpha", vec![]), Err(Refusal::TopicExists));
    }

    #[test]
    fn test_delete() {
        let mut registry = TopicRegistry::new();
        registry.create("alpha", vec![]).unwrap();

        registry.delete("alpha").unwrap();
        assert!(!registry.exists("alpha"));
        assert_eq!(registry.delete("alpha"), Err(Refusal::UnknownTopic));
    }

    #[test]
    fn test_get_set_prop() {
        let mut registry = TopicRegistry::new();
        registry.create("alpha", props(&[("channel_size", 256)])).unwrap();

        assert_eq!(registry.get_prop("alpha", "channel_size"), Ok(PropValue::Number(256)));
        assert_eq!(registry.get_prop("alpha", "channel_period"), Err(Refusal::PropNotFound));
        assert_eq!(registry.get_prop("beta", "channel_size"), Err(Refusal::UnknownTopic));

        registry.set_prop("alpha", "channel_size", PropValue::Number(512)).unwrap();
        registry.set_prop("alpha", "owner", PropValue::Text("ecu-1".to_string())).unwrap();
        assert_eq!(registry.get_prop("alpha", "channel_size"), Ok(PropValue::Number(512)));

        assert_eq!(
            registry.set_prop("beta", "x", PropValue::Number(1)),
            Err(Refusal::UnknownTopic)
        );
    }

    #[test]
    fn test_snapshot_is_key_ordered() {
        let mut registry = TopicRegistry::new();
        registry.create("alpha", props(&[("z_last", 1), ("a_first", 2)])).unwrap();

        let snapshot = registry.snapshot("alpha").unwrap();
        assert_eq!(snapshot, vec![
            ("a_first".to_string(), PropValue::Number(2)),
            ("z_last".to_string(), PropValue::Number(1)),
        ]);
    }
}
