use rustc_hash::FxHashMap;

use crate::broker::entity_table::EntityId;
use crate::protocol::{BindingId, ConsumerId, NodeId, ProducerId, Refusal};

#[derive(Debug, Clone, PartialEq)]
pub struct ProducerRecord {
    pub id: ProducerId,
    pub node: NodeId,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerRecord {
    pub id: ConsumerId,
    pub node: NodeId,
    pub topic: String,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FlowOwner {
    Producer(ProducerId),
    Consumer(ConsumerId),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FlowDirection {
    Tx,
    Rx,
}

/// A concrete flow: a producer or consumer attached to a socket entity.
#[derive(Debug, Clone)]
pub struct FlowBinding {
    pub id: BindingId,
    pub owner: FlowOwner,
    pub topic: String,
    pub entity: EntityId,
    pub direction: FlowDirection,
}

/// Producer / consumer records per topic plus the live Tx/Rx bindings hanging off
///  them. Referential checks across nodes and entities stay with the caller - this
///  registry only knows its own ids.
pub struct BindingRegistry {
    producers: FxHashMap<ProducerId, ProducerRecord>,
    consumers: FxHashMap<ConsumerId, ConsumerRecord>,
    bindings: FxHashMap<BindingId, FlowBinding>,
    next_producer: u32,
    next_consumer: u32,
    next_binding: u64,
}

impl BindingRegistry {
    pub fn new() -> BindingRegistry {
        BindingRegistry {
            producers: Default::default(),
            consumers: Default::default(),
            bindings: Default::default(),
            next_producer: 1,
            next_consumer: 1,
            next_binding: 1,
        }
    }

    /// Registers `node` as producer of `topic`. Re-registering an existing pair is
    ///  answered with the already-assigned id.
    pub fn register_producer(&mut self, node: NodeId, topic: &str) -> ProducerId {
        if let Some(existing) = self.producers.values().find(|p| p.node == node && p.topic == topic) {
            return existing.id;
        }

        let id = ProducerId(self.next_producer);
        self.next_producer += 1;
        self.producers.insert(id, ProducerRecord {
            id,
            node,
            topic: topic.to_string(),
        });
        id
    }

    pub fn register_consumer(&mut self, node: NodeId, topic: &str) -> ConsumerId {
        if let Some(existing) = self.consumers.values().find(|c| c.node == node && c.topic == topic) {
            return existing.id;
        }

        let id = ConsumerId(self.next_consumer);
        self.next_consumer += 1;
        self.consumers.insert(id, ConsumerRecord {
            id,
            node,
            topic: topic.to_string(),
        });
        id
    }

    /// Callers must tear down the record's bindings first.
    pub fn unregister_producer(&mut self, id: ProducerId) -> Result<ProducerRecord, Refusal> {
        self.producers.remove(&id).ok_or(Refusal::UnknownProducer)
    }

    pub fn unregister_consumer(&mut self, id: ConsumerId) -> Result<ConsumerRecord, Refusal> {
        self.consumers.remove(&id).ok_or(Refusal::UnknownConsumer)
    }

    pub fn producer(&self, id: ProducerId) -> Option<&ProducerRecord> {
        self.producers.get(&id)
    }

    pub fn consumer(&self, id: ConsumerId) -> Option<&ConsumerRecord> {
        self.consumers.get(&id)
    }

    pub fn bind(&mut self, owner: FlowOwner, topic: &str, entity: EntityId, direction: FlowDirection) -> BindingId {
        let id = BindingId(self.next_binding);
        self.next_binding += 1;
        self.bindings.insert(id, FlowBinding {
            id,
            owner,
            topic: topic.to_string(),
            entity,
            direction,
        });
        id
    }

    pub fn binding(&self, id: BindingId) -> Option<&FlowBinding> {
        self.bindings.get(&id)
    }

    pub fn unbind(&mut self, id: BindingId) -> Option<FlowBinding> {
        self.bindings.remove(&id)
    }

    pub fn bindings_of(&self, owner: FlowOwner) -> Vec<BindingId> {
        self.bindings.values()
            .filter(|b| b.owner == owner)
            .map(|b| b.id)
            .collect()
    }

    pub fn bindings_on_entity(&self, entity: EntityId) -> Vec<BindingId> {
        self.bindings.values()
            .filter(|b| b.entity == entity)
            .map(|b| b.id)
            .collect()
    }

    /// All producer and consumer records belonging to `node`.
    pub fn records_of_node(&self, node: NodeId) -> (Vec<ProducerId>, Vec<ConsumerId>) {
        let producers = self.producers.values()
            .filter(|p| p.node == node)
            .map(|p| p.id)
            .collect();
        let consumers = self.consumers.values()
            .filter(|c| c.node == node)
            .map(|c| c.id)
            .collect();
        (producers, consumers)
    }

    /// True while any producer or consumer record references the topic, bound or not.
    pub fn topic_in_use(&self, topic: &str) -> bool {
        self.producers.values().any(|p| p.topic == topic)
            || self.consumers.values().any(|c| c.topic == topic)
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn bindings_on_topic(&self, topic: &str) -> usize {
        self.bindings.values()
            .filter(|b| b.topic == topic)
            .count()
    }
}

#[cfg(test)]
mod test {
    use crate::broker::entity_table::EntityId;

    use super::*;

    #[test]
    fn test_register_producer_is_idempotent() {
        let mut registry = BindingRegistry::new();

        let a = registry.register_producer(NodeId(1), "alpha");
        let again = registry.register_producer(NodeId(1), "alpha");
        let other_topic = registry.register_producer(NodeId(1), "beta");
        let other_node = registry.register_producer(NodeId(2), "alpha");

        assert_eq!(a, again);
        assert_ne!(a, other_topic);
        assert_ne!(a, other_node);
    }

    #[test]
    fn test_unregister_unknown() {
        let mut registry = BindingRegistry::new();
        assert_eq!(registry.unregister_producer(ProducerId(9)), Err(Refusal::UnknownProducer));
        assert_eq!(registry.unregister_consumer(ConsumerId(9)), Err(Refusal::UnknownConsumer));
    }

    #[test]
    fn test_bind_and_queries() {
        let mut registry = BindingRegistry::new();
        let p = registry.register_producer(NodeId(1), "alpha");
        let c = registry.register_consumer(NodeId(2), "alpha");

        let e1 = EntityId(1);
        let e2 = EntityId(2);
        let b1 = registry.bind(FlowOwner::Producer(p), "alpha", e1, FlowDirection::Tx);
        let b2 = registry.bind(FlowOwner::Producer(p), "alpha", e2, FlowDirection::Tx);
        let b3 = registry.bind(FlowOwner::Consumer(c), "alpha", e1, FlowDirection::Rx);

        let mut of_p = registry.bindings_of(FlowOwner::Producer(p));
        of_p.sort();
        assert_eq!(of_p, vec![b1, b2]);

        let mut on_e1 = registry.bindings_on_entity(e1);
        on_e1.sort();
        assert_eq!(on_e1, vec![b1, b3]);

        assert_eq!(registry.bindings_on_topic("alpha"), 3);
        assert_eq!(registry.binding_count(), 3);

        registry.unbind(b1).unwrap();
        assert!(registry.unbind(b1).is_none());
        assert_eq!(registry.binding_count(), 2);
    }

    #[test]
    fn test_topic_in_use_follows_records_not_bindings() {
        let mut registry = BindingRegistry::new();
        assert!(!registry.topic_in_use("alpha"));

        let p = registry.register_producer(NodeId(1), "alpha");
        assert!(registry.topic_in_use("alpha"));

        // no bindings were ever created, the record alone pins the topic
        registry.unregister_producer(p).unwrap();
        assert!(!registry.topic_in_use("alpha"));
    }

    #[test]
    fn test_records_of_node() {
        let mut registry = BindingRegistry::new();
        let p1 = registry.register_producer(NodeId(1), "alpha");
        let p2 = registry.register_producer(NodeId(1), "beta");
        let c1 = registry.register_consumer(NodeId(1), "gamma");
        registry.register_producer(NodeId(2), "alpha");

        let (mut producers, consumers) = registry.records_of_node(NodeId(1));
        producers.sort();
        assert_eq!(producers, vec![p1, p2]);
        assert_eq!(consumers, vec![c1]);
    }
}
