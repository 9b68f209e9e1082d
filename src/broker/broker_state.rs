use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::broker::binding_registry::{BindingRegistry, FlowDirection, FlowOwner};
use crate::broker::broker_config::BrokerConfig;
use crate::broker::broker_events::{BrokerEvent, BrokerEventNotifier, NodePluggedData, NodeUnpluggedData, UnplugReason};
use crate::broker::entity_table::{EntityId, EntityTable};
use crate::broker::node_registry::{NodeRecord, NodeRegistry, SessionState};
use crate::broker::reservation_engine::ReservationEngine;
use crate::broker::topic_registry::TopicRegistry;
use crate::protocol::{Answer, BindingId, ConsumerId, Grant, NodeId, ProducerId, PropValue, Refusal, Request};
use crate::protocol::net_addr::NetAddr;

/// The shared registries behind one lock: node sessions, topics, flow records and
///  reservations, plus the socket entity table that ties flows to capacity budgets.
///
/// Every public method is one atomic step. In particular the teardown cascades
///  (node eviction, entity failure) run to completion under the single exclusive
///  borrow, so no caller ever observes a half-removed node. Teardown order is fixed:
///  reservations, then bindings, then producer / consumer records, then the node;
///  each step tolerates already-removed state so a replay is harmless.
pub struct BrokerState {
    config: Arc<BrokerConfig>,
    notifier: Arc<BrokerEventNotifier>,
    nodes: NodeRegistry,
    topics: TopicRegistry,
    bindings: BindingRegistry,
    entities: EntityTable,
    reservations: ReservationEngine,
}

impl BrokerState {
    pub fn new(config: Arc<BrokerConfig>, notifier: Arc<BrokerEventNotifier>) -> BrokerState {
        BrokerState {
            nodes: NodeRegistry::new(config.node_id_pool_start),
            topics: TopicRegistry::new(),
            bindings: BindingRegistry::new(),
            entities: EntityTable::new(),
            reservations: ReservationEngine::new(),
            config,
            notifier,
        }
    }

    /// Routes a request to its owning registry and folds the outcome into an answer.
    pub fn execute(&mut self, source: &NetAddr, request: Request, now: Instant) -> Answer {
        let op = request.op();
        let result = match request {
            Request::RegNode { desired } => self.reg_node(desired, source, now),
            Request::UnregNode { node } => self.unreg_node(node),
            Request::HeartSig { node } => self.heart_sig(node, now),
            Request::RegTopic { topic, props } => self.reg_topic(&topic, props),
            Request::DelTopic { topic } => self.del_topic(&topic),
            Request::GetTopicProp { topic, key } => self.topics.get_prop(&topic, &key).map(Grant::Property),
            Request::SetTopicProp { topic, key, value } => {
                self.topics.set_prop(&topic, &key, value).map(|_| Grant::None)
            }
            Request::RegProd { node, topic } => self.reg_prod(node, &topic),
            Request::UnregProd { producer } => self.unreg_prod(producer),
            Request::RegCons { node, topic } => self.reg_cons(node, &topic),
            Request::UnregCons { consumer } => self.unreg_cons(consumer),
            Request::BindTx { producer, addr } => self.bind_tx(producer, addr),
            Request::UnbindTx { binding } => self.unbind(binding, FlowDirection::Tx),
            Request::BindRx { consumer, addr } => self.bind_rx(consumer, addr),
            Request::UnbindRx { binding } => self.unbind(binding, FlowDirection::Rx),
            Request::TcReserv { binding, quantum } => self.tc_reserv(binding, quantum),
            Request::TcFree { binding } => self.reservations.free(binding).map(|_| Grant::None),
            Request::TcModify { binding, quantum } => self.tc_modify(binding, quantum),
        };

        match result {
            Ok(grant) => Answer::Accepted(grant),
            Err(refusal) => {
                debug!("refusing {:?} from {:?}: {:?} ({:?})", op, source, refusal, refusal.class());
                Answer::Refused(refusal)
            }
        }
    }

    fn reg_node(&mut self, desired: NodeId, addr: &NetAddr, now: Instant) -> Result<Grant, Refusal> {
        let id = self.nodes.register(desired, addr.clone(), now)?;
        info!("registered node {:?} at {:?}", id, addr);

        self.notifier.send_event(BrokerEvent::NodePlugged(NodePluggedData {
            node: id,
            addr: addr.clone(),
        }));
        Ok(Grant::Node(id))
    }

    fn unreg_node(&mut self, node: NodeId) -> Result<Grant, Refusal> {
        self.evict_node(node, UnplugReason::Unregistered)
            .map(|_| Grant::None)
            .ok_or(Refusal::UnknownNode)
    }

    fn heart_sig(&mut self, node: NodeId, now: Instant) -> Result<Grant, Refusal> {
        self.nodes.heartbeat(node, now)?;
        Ok(Grant::None)
    }

    fn reg_topic(&mut self, topic: &str, props: Vec<(String, PropValue)>) -> Result<Grant, Refusal> {
        self.topics.create(topic, props)?;
        info!("registered topic {:?}", topic);
        self.topics.snapshot(topic).map(Grant::Topic)
    }

    fn del_topic(&mut self, topic: &str) -> Result<Grant, Refusal> {
        if !self.topics.exists(topic) {
            return Err(Refusal::UnknownTopic);
        }
        if self.bindings.topic_in_use(topic) {
            return Err(Refusal::TopicInUse);
        }

        self.topics.delete(topic)?;
        info!("deleted topic {:?}", topic);
        Ok(Grant::None)
    }

    fn reg_prod(&mut self, node: NodeId, topic: &str) -> Result<Grant, Refusal> {
        if self.nodes.get(node).is_none() {
            return Err(Refusal::UnknownNode);
        }
        if !self.topics.exists(topic) {
            return Err(Refusal::UnknownTopic);
        }

        let id = self.bindings.register_producer(node, topic);
        let props = self.topics.snapshot(topic)?;
        Ok(Grant::Producer(id, props))
    }

    fn reg_cons(&mut self, node: NodeId, topic: &str) -> Result<Grant, Refusal> {
        if self.nodes.get(node).is_none() {
            return Err(Refusal::UnknownNode);
        }
        if !self.topics.exists(topic) {
            return Err(Refusal::UnknownTopic);
        }

        let id = self.bindings.register_consumer(node, topic);
        let props = self.topics.snapshot(topic)?;
        Ok(Grant::Consumer(id, props))
    }

    fn unreg_prod(&mut self, producer: ProducerId) -> Result<Grant, Refusal> {
        if self.bindings.producer(producer).is_none() {
            return Err(Refusal::UnknownProducer);
        }

        for binding in self.bindings.bindings_of(FlowOwner::Producer(producer)) {
            self.teardown_binding(binding);
        }
        self.bindings.unregister_producer(producer)?;
        Ok(Grant::None)
    }

    fn unreg_cons(&mut self, consumer: ConsumerId) -> Result<Grant, Refusal> {
        if self.bindings.consumer(consumer).is_none() {
            return Err(Refusal::UnknownConsumer);
        }

        for binding in self.bindings.bindings_of(FlowOwner::Consumer(consumer)) {
            self.teardown_binding(binding);
        }
        self.bindings.unregister_consumer(consumer)?;
        Ok(Grant::None)
    }

    fn bind_tx(&mut self, producer: ProducerId, addr: NetAddr) -> Result<Grant, Refusal> {
        let record = self.bindings.producer(producer).ok_or(Refusal::UnknownProducer)?;
        if self.nodes.get(record.node).is_none() {
            return Err(Refusal::UnknownProducer);
        }
        let topic = record.topic.clone();

        let entity = self.resolve_entity(&addr)?;
        let binding = self.bindings.bind(FlowOwner::Producer(producer), &topic, entity, FlowDirection::Tx);
        debug!("bound producer {:?} to {:?} as {:?}", producer, addr, binding);
        Ok(Grant::Binding(binding))
    }

    fn bind_rx(&mut self, consumer: ConsumerId, addr: NetAddr) -> Result<Grant, Refusal> {
        let record = self.bindings.consumer(consumer).ok_or(Refusal::UnknownConsumer)?;
        if self.nodes.get(record.node).is_none() {
            return Err(Refusal::UnknownConsumer);
        }
        let topic = record.topic.clone();

        let entity = self.resolve_entity(&addr)?;
        let binding = self.bindings.bind(FlowOwner::Consumer(consumer), &topic, entity, FlowDirection::Rx);
        debug!("bound consumer {:?} to {:?} as {:?}", consumer, addr, binding);
        Ok(Grant::Binding(binding))
    }

    fn resolve_entity(&mut self, addr: &NetAddr) -> Result<EntityId, Refusal> {
        let capacity = self.config.entity_capacity(addr).ok_or(Refusal::EntityUnavailable)?;
        Ok(self.entities.resolve(addr, capacity))
    }

    fn unbind(&mut self, binding: BindingId, direction: FlowDirection) -> Result<Grant, Refusal> {
        match self.bindings.binding(binding) {
            Some(b) if b.direction == direction => {}
            _ => return Err(Refusal::UnknownBinding),
        }

        self.teardown_binding(binding);
        Ok(Grant::None)
    }

    fn tc_reserv(&mut self, binding: BindingId, quantum: u32) -> Result<Grant, Refusal> {
        let (entity, capacity) = self.binding_budget(binding)?;
        let granted = self.reservations.reserve(binding, entity, capacity, quantum)?;
        debug!("reserved {} on {:?} for {:?}", granted, entity, binding);
        Ok(Grant::Reservation { granted })
    }

    fn tc_modify(&mut self, binding: BindingId, quantum: u32) -> Result<Grant, Refusal> {
        let (_, capacity) = self.binding_budget(binding)?;
        let granted = self.reservations.modify(binding, capacity, quantum)?;
        Ok(Grant::Reservation { granted })
    }

    fn binding_budget(&self, binding: BindingId) -> Result<(EntityId, u32), Refusal> {
        let flow = self.bindings.binding(binding).ok_or(Refusal::UnknownBinding)?;
        let entity = self.entities.get(flow.entity).ok_or(Refusal::UnknownBinding)?;
        Ok((entity.id, entity.capacity))
    }

    /// One-way disconnect notice: tears the node behind `source` down without an
    ///  answer. Returns the removed record for event fan-out.
    pub fn disconnect(&mut self, source: &NetAddr) -> Option<NodeRecord> {
        let node = self.nodes.node_by_addr(source)?;
        self.evict_node(node, UnplugReason::Disconnected)
    }

    /// Counterpart of [BrokerState::disconnect] for transport failures: removes the
    ///  node session registered at a now-unreachable address, if any.
    pub fn disconnect_failed(&mut self, addr: &NetAddr) -> Option<NodeRecord> {
        let node = self.nodes.node_by_addr(addr)?;
        self.evict_node(node, UnplugReason::TransportFailed)
    }

    /// Periodic heartbeat check: evicts every node whose deadline has passed and
    ///  returns their records for event fan-out.
    pub fn sweep(&mut self, now: Instant) -> Vec<NodeRecord> {
        let overdue = self.nodes.overdue(now, self.config.heartbeat_timeout);

        overdue.into_iter()
            .filter_map(|node| {
                warn!("node {:?} missed its heartbeat deadline - evicting", node);
                self.evict_node(node, UnplugReason::HeartbeatExpired)
            })
            .collect()
    }

    /// Removes a node and everything hanging off it, in fixed order: reservations
    ///  first, then bindings, then producer / consumer records, then the node itself.
    pub fn evict_node(&mut self, node: NodeId, reason: UnplugReason) -> Option<NodeRecord> {
        if self.nodes.get(node).is_none() {
            return None;
        }

        let (producers, consumers) = self.bindings.records_of_node(node);

        let mut flow_bindings = Vec::new();
        for p in &producers {
            flow_bindings.extend(self.bindings.bindings_of(FlowOwner::Producer(*p)));
        }
        for c in &consumers {
            flow_bindings.extend(self.bindings.bindings_of(FlowOwner::Consumer(*c)));
        }

        for binding in &flow_bindings {
            self.reservations.free_if_present(*binding);
        }
        for binding in flow_bindings {
            if let Some(flow) = self.bindings.unbind(binding) {
                self.gc_entity(flow.entity);
            }
        }
        for p in producers {
            let _ = self.bindings.unregister_producer(p);
        }
        for c in consumers {
            let _ = self.bindings.unregister_consumer(c);
        }

        let mut record = self.nodes.unregister(node).ok()?;
        if reason == UnplugReason::HeartbeatExpired {
            record.session = SessionState::Expired;
        }
        info!("removed node {:?} ({:?})", node, reason);

        self.notifier.send_event(BrokerEvent::NodeUnplugged(NodeUnpluggedData {
            node,
            reason,
        }));
        Some(record)
    }

    /// Frees the binding's reservation, removes the binding and drops its entity
    ///  when nothing else is attached. Safe to call for an already-removed binding.
    fn teardown_binding(&mut self, binding: BindingId) {
        self.reservations.free_if_present(binding);
        if let Some(flow) = self.bindings.unbind(binding) {
            self.gc_entity(flow.entity);
        }
    }

    fn gc_entity(&mut self, entity: EntityId) {
        if self.bindings.bindings_on_entity(entity).is_empty() {
            self.entities.remove(entity);
        }
    }

    /// Transport failure on an entity: every flow bound to it is torn down; other
    ///  entities are untouched. Returns the number of bindings removed.
    pub fn teardown_entity_addr(&mut self, addr: &NetAddr) -> usize {
        let Some(entity) = self.entities.lookup_addr(addr) else {
            return 0;
        };

        let flow_bindings = self.bindings.bindings_on_entity(entity);
        let count = flow_bindings.len();
        for binding in flow_bindings {
            self.teardown_binding(binding);
        }
        self.entities.remove(entity);
        count
    }

    /// Addresses of all registered nodes except the affected one, for EVE fan-out.
    pub fn peer_addrs(&self, except: NodeId) -> Vec<NetAddr> {
        self.nodes.addrs_except(except)
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }

    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    pub fn reservations(&self) -> &ReservationEngine {
        &self.reservations
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use tokio::time::Instant;

    use crate::test_util::{test_group_addr, test_udp_addr};

    use super::*;

    fn state() -> BrokerState {
        let mut config = BrokerConfig::new(test_udp_addr(0));
        config.default_entity_capacity = Some(100);
        BrokerState::new(Arc::new(config), Arc::new(BrokerEventNotifier::new()))
    }

    fn answer_grant(answer: Answer) -> Grant {
        match answer {
            Answer::Accepted(grant) => grant,
            Answer::Refused(refusal) => panic!("refused: {:?}", refusal),
        }
    }

    fn reg_node(state: &mut BrokerState, n: u16) -> NodeId {
        let answer = state.execute(&test_udp_addr(n), Request::RegNode { desired: NodeId::ASSIGN }, Instant::now());
        match answer_grant(answer) {
            Grant::Node(id) => id,
            other => panic!("unexpected grant {:?}", other),
        }
    }

    fn reg_topic(state: &mut BrokerState, name: &str) {
        let answer = state.execute(&test_udp_addr(1), Request::RegTopic {
            topic: name.to_string(),
            props: vec![("channel_size".to_string(), PropValue::Number(256))],
        }, Instant::now());
        answer_grant(answer);
    }

    fn reg_prod(state: &mut BrokerState, node: NodeId, topic: &str) -> ProducerId {
        let answer = state.execute(&test_udp_addr(1), Request::RegProd { node, topic: topic.to_string() }, Instant::now());
        match answer_grant(answer) {
            Grant::Producer(id, _) => id,
            other => panic!("unexpected grant {:?}", other),
        }
    }

    fn bind_tx(state: &mut BrokerState, producer: ProducerId, entity_addr: NetAddr) -> BindingId {
        let answer = state.execute(&test_udp_addr(1), Request::BindTx { producer, addr: entity_addr }, Instant::now());
        match answer_grant(answer) {
            Grant::Binding(id) => id,
            other => panic!("unexpected grant {:?}", other),
        }
    }

    fn reserve(state: &mut BrokerState, binding: BindingId, quantum: u32) -> Answer {
        state.execute(&test_udp_addr(1), Request::TcReserv { binding, quantum }, Instant::now())
    }

    #[tokio::test]
    async fn test_topic_delete_refused_while_records_exist() {
        let mut state = state();
        let node = reg_node(&mut state, 1);
        reg_topic(&mut state, "alpha");
        let producer = reg_prod(&mut state, node, "alpha");

        let answer = state.execute(&test_udp_addr(1), Request::DelTopic { topic: "alpha".to_string() }, Instant::now());
        assert_eq!(answer, Answer::Refused(Refusal::TopicInUse));

        answer_grant(state.execute(&test_udp_addr(1), Request::UnregProd { producer }, Instant::now()));
        answer_grant(state.execute(&test_udp_addr(1), Request::DelTopic { topic: "alpha".to_string() }, Instant::now()));
        assert!(state.topics().is_empty());
    }

    #[tokio::test]
    async fn test_unreg_node_cascades() {
        let mut state = state();
        let node = reg_node(&mut state, 1);
        reg_topic(&mut state, "alpha");
        let producer = reg_prod(&mut state, node, "alpha");
        let entity_addr = test_group_addr(1);
        let binding = bind_tx(&mut state, producer, entity_addr.clone());
        answer_grant(reserve(&mut state, binding, 60));

        answer_grant(state.execute(&test_udp_addr(1), Request::UnregNode { node }, Instant::now()));

        assert!(state.nodes().is_empty());
        assert_eq!(state.bindings().binding_count(), 0);
        assert_eq!(state.bindings().bindings_on_topic("alpha"), 0);
        assert!(state.reservations().is_empty());
        assert!(state.entities().is_empty());
        // the topic itself survives and is deletable now
        answer_grant(state.execute(&test_udp_addr(1), Request::DelTopic { topic: "alpha".to_string() }, Instant::now()));

        // freed capacity is available to an unrelated binding
        let other = reg_node(&mut state, 2);
        reg_topic(&mut state, "beta");
        let other_prod = reg_prod(&mut state, other, "beta");
        let other_binding = bind_tx(&mut state, other_prod, entity_addr);
        assert_eq!(answer_grant(reserve(&mut state, other_binding, 100)), Grant::Reservation { granted: 100 });
    }

    #[tokio::test]
    async fn test_bind_without_capacity_config_is_refused() {
        let mut config = BrokerConfig::new(test_udp_addr(0));
        config.default_entity_capacity = None;
        config.entity_capacities.insert(test_group_addr(1), 100);
        let mut state = BrokerState::new(Arc::new(config), Arc::new(BrokerEventNotifier::new()));

        let node = reg_node(&mut state, 1);
        reg_topic(&mut state, "alpha");
        let producer = reg_prod(&mut state, node, "alpha");

        bind_tx(&mut state, producer, test_group_addr(1));
        let answer = state.execute(&test_udp_addr(1), Request::BindTx { producer, addr: test_group_addr(2) }, Instant::now());
        assert_eq!(answer, Answer::Refused(Refusal::EntityUnavailable));
    }

    #[tokio::test]
    async fn test_unbind_direction_must_match() {
        let mut state = state();
        let node = reg_node(&mut state, 1);
        reg_topic(&mut state, "alpha");
        let producer = reg_prod(&mut state, node, "alpha");
        let binding = bind_tx(&mut state, producer, test_group_addr(1));

        let answer = state.execute(&test_udp_addr(1), Request::UnbindRx { binding }, Instant::now());
        assert_eq!(answer, Answer::Refused(Refusal::UnknownBinding));

        answer_grant(state.execute(&test_udp_addr(1), Request::UnbindTx { binding }, Instant::now()));
        assert_eq!(state.bindings().binding_count(), 0);
    }

    #[tokio::test]
    async fn test_reservation_follows_shared_entity() {
        let mut state = state();
        let node = reg_node(&mut state, 1);
        reg_topic(&mut state, "alpha");
        let producer = reg_prod(&mut state, node, "alpha");

        // two flows on the same entity share its budget
        let b1 = bind_tx(&mut state, producer, test_group_addr(1));
        let b2 = bind_tx(&mut state, producer, test_group_addr(1));

        assert_eq!(answer_grant(reserve(&mut state, b1, 60)), Grant::Reservation { granted: 60 });
        assert_eq!(reserve(&mut state, b2, 50), Answer::Refused(Refusal::InsufficientCapacity));
        assert_eq!(answer_grant(reserve(&mut state, b2, 40)), Grant::Reservation { granted: 40 });

        let answer = state.execute(&test_udp_addr(1), Request::TcModify { binding: b1, quantum: 70 }, Instant::now());
        assert_eq!(answer, Answer::Refused(Refusal::InsufficientCapacity));
        assert_eq!(state.reservations().reservation(b1).unwrap().granted, 60);
    }

    #[tokio::test]
    async fn test_disconnect_by_addr() {
        let mut state = state();
        let node = reg_node(&mut state, 1);

        assert!(state.disconnect(&test_udp_addr(9)).is_none());
        let record = state.disconnect(&test_udp_addr(1)).unwrap();
        assert_eq!(record.id, node);
        assert!(state.nodes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_and_frees() {
        let mut state = state();
        let node = reg_node(&mut state, 1);
        reg_topic(&mut state, "alpha");
        let producer = reg_prod(&mut state, node, "alpha");
        let binding = bind_tx(&mut state, producer, test_group_addr(1));
        answer_grant(reserve(&mut state, binding, 100));

        tokio::time::advance(std::time::Duration::from_millis(400)).await;
        assert!(state.sweep(Instant::now()).is_empty());

        // a heartbeat pushes the deadline out
        answer_grant(state.execute(&test_udp_addr(1), Request::HeartSig { node }, Instant::now()));
        tokio::time::advance(std::time::Duration::from_millis(400)).await;
        assert!(state.sweep(Instant::now()).is_empty());

        tokio::time::advance(std::time::Duration::from_millis(200)).await;
        let evicted = state.sweep(Instant::now());
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, node);
        assert_eq!(evicted[0].session, SessionState::Expired);

        assert!(state.nodes().is_empty());
        assert!(state.reservations().is_empty());
        assert_eq!(state.bindings().binding_count(), 0);

        // eviction is idempotent
        assert!(state.evict_node(node, UnplugReason::HeartbeatExpired).is_none());
    }

    #[tokio::test]
    async fn test_teardown_entity_leaves_others_alone() {
        let mut state = state();
        let node = reg_node(&mut state, 1);
        reg_topic(&mut state, "alpha");
        let producer = reg_prod(&mut state, node, "alpha");

        let b1 = bind_tx(&mut state, producer, test_group_addr(1));
        let b2 = bind_tx(&mut state, producer, test_group_addr(2));
        answer_grant(reserve(&mut state, b1, 10));
        answer_grant(reserve(&mut state, b2, 10));

        assert_eq!(state.teardown_entity_addr(&test_group_addr(1)), 1);
        assert_eq!(state.teardown_entity_addr(&test_group_addr(1)), 0);

        assert!(state.bindings().binding(b1).is_none());
        assert!(state.bindings().binding(b2).is_some());
        assert!(state.reservations().reservation(b2).is_some());
        assert_eq!(state.entities().len(), 1);
        // the producer record survives an entity failure
        assert!(state.bindings().producer(producer).is_some());
    }

    #[tokio::test]
    async fn test_duplicate_registration_answers() {
        let mut state = state();
        let node = reg_node(&mut state, 1);
        reg_topic(&mut state, "alpha");

        let p1 = reg_prod(&mut state, node, "alpha");
        let p2 = reg_prod(&mut state, node, "alpha");
        assert_eq!(p1, p2);

        let answer = state.execute(&test_udp_addr(1), Request::RegNode { desired: NodeId::ASSIGN }, Instant::now());
        assert_eq!(answer, Answer::Refused(Refusal::AlreadyRegistered));
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let notifier = Arc::new(BrokerEventNotifier::new());
        let mut config = BrokerConfig::new(test_udp_addr(0));
        config.default_entity_capacity = Some(100);
        let mut state = BrokerState::new(Arc::new(config), notifier.clone());
        let mut events = notifier.subscribe();

        let node = reg_node(&mut state, 1);
        answer_grant(state.execute(&test_udp_addr(1), Request::UnregNode { node }, Instant::now()));

        assert_eq!(events.try_recv().unwrap(), BrokerEvent::NodePlugged(NodePluggedData {
            node,
            addr: test_udp_addr(1),
        }));
        assert_eq!(events.try_recv().unwrap(), BrokerEvent::NodeUnplugged(NodeUnpluggedData {
            node,
            reason: UnplugReason::Unregistered,
        }));
    }
}
