use rustc_hash::FxHashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::protocol::{NodeId, Refusal};
use crate::protocol::net_addr::NetAddr;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    Active,
    Expired,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub addr: NetAddr,
    pub last_heartbeat: Instant,
    pub session: SessionState,
}

/// Tracks registered nodes and their heartbeat deadlines. Eviction itself lives a
///  level up (it cascades through bindings and reservations); this registry only
///  answers which nodes are overdue.
pub struct NodeRegistry {
    nodes: FxHashMap<NodeId, NodeRecord>,
    by_addr: FxHashMap<NetAddr, NodeId>,
    id_pool: u32,
}

impl NodeRegistry {
    pub fn new(id_pool_start: u32) -> NodeRegistry {
        NodeRegistry {
            nodes: Default::default(),
            by_addr: Default::default(),
            id_pool: id_pool_start,
        }
    }

    /// Registers the node behind `addr`. A desired id of [NodeId::ASSIGN] asks for an
    ///  id from the pool; a concrete desired id is honored if free. Either way an
    ///  address can hold at most one session.
    pub fn register(&mut self, desired: NodeId, addr: NetAddr, now: Instant) -> Result<NodeId, Refusal> {
        if self.by_addr.contains_key(&addr) {
            return Err(Refusal::AlreadyRegistered);
        }

        let id = if desired == NodeId::ASSIGN {
            self.next_pooled_id()
        }
        else {
            if self.nodes.contains_key(&desired) {
                return Err(Refusal::AlreadyRegistered);
            }
            desired
        };

        self.by_addr.insert(addr.clone(), id);
        self.nodes.insert(id, NodeRecord {
            id,
            addr,
            last_heartbeat: now,
            session: SessionState::Active,
        });
        Ok(id)
    }

    fn next_pooled_id(&mut self) -> NodeId {
        loop {
            let candidate = NodeId(self.id_pool);
            self.id_pool = self.id_pool.wrapping_add(1);
            if !self.nodes.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    pub fn unregister(&mut self, id: NodeId) -> Result<NodeRecord, Refusal> {
        let record = self.nodes.remove(&id).ok_or(Refusal::UnknownNode)?;
        self.by_addr.remove(&record.addr);
        Ok(record)
    }

    pub fn heartbeat(&mut self, id: NodeId, now: Instant) -> Result<(), Refusal> {
        let record = self.nodes.get_mut(&id).ok_or(Refusal::UnknownNode)?;
        record.last_heartbeat = now;
        Ok(())
    }

    /// Node ids whose heartbeat deadline has passed. Pure query - callers evict.
    pub fn overdue(&self, now: Instant, timeout: Duration) -> Vec<NodeId> {
        self.nodes.values()
            .filter(|record| now.saturating_duration_since(record.last_heartbeat) >= timeout)
            .map(|record| record.id)
            .collect()
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(&id)
    }

    pub fn node_by_addr(&self, addr: &NetAddr) -> Option<NodeId> {
        self.by_addr.get(addr).copied()
    }

    pub fn addrs_except(&self, except: NodeId) -> Vec<NetAddr> {
        self.nodes.values()
            .filter(|record| record.id != except)
            .map(|record| record.addr.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
