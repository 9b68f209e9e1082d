use rustc_hash::FxHashMap;

use crate::protocol::net_addr::NetAddr;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EntityId(pub u64);

/// A live communication endpoint with its configured resource budget. Entities are
///  created lazily when the first flow binds to an address and dropped when the
///  last one unbinds.
#[derive(Debug, Clone)]
pub struct SockEntity {
    pub id: EntityId,
    pub addr: NetAddr,
    pub capacity: u32,
}

pub struct EntityTable {
    by_id: FxHashMap<EntityId, SockEntity>,
    by_addr: FxHashMap<NetAddr, EntityId>,
    next_id: u64,
}

impl EntityTable {
    pub fn new() -> EntityTable {
        EntityTable {
            by_id: Default::default(),
            by_addr: Default::default(),
            next_id: 1,
        }
    }

    /// The entity for `addr`, creating it with the given capacity if this is the
    ///  first binding against that address.
    pub fn resolve(&mut self, addr: &NetAddr, capacity: u32) -> EntityId {
        if let Some(id) = self.by_addr.get(addr) {
            return *id;
        }

        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.by_addr.insert(addr.clone(), id);
        self.by_id.insert(id, SockEntity {
            id,
            addr: addr.clone(),
            capacity,
        });
        id
    }

    pub fn get(&self, id: EntityId) -> Option<&SockEntity> {
        self.by_id.get(&id)
    }

    pub fn lookup_addr(&self, addr: &NetAddr) -> Option<EntityId> {
        self.by_addr.get(addr).copied()
    }

    pub fn remove(&mut self, id: EntityId) -> Option<SockEntity> {
        let entity = self.by_id.remove(&id)?;
        self.by_addr.remove(&entity.addr);
        Some(entity)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod test {
    use crate::test_util::test_udp_addr;

    use super::*;

    #[test]
    fn test_resolve_reuses_entities() {
        let mut table = EntityTable::new();

        let a = table.resolve(&test_udp_addr(1), 100);
        let b = table.resolve(&test_udp_addr(1), 999);
        let c = table.resolve(&test_udp_addr(2), 100);

        assert_eq!(a, b);
        assert_ne!(a, c);
        // the capacity of an existing entity is not renegotiated
        assert_eq!(table.get(a).unwrap().capacity, 100);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_remove() {
        let mut table = EntityTable::new();
        let a = table.resolve(&test_udp_addr(1), 100);

        let removed = table.remove(a).unwrap();
        assert_eq!(removed.addr, test_udp_addr(1));
        assert!(table.lookup_addr(&test_udp_addr(1)).is_none());
        assert!(table.remove(a).is_none());

        // a later bind against the same address gets a fresh entity
        let b = table.resolve(&test_udp_addr(1), 50);
        assert_ne!(a, b);
    }
}
