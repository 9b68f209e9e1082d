use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::protocol::net_addr::NetAddr;

/// All tunables of a broker instance. No file loading here - callers build a value
///  (typically starting from [BrokerConfig::new]) and hand it in.
#[derive(Debug)]
pub struct BrokerConfig {
    pub self_addr: NetAddr,

    /// a node missing heartbeats for longer than this is evicted by the sweep
    pub heartbeat_timeout: Duration,
    pub sweep_interval: Duration,

    /// upper bound for handling a single request before it is answered with an
    ///  internal refusal instead of being silently dropped
    pub request_timeout: Duration,

    /// resource budget (kbit/s) per socket entity, keyed by address. Addresses not
    ///  listed here fall back to `default_entity_capacity`; with no fallback either,
    ///  binding to them is refused.
    pub entity_capacities: FxHashMap<NetAddr, u32>,
    pub default_entity_capacity: Option<u32>,

    /// first id handed out when a node asks the broker to assign one
    pub node_id_pool_start: u32,
}

impl BrokerConfig {
    pub fn new(self_addr: NetAddr) -> BrokerConfig {
        BrokerConfig {
            self_addr,
            heartbeat_timeout: Duration::from_millis(500),
            sweep_interval: Duration::from_millis(100),
            request_timeout: Duration::from_secs(1),
            entity_capacities: Default::default(),
            // 100 Mbit/s NIC minus control and background traffic share
            default_entity_capacity: Some(74 * 1024),
            node_id_pool_start: 10000,
        }
    }

    pub fn entity_capacity(&self, addr: &NetAddr) -> Option<u32> {
        self.entity_capacities.get(addr)
            .copied()
            .or(self.default_entity_capacity)
    }
}

#[cfg(test)]
mod test {
    use crate::test_util::test_udp_addr;

    use super::*;

    #[test]
    fn test_entity_capacity_lookup() {
        let mut config = BrokerConfig::new(test_udp_addr(0));
        config.entity_capacities.insert(test_udp_addr(1), 100);

        assert_eq!(config.entity_capacity(&test_udp_addr(1)), Some(100));
        assert_eq!(config.entity_capacity(&test_udp_addr(2)), config.default_entity_capacity);

        config.default_entity_capacity = None;
        assert_eq!(config.entity_capacity(&test_udp_addr(2)), None);
        assert_eq!(config.entity_capacity(&test_udp_addr(1)), Some(100));
    }
}
