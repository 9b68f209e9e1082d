use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashSet;
use tokio::sync::RwLock;

use crate::protocol::NetMsg;
use crate::protocol::net_addr::NetAddr;
use crate::transport::MsgSender;

/// A UDP address on a per-test port range, derived from a small number.
pub fn test_udp_addr(n: u16) -> NetAddr {
    let addr = SocketAddr::from_str(&format!("127.0.0.1:{}", 17000 + n))
        .expect("hard-coded test address");
    NetAddr::Udp(addr)
}

/// A multicast group address, the typical target of flow bindings.
pub fn test_group_addr(n: u16) -> NetAddr {
    let addr = SocketAddr::from_str(&format!("239.10.0.{}:{}", n, 20000 + n))
        .expect("hard-coded test address");
    NetAddr::UdpGroup(addr)
}

/// Records outbound messages instead of sending them, and can simulate unreachable
///  addresses.
#[derive(Debug)]
pub struct TrackingMockSender {
    myself: NetAddr,
    sent: Arc<RwLock<Vec<(NetAddr, NetMsg)>>>,
    failing: Arc<RwLock<FxHashSet<NetAddr>>>,
}

impl TrackingMockSender {
    pub fn new(myself: NetAddr) -> TrackingMockSender {
        TrackingMockSender {
            myself,
            sent: Default::default(),
            failing: Default::default(),
        }
    }

    /// All messages recorded so far, in send order; clears the record.
    pub async fn take_sent(&self) -> Vec<(NetAddr, NetMsg)> {
        self.sent.write().await.drain(..).collect()
    }

    pub async fn assert_no_remaining_messages(&self) {
        assert!(
            self.sent.read().await
                .is_empty()
        );
    }

    /// Every later send to `addr` fails, as if the peer had vanished.
    pub async fn fail_sends_to(&self, addr: NetAddr) {
        self.failing.write().await.insert(addr);
    }
}

#[async_trait]
impl MsgSender for TrackingMockSender {
    fn self_addr(&self) -> NetAddr {
        self.myself.clone()
    }

    async fn try_send(&self, to: &NetAddr, msg: &NetMsg) -> anyhow::Result<()> {
        if self.failing.read().await.contains(to) {
            return Err(anyhow::anyhow!("simulated transport failure to {:?}", to));
        }
        self.sent.write().await.push((to.clone(), msg.clone()));
        Ok(())
    }
}
