use tokio::sync::broadcast;
use tracing::trace;

use crate::protocol::NodeId;
use crate::protocol::net_addr::NetAddr;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BrokerEvent {
    NodePlugged(NodePluggedData),
    NodeUnplugged(NodeUnpluggedData),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodePluggedData {
    pub node: NodeId,
    pub addr: NetAddr,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeUnpluggedData {
    pub node: NodeId,
    pub reason: UnplugReason,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnplugReason {
    /// explicit UNREG_NODE request
    Unregistered,
    /// one-way DIS notice from the node
    Disconnected,
    /// evicted by the heartbeat sweep
    HeartbeatExpired,
    /// torn down because its socket entity failed
    TransportFailed,
}

/// Fan-out point for in-process subscribers; the wire-level EVE messages to peer
///  nodes are emitted separately by the dispatcher.
pub struct BrokerEventNotifier {
    sender: broadcast::Sender<BrokerEvent>,
}

impl BrokerEventNotifier {
    pub fn new() -> BrokerEventNotifier {
        let (sender, _) = broadcast::channel(128);

        BrokerEventNotifier {
            sender
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BrokerEvent> {
        self.sender.subscribe()
    }

    pub fn send_event(&self, event: BrokerEvent) {
        trace!("event: {:?}", event);
        let _ = self.sender.send(event);
    }
}
