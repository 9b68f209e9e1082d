use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::broker::broker_config::BrokerConfig;
use crate::broker::broker_state::BrokerState;
use crate::protocol::{Answer, Event, EventType, Grant, MsgBody, NetMsg, NodeId, OpType, Refusal, Request};
use crate::protocol::net_addr::NetAddr;
use crate::transport::MsgSender;

/// Per-message state machine on top of [BrokerState]: a REQ is dispatched and
///  answered exactly once, a DIS tears its sender's session down without an answer,
///  and EVE messages only ever flow outwards.
pub struct Dispatcher<S: MsgSender> {
    config: Arc<BrokerConfig>,
    state: Arc<RwLock<BrokerState>>,
    sender: Arc<S>,
}

impl<S: MsgSender> Dispatcher<S> {
    pub fn new(config: Arc<BrokerConfig>, state: Arc<RwLock<BrokerState>>, sender: Arc<S>) -> Dispatcher<S> {
        Dispatcher {
            config,
            state,
            sender,
        }
    }

    pub async fn on_message(&self, msg: NetMsg) {
        match msg.body {
            MsgBody::Req(request) => self.on_request(msg.correlation_id, msg.source, request).await,
            MsgBody::Dis => self.on_disconnect(msg.source).await,
            MsgBody::Ans(_) | MsgBody::Eve(_) => {
                warn!("received {:?} message from {:?} - the broker never consumes these, ignoring",
                    msg.body.msg_type(), msg.source);
            }
        }
    }

    /// Answers a request whose payload could not be parsed although the frame was
    ///  intact. The correlation id is known, so the peer gets a refusal instead of
    ///  a silent drop.
    pub async fn on_malformed_request(&self, correlation_id: u64, source: NetAddr) {
        warn!("malformed request payload from {:?} - refusing", source);
        self.answer(correlation_id, &source, Answer::Refused(Refusal::MalformedRequest)).await;
    }

    async fn on_request(&self, correlation_id: u64, source: NetAddr, request: Request) {
        let op = request.op();
        debug!("request {:?} from {:?}", op, source);

        let unreg_target = match &request {
            Request::UnregNode { node } => Some(*node),
            _ => None,
        };

        let answer = match time::timeout(self.config.request_timeout, self.execute(&source, request)).await {
            Ok(answer) => answer,
            Err(_) => {
                error!("handling {:?} from {:?} did not complete in time - answering with a local error", op, source);
                Answer::Refused(Refusal::Internal)
            }
        };

        // node arrivals and departures are announced to the other nodes once the
        //  answer is out
        let node_event = match (&op, &answer) {
            (OpType::RegNode, Answer::Accepted(Grant::Node(id))) => Some((EventType::NodePlug, *id)),
            (OpType::UnregNode, Answer::Accepted(_)) => unreg_target.map(|node| (EventType::NodeUnplug, node)),
            _ => None,
        };

        self.answer(correlation_id, &source, answer).await;

        if let Some((event, node)) = node_event {
            self.emit_node_event(event, node).await;
        }
    }

    async fn execute(&self, source: &NetAddr, request: Request) -> Answer {
        self.state.write().await
            .execute(source, request, Instant::now())
    }

    async fn answer(&self, correlation_id: u64, to: &NetAddr, answer: Answer) {
        let msg = NetMsg {
            correlation_id,
            source: self.sender.self_addr(),
            body: MsgBody::Ans(answer),
        };

        if let Err(e) = self.sender.try_send(to, &msg).await {
            warn!("error sending answer to {:?}: {}", to, e);
            self.on_send_failure(to).await;
        }
    }

    async fn on_disconnect(&self, source: NetAddr) {
        // NB: the lock must be released before the unplug notice fans out
        let removed = self.state.write().await.disconnect(&source);

        match removed {
            Some(record) => {
                debug!("node {:?} disconnected", record.id);
                self.emit_node_event(EventType::NodeUnplug, record.id).await;
            }
            None => debug!("disconnect notice from unknown address {:?} - ignoring", source),
        }
    }

    /// Pushes a node plug / unplug notification to every other registered node.
    pub async fn emit_node_event(&self, event: EventType, node: NodeId) {
        let peers = self.state.read().await.peer_addrs(node);

        for peer in peers {
            let msg = NetMsg {
                correlation_id: 0,
                source: self.sender.self_addr(),
                body: MsgBody::Eve(Event { event, node }),
            };
            if let Err(e) = self.sender.try_send(&peer, &msg).await {
                warn!("error sending {:?} notification to {:?}: {}", event, peer, e);
                self.on_send_failure(&peer).await;
            }
        }
    }

    /// A failed send means the address is gone for good as far as this broker is
    ///  concerned: flows bound to an entity at that address are torn down, and a
    ///  node session registered there is evicted.
    async fn on_send_failure(&self, addr: &NetAddr) {
        let mut state = self.state.write().await;

        let torn_down = state.teardown_entity_addr(addr);
        if torn_down > 0 {
            warn!("transport failure on {:?} - tore down {} flow(s)", addr, torn_down);
        }

        if let Some(record) = state.disconnect_failed(addr) {
            warn!("transport failure on control address of {:?} - session removed", record.id);
        }
    }
}
