use std::sync::Arc;

use async_trait::async_trait;
use tokio::select;
use tokio::sync::{broadcast, RwLock};
use tokio::time;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::broker::broker_config::BrokerConfig;
use crate::broker::broker_events::{BrokerEvent, BrokerEventNotifier};
use crate::broker::broker_state::BrokerState;
use crate::broker::dispatcher::Dispatcher;
use crate::protocol::{EventType, FrameError, NetMsg};
use crate::protocol::net_addr::NetAddr;
use crate::transport::{MessageHandler, MsgSender, NetSender, Transport};

/// This is the broker's public API: owns the shared state, runs the receive loop
///  and the periodic heartbeat sweep, and hands out event subscriptions.
pub struct Broker<T: Transport> {
    pub config: Arc<BrokerConfig>,
    transport: Arc<T>,
    state: Arc<RwLock<BrokerState>>,
    notifier: Arc<BrokerEventNotifier>,
}

impl<T: Transport> Broker<T> {
    pub fn new(config: Arc<BrokerConfig>, transport: Arc<T>) -> Broker<T> {
        let notifier = Arc::new(BrokerEventNotifier::new());
        let state = Arc::new(RwLock::new(BrokerState::new(config.clone(), notifier.clone())));

        Broker {
            config,
            transport,
            state,
            notifier,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BrokerEvent> {
        self.notifier.subscribe()
    }

    /// Serves requests until the transport's receive loop ends. The heartbeat sweep
    ///  runs alongside on its own timer, so expiry does not depend on traffic.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("starting broker on {:?}", self.transport.self_addr());

        let sender = Arc::new(NetSender::new(self.transport.clone()));
        let dispatcher = Arc::new(Dispatcher::new(self.config.clone(), self.state.clone(), sender));
        let handler = Arc::new(InboundHandler { dispatcher: dispatcher.clone() });

        select! {
            r = self.transport.recv_loop(handler) => r,
            _ = run_sweep(self.config.clone(), self.state.clone(), dispatcher) => Ok(()),
        }
    }
}

/// Parses inbound frames and feeds them to the dispatcher. Handling is a blocking
///  call from the receive loop's point of view; request handling is quick (in-memory
///  registry work), so there is no offloading here.
struct InboundHandler<S: MsgSender> {
    dispatcher: Arc<Dispatcher<S>>,
}

#[async_trait]
impl<S: MsgSender> MessageHandler for InboundHandler<S> {
    async fn handle_message(&self, buf: &[u8], sender: NetAddr) {
        match NetMsg::try_read(buf) {
            Ok(msg) => self.dispatcher.on_message(msg).await,
            Err(FrameError::BadRequest { correlation_id }) => {
                self.dispatcher.on_malformed_request(correlation_id, sender).await;
            }
            Err(FrameError::Garbage(e)) => {
                warn!("received frame without a valid envelope from {:?} - discarding: {}", sender, e);
            }
        }
    }
}

async fn run_sweep<S: MsgSender>(
    config: Arc<BrokerConfig>,
    state: Arc<RwLock<BrokerState>>,
    dispatcher: Arc<Dispatcher<S>>,
) {
    let mut ticks = time::interval(config.sweep_interval);

    loop {
        ticks.tick().await;

        let evicted = state.write().await.sweep(Instant::now());
        for record in evicted {
            dispatcher.emit_node_event(EventType::NodeUnplug, record.id).await;
        }
    }
}
