use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use crate::protocol::net_addr::NetAddr;
use crate::transport::{MessageHandler, Transport};

/// Routes frames between in-process endpoints addressed by name. One hub per process
///  (or per test); endpoints are created through [LocalHub::endpoint].
pub struct LocalHub {
    endpoints: Mutex<FxHashMap<String, mpsc::Sender<(NetAddr, Vec<u8>)>>>,
}

impl LocalHub {
    pub fn new() -> Arc<LocalHub> {
        Arc::new(LocalHub {
            endpoints: Mutex::new(Default::default()),
        })
    }

    /// Creates (or replaces) the endpoint with the given name. Frames sent to
    ///  `NetAddr::Local { name }` on any endpoint of this hub end up in the returned
    ///  transport's receive loop.
    pub fn endpoint(self: &Arc<Self>, name: &str) -> LocalTransport {
        let (sender, receiver) = mpsc::channel(128);
        self.endpoints.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), sender);

        LocalTransport {
            hub: self.clone(),
            self_addr: NetAddr::Local { name: name.to_string() },
            receiver: tokio::sync::Mutex::new(receiver),
        }
    }

    fn sender_for(&self, name: &str) -> Option<mpsc::Sender<(NetAddr, Vec<u8>)>> {
        self.endpoints.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

/// An in-process transport endpoint, mainly for tests and single-host setups where
///  clients share the broker's process.
pub struct LocalTransport {
    hub: Arc<LocalHub>,
    self_addr: NetAddr,
    receiver: tokio::sync::Mutex<mpsc::Receiver<(NetAddr, Vec<u8>)>>,
}

#[async_trait]
impl Transport for LocalTransport {
    fn self_addr(&self) -> NetAddr {
        self.self_addr.clone()
    }

    async fn send(&self, to: &NetAddr, buf: &[u8]) -> anyhow::Result<()> {
        let name = match to {
            NetAddr::Local { name } => name,
            other => {
                return Err(anyhow!("{:?} is not reachable on the local hub", other));
            }
        };

        let sender = self.hub.sender_for(name)
            .ok_or_else(|| anyhow!("no local endpoint {:?}", name))?;
        sender.send((self.self_addr.clone(), buf.to_vec())).await
            .map_err(|_| anyhow!("local endpoint {:?} is gone", name))?;
        Ok(())
    }

    async fn recv_loop(&self, handler: Arc<dyn MessageHandler>) -> anyhow::Result<()> {
        let mut receiver = self.receiver.lock().await;
        while let Some((from, buf)) = receiver.recv().await {
            handler.handle_message(&buf, from).await;
        }
        Ok(())
    }
}
