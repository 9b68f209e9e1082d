pub mod local;
pub mod udp;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
#[cfg(test)] use mockall::automock;

use crate::protocol::NetMsg;
use crate::protocol::net_addr::NetAddr;

pub const MAX_MSG_SIZE: usize = 64 * 1024;

/// Raw frame transport. Implementations move opaque byte frames between [NetAddr]
///  endpoints; framing and message semantics live above this seam.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    fn self_addr(&self) -> NetAddr;

    async fn send(&self, to: &NetAddr, buf: &[u8]) -> anyhow::Result<()>;

    async fn recv_loop(&self, handler: Arc<dyn MessageHandler>) -> anyhow::Result<()>;
}

/// This trait decouples the implementation of frame transport (different strategies)
///  from the handling of a frame once it is received.
///
/// It is passed around as an `Arc<dyn ...>` to minimize dependencies of [Transport]
///  implementations.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, buf: &[u8], sender: NetAddr);
}

/// Typed send seam: serializes a [NetMsg] and hands the frame to the transport.
///  The broker core only ever talks to this trait, which keeps it testable without
///  sockets.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MsgSender: Send + Sync + 'static {
    fn self_addr(&self) -> NetAddr;

    async fn try_send(&self, to: &NetAddr, msg: &NetMsg) -> anyhow::Result<()>;
}

pub struct NetSender<T: Transport> {
    transport: Arc<T>,
}

impl<T: Transport> NetSender<T> {
    pub fn new(transport: Arc<T>) -> NetSender<T> {
        NetSender { transport }
    }
}

impl<T: Transport> Debug for NetSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NetSender{{self_addr:{:?}}}", self.transport.self_addr())
    }
}

#[async_trait]
impl<T: Transport> MsgSender for NetSender<T> {
    fn self_addr(&self) -> NetAddr {
        self.transport.self_addr()
    }

    async fn try_send(&self, to: &NetAddr, msg: &NetMsg) -> anyhow::Result<()> {
        let mut buf = BytesMut::new();
        msg.write(&mut buf);
        self.transport.send(to, &buf).await
    }
}
