use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{error, warn};

use crate::protocol::net_addr::NetAddr;
use crate::transport::{MessageHandler, Transport, MAX_MSG_SIZE};

/// Datagram transport over a single UDP socket. Replies originate from the bound
///  port, so peers can answer to the address they received from.
///
/// Multicast group targets are sent like any other datagram; joining a group is the
///  receiving side's concern and not part of the broker's control path.
pub struct UdpTransport {
    socket: UdpSocket,
    self_addr: NetAddr,
}

impl UdpTransport {
    pub async fn new(bind_addr: SocketAddr) -> anyhow::Result<UdpTransport> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let self_addr = NetAddr::Udp(socket.local_addr()?);

        Ok(UdpTransport {
            socket,
            self_addr,
        })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn self_addr(&self) -> NetAddr {
        self.self_addr.clone()
    }

    async fn send(&self, to: &NetAddr, buf: &[u8]) -> anyhow::Result<()> {
        let target = match to {
            NetAddr::Udp(addr) | NetAddr::UdpGroup(addr) => *addr,
            other => {
                return Err(anyhow!("{:?} is not reachable over UDP", other));
            }
        };

        self.socket.send_to(buf, target).await?;
        Ok(())
    }

    async fn recv_loop(&self, handler: Arc<dyn MessageHandler>) -> anyhow::Result<()> {
        let mut buf = [0u8; MAX_MSG_SIZE];
        loop {
            let (num_read, from) = match self.socket.recv_from(&mut buf).await {
                Ok(x) => x,
                Err(e) => {
                    error!("socket error: {}", e);
                    continue;
                }
            };

            if num_read == buf.len() {
                warn!("received a datagram of {} bytes or more - skipping", buf.len());
                continue;
            }

            handler.handle_message(&buf[..num_read], NetAddr::Udp(from)).await;
        }
    }
}
