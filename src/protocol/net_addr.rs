use std::fmt::{Debug, Formatter};
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};

use anyhow::anyhow;
use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::util::buf::{put_string, try_get_string};

/// The transport flavor behind a [NetAddr]. The discriminator is part of the wire
///  representation, so changing a value is a protocol break.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum SockType {
    /// in-process / same-host communication, addressed by name
    Local = 1,
    /// plain UDP datagrams to a unicast address
    RemoteUdp = 2,
    /// a TCP connection to a unicast address
    RemoteTcp = 3,
    /// UDP datagrams to a multicast group
    RemoteUdpGroup = 4,
}

/// A transport-agnostic endpoint address. The payload's interpretation depends on the
///  transport kind: a name for local endpoints, an `ip:port` for UDP / TCP, and a
///  multicast `group:port` for UDP group endpoints.
///
/// Values are immutable and used as map keys throughout the broker.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum NetAddr {
    Local { name: String },
    Udp(SocketAddr),
    Tcp(SocketAddr),
    UdpGroup(SocketAddr),
}

impl Debug for NetAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NetAddr::Local { name } => write!(f, "[local:{}]", name),
            NetAddr::Udp(addr) => write!(f, "[udp:{}]", addr),
            NetAddr::Tcp(addr) => write!(f, "[tcp:{}]", addr),
            NetAddr::UdpGroup(addr) => write!(f, "[udp-group:{}]", addr),
        }
    }
}

impl NetAddr {
    pub fn sock_type(&self) -> SockType {
        match self {
            NetAddr::Local { .. } => SockType::Local,
            NetAddr::Udp(_) => SockType::RemoteUdp,
            NetAddr::Tcp(_) => SockType::RemoteTcp,
            NetAddr::UdpGroup(_) => SockType::RemoteUdpGroup,
        }
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u8(self.sock_type().into());
        match self {
            NetAddr::Local { name } => put_string(buf, name),
            NetAddr::Udp(addr) | NetAddr::Tcp(addr) | NetAddr::UdpGroup(addr) => ser_socket_addr(addr, buf),
        }
    }

    pub fn try_deser(buf: &mut impl Buf) -> anyhow::Result<NetAddr> {
        let sock_type = SockType::try_from(buf.try_get_u8()?)?;
        let addr = match sock_type {
            SockType::Local => NetAddr::Local { name: try_get_string(buf)? },
            SockType::RemoteUdp => NetAddr::Udp(try_deser_socket_addr(buf)?),
            SockType::RemoteTcp => NetAddr::Tcp(try_deser_socket_addr(buf)?),
            SockType::RemoteUdpGroup => NetAddr::UdpGroup(try_deser_socket_addr(buf)?),
        };
        Ok(addr)
    }
}

fn ser_socket_addr(addr: &SocketAddr, buf: &mut BytesMut) {
    match addr {
        SocketAddr::V4(data) => {
            buf.put_u8(4);
            buf.put_u32(data.ip().to_bits());
            buf.put_u16(data.port());
        }
        SocketAddr::V6(data) => {
            buf.put_u8(6);
            buf.put_u128(data.ip().to_bits());
            buf.put_u16(data.port());
        }
    }
}

fn try_deser_socket_addr(buf: &mut impl Buf) -> anyhow::Result<SocketAddr> {
    match buf.try_get_u8()? {
        4 => {
            let ip = buf.try_get_u32()?;
            let port = buf.try_get_u16()?;
            Ok(SocketAddr::V4(SocketAddrV4::new(ip.into(), port)))
        }
        6 => {
            let ip = buf.try_get_u128()?;
            let port = buf.try_get_u16()?;
            Ok(SocketAddr::V6(SocketAddrV6::new(ip.into(), port, 0, 0)))
        }
        n => Err(anyhow!("invalid socket address discriminator: {}", n)),
    }
}
