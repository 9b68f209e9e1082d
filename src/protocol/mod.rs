pub mod net_addr;

use std::fmt::{Debug, Formatter};

use anyhow::anyhow;
use bytes::{Buf, BufMut, BytesMut};
use bytes_varint::{VarIntSupport, VarIntSupportMut};
use crc::Crc;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::protocol::net_addr::NetAddr;
use crate::util::buf::{put_string, try_get_string};

/// The four message categories on the wire. REQ and ANS are paired by correlation id,
///  DIS is a one-way disconnect notice, EVE is a broker-originated notification.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum MsgType {
    Req = 1,
    Ans = 2,
    Dis = 3,
    Eve = 4,
}

/// Operation discriminators. The `ReqAccepted` / `ReqRefused` values are only ever
///  carried by ANS messages; everything else names a request operation.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum OpType {
    RegNode = 1,
    UnregNode = 2,
    HeartSig = 3,
    RegTopic = 4,
    DelTopic = 5,
    GetTopicProp = 6,
    SetTopicProp = 7,
    RegProd = 8,
    UnregProd = 9,
    RegCons = 10,
    UnregCons = 11,
    BindTx = 12,
    UnbindTx = 13,
    BindRx = 14,
    UnbindRx = 15,
    TcReserv = 16,
    TcFree = 17,
    TcModify = 18,
    ReqAccepted = 19,
    ReqRefused = 20,
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum EventType {
    NodePlug = 1,
    NodeUnplug = 2,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(pub u32);
impl NodeId {
    /// passed in a REG_NODE request to let the broker assign an id from its pool
    pub const ASSIGN: NodeId = NodeId(0);
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ProducerId(pub u32);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ConsumerId(pub u32);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BindingId(pub u64);

/// An opaque topic property value. The broker stores and returns these without
///  interpreting them.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PropValue {
    Number(u64),
    Text(String),
}

const ID_PROP_NUMBER: u8 = 1;
const ID_PROP_TEXT: u8 = 2;

impl PropValue {
    fn ser(&self, buf: &mut BytesMut) {
        match self {
            PropValue::Number(n) => {
                buf.put_u8(ID_PROP_NUMBER);
                buf.put_u64_varint(*n);
            }
            PropValue::Text(s) => {
                buf.put_u8(ID_PROP_TEXT);
                put_string(buf, s);
            }
        }
    }

    fn try_deser(buf: &mut impl Buf) -> anyhow::Result<PropValue> {
        match buf.try_get_u8()? {
            ID_PROP_NUMBER => Ok(PropValue::Number(buf.try_get_u64_varint()?)),
            ID_PROP_TEXT => Ok(PropValue::Text(try_get_string(buf)?)),
            id => Err(anyhow!("invalid property value discriminator {}", id)),
        }
    }
}

fn put_props(buf: &mut BytesMut, props: &[(String, PropValue)]) {
    buf.put_usize_varint(props.len());
    for (key, value) in props {
        put_string(buf, key);
        value.ser(buf);
    }
}

fn try_get_props(buf: &mut impl Buf) -> anyhow::Result<Vec<(String, PropValue)>> {
    let len = buf.try_get_usize_varint()?;
    // no pre-allocation from a length the peer controls
    let mut result = Vec::new();
    for _ in 0..len {
        let key = try_get_string(buf)?;
        let value = PropValue::try_deser(buf)?;
        result.push((key, value));
    }
    Ok(result)
}

/// A request operation with its operation-specific payload. Node and topic lifecycle,
///  producer / consumer registration, flow binding and traffic reservation all go
///  through this one type so the dispatcher can route on it uniformly.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Request {
    RegNode { desired: NodeId },
    UnregNode { node: NodeId },
    HeartSig { node: NodeId },
    RegTopic { topic: String, props: Vec<(String, PropValue)> },
    DelTopic { topic: String },
    GetTopicProp { topic: String, key: String },
    SetTopicProp { topic: String, key: String, value: PropValue },
    RegProd { node: NodeId, topic: String },
    UnregProd { producer: ProducerId },
    RegCons { node: NodeId, topic: String },
    UnregCons { consumer: ConsumerId },
    BindTx { producer: ProducerId, addr: NetAddr },
    UnbindTx { binding: BindingId },
    BindRx { consumer: ConsumerId, addr: NetAddr },
    UnbindRx { binding: BindingId },
    TcReserv { binding: BindingId, quantum: u32 },
    TcFree { binding: BindingId },
    TcModify { binding: BindingId, quantum: u32 },
}

impl Request {
    pub fn op(&self) -> OpType {
        match self {
            Request::RegNode { .. } => OpType::RegNode,
            Request::UnregNode { .. } => OpType::UnregNode,
            Request::HeartSig { .. } => OpType::HeartSig,
            Request::RegTopic { .. } => OpType::RegTopic,
            Request::DelTopic { .. } => OpType::DelTopic,
            Request::GetTopicProp { .. } => OpType::GetTopicProp,
            Request::SetTopicProp { .. } => OpType::SetTopicProp,
            Request::RegProd { .. } => OpType::RegProd,
            Request::UnregProd { .. } => OpType::UnregProd,
            Request::RegCons { .. } => OpType::RegCons,
            Request::UnregCons { .. } => OpType::UnregCons,
            Request::BindTx { .. } => OpType::BindTx,
            Request::UnbindTx { .. } => OpType::UnbindTx,
            Request::BindRx { .. } => OpType::BindRx,
            Request::UnbindRx { .. } => OpType::UnbindRx,
            Request::TcReserv { .. } => OpType::TcReserv,
            Request::TcFree { .. } => OpType::TcFree,
            Request::TcModify { .. } => OpType::TcModify,
        }
    }

    fn ser(&self, buf: &mut BytesMut) {
        buf.put_u8(self.op().into());
        match self {
            Request::RegNode { desired } => buf.put_u32(desired.0),
            Request::UnregNode { node } | Request::HeartSig { node } => buf.put_u32(node.0),
            Request::RegTopic { topic, props } => {
                put_string(buf, topic);
                put_props(buf, props);
            }
            Request::DelTopic { topic } => put_string(buf, topic),
            Request::GetTopicProp { topic, key } => {
                put_string(buf, topic);
                put_string(buf, key);
            }
            Request::SetTopicProp { topic, key, value } => {
                put_string(buf, topic);
                put_string(buf, key);
                value.ser(buf);
            }
            Request::RegProd { node, topic } | Request::RegCons { node, topic } => {
                buf.put_u32(node.0);
                put_string(buf, topic);
            }
            Request::UnregProd { producer } => buf.put_u32(producer.0),
            Request::UnregCons { consumer } => buf.put_u32(consumer.0),
            Request::BindTx { producer, addr } => {
                buf.put_u32(producer.0);
                addr.ser(buf);
            }
            Request::BindRx { consumer, addr } => {
                buf.put_u32(consumer.0);
                addr.ser(buf);
            }
            Request::UnbindTx { binding } | Request::UnbindRx { binding } | Request::TcFree { binding } => {
                buf.put_u64(binding.0)
            }
            Request::TcReserv { binding, quantum } | Request::TcModify { binding, quantum } => {
                buf.put_u64(binding.0);
                buf.put_u32(*quantum);
            }
        }
    }

    fn try_deser(buf: &mut impl Buf) -> anyhow::Result<Request> {
        let op = OpType::try_from(buf.try_get_u8()?)?;
        let request = match op {
            OpType::RegNode => Request::RegNode { desired: NodeId(buf.try_get_u32()?) },
            OpType::UnregNode => Request::UnregNode { node: NodeId(buf.try_get_u32()?) },
            OpType::HeartSig => Request::HeartSig { node: NodeId(buf.try_get_u32()?) },
            OpType::RegTopic => Request::RegTopic {
                topic: try_get_string(buf)?,
                props: try_get_props(buf)?,
            },
            OpType::DelTopic => Request::DelTopic { topic: try_get_string(buf)? },
            OpType::GetTopicProp => Request::GetTopicProp {
                topic: try_get_string(buf)?,
                key: try_get_string(buf)?,
            },
            OpType::SetTopicProp => Request::SetTopicProp {
                topic: try_get_string(buf)?,
                key: try_get_string(buf)?,
                value: PropValue::try_deser(buf)?,
            },
            OpType::RegProd => Request::RegProd {
                node: NodeId(buf.try_get_u32()?),
                topic: try_get_string(buf)?,
            },
            OpType::UnregProd => Request::UnregProd { producer: ProducerId(buf.try_get_u32()?) },
            OpType::RegCons => Request::RegCons {
                node: NodeId(buf.try_get_u32()?),
                topic: try_get_string(buf)?,
            },
            OpType::UnregCons => Request::UnregCons { consumer: ConsumerId(buf.try_get_u32()?) },
            OpType::BindTx => Request::BindTx {
                producer: ProducerId(buf.try_get_u32()?),
                addr: NetAddr::try_deser(buf)?,
            },
            OpType::UnbindTx => Request::UnbindTx { binding: BindingId(buf.try_get_u64()?) },
            OpType::BindRx => Request::BindRx {
                consumer: ConsumerId(buf.try_get_u32()?),
                addr: NetAddr::try_deser(buf)?,
            },
            OpType::UnbindRx => Request::UnbindRx { binding: BindingId(buf.try_get_u64()?) },
            OpType::TcReserv => Request::TcReserv {
                binding: BindingId(buf.try_get_u64()?),
                quantum: buf.try_get_u32()?,
            },
            OpType::TcFree => Request::TcFree { binding: BindingId(buf.try_get_u64()?) },
            OpType::TcModify => Request::TcModify {
                binding: BindingId(buf.try_get_u64()?),
                quantum: buf.try_get_u32()?,
            },
            OpType::ReqAccepted | OpType::ReqRefused => {
                return Err(anyhow!("answer op code {:?} in a request", op));
            }
        };
        Ok(request)
    }
}

/// The coarse error classes requests can fail with. Refusals are answers, not faults:
///  the broker stays up and the client decides how to react.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorClass {
    NotFound,
    Conflict,
    InUse,
    Capacity,
    Transport,
    Protocol,
    Internal,
}

/// Why a request was refused. Carried verbatim in REQ_REFUSED answers.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum Refusal {
    UnknownNode = 1,
    UnknownTopic = 2,
    UnknownProducer = 3,
    UnknownConsumer = 4,
    UnknownBinding = 5,
    UnknownReservation = 6,
    PropNotFound = 7,
    AlreadyRegistered = 8,
    TopicExists = 9,
    AlreadyReserved = 10,
    TopicInUse = 11,
    InsufficientCapacity = 12,
    EntityUnavailable = 13,
    MalformedRequest = 14,
    Internal = 15,
}

impl Refusal {
    pub fn class(&self) -> ErrorClass {
        use Refusal::*;

        match self {
            UnknownNode | UnknownTopic | UnknownProducer | UnknownConsumer
            | UnknownBinding | UnknownReservation | PropNotFound => ErrorClass::NotFound,
            AlreadyRegistered | TopicExists | AlreadyReserved => ErrorClass::Conflict,
            TopicInUse => ErrorClass::InUse,
            InsufficientCapacity => ErrorClass::Capacity,
            EntityUnavailable => ErrorClass::Transport,
            MalformedRequest => ErrorClass::Protocol,
            Internal => ErrorClass::Internal,
        }
    }
}

/// The operation-specific payload of an accepting answer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Grant {
    None,
    Node(NodeId),
    Topic(Vec<(String, PropValue)>),
    Producer(ProducerId, Vec<(String, PropValue)>),
    Consumer(ConsumerId, Vec<(String, PropValue)>),
    Binding(BindingId),
    Property(PropValue),
    Reservation { granted: u32 },
}

const ID_GRANT_NONE: u8 = 1;
const ID_GRANT_NODE: u8 = 2;
const ID_GRANT_TOPIC: u8 = 3;
const ID_GRANT_PRODUCER: u8 = 4;
const ID_GRANT_CONSUMER: u8 = 5;
const ID_GRANT_BINDING: u8 = 6;
const ID_GRANT_PROPERTY: u8 = 7;
const ID_GRANT_RESERVATION: u8 = 8;

impl Grant {
    fn ser(&self, buf: &mut BytesMut) {
        match self {
            Grant::None => buf.put_u8(ID_GRANT_NONE),
            Grant::Node(node) => {
                buf.put_u8(ID_GRANT_NODE);
                buf.put_u32(node.0);
            }
            Grant::Topic(props) => {
                buf.put_u8(ID_GRANT_TOPIC);
                put_props(buf, props);
            }
            Grant::Producer(producer, props) => {
                buf.put_u8(ID_GRANT_PRODUCER);
                buf.put_u32(producer.0);
                put_props(buf, props);
            }
            Grant::Consumer(consumer, props) => {
                buf.put_u8(ID_GRANT_CONSUMER);
                buf.put_u32(consumer.0);
                put_props(buf, props);
            }
            Grant::Binding(binding) => {
                buf.put_u8(ID_GRANT_BINDING);
                buf.put_u64(binding.0);
            }
            Grant::Property(value) => {
                buf.put_u8(ID_GRANT_PROPERTY);
                value.ser(buf);
            }
            Grant::Reservation { granted } => {
                buf.put_u8(ID_GRANT_RESERVATION);
                buf.put_u32(*granted);
            }
        }
    }

    fn try_deser(buf: &mut impl Buf) -> anyhow::Result<Grant> {
        let grant = match buf.try_get_u8()? {
            ID_GRANT_NONE => Grant::None,
            ID_GRANT_NODE => Grant::Node(NodeId(buf.try_get_u32()?)),
            ID_GRANT_TOPIC => Grant::Topic(try_get_props(buf)?),
            ID_GRANT_PRODUCER => Grant::Producer(ProducerId(buf.try_get_u32()?), try_get_props(buf)?),
            ID_GRANT_CONSUMER => Grant::Consumer(ConsumerId(buf.try_get_u32()?), try_get_props(buf)?),
            ID_GRANT_BINDING => Grant::Binding(BindingId(buf.try_get_u64()?)),
            ID_GRANT_PROPERTY => Grant::Property(PropValue::try_deser(buf)?),
            ID_GRANT_RESERVATION => Grant::Reservation { granted: buf.try_get_u32()? },
            id => return Err(anyhow!("invalid grant discriminator {}", id)),
        };
        Ok(grant)
    }
}

/// The outcome of a request: accepted with a grant, or refused with a reason.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Answer {
    Accepted(Grant),
    Refused(Refusal),
}

impl Answer {
    pub fn op(&self) -> OpType {
        match self {
            Answer::Accepted(_) => OpType::ReqAccepted,
            Answer::Refused(_) => OpType::ReqRefused,
        }
    }

    fn ser(&self, buf: &mut BytesMut) {
        buf.put_u8(self.op().into());
        match self {
            Answer::Accepted(grant) => grant.ser(buf),
            Answer::Refused(refusal) => buf.put_u8((*refusal).into()),
        }
    }

    fn try_deser(buf: &mut impl Buf) -> anyhow::Result<Answer> {
        match OpType::try_from(buf.try_get_u8()?)? {
            OpType::ReqAccepted => Ok(Answer::Accepted(Grant::try_deser(buf)?)),
            OpType::ReqRefused => Ok(Answer::Refused(Refusal::try_from(buf.try_get_u8()?)?)),
            op => Err(anyhow!("request op code {:?} in an answer", op)),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Event {
    pub event: EventType,
    pub node: NodeId,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MsgBody {
    Req(Request),
    Ans(Answer),
    Dis,
    Eve(Event),
}

impl MsgBody {
    pub fn msg_type(&self) -> MsgType {
        match self {
            MsgBody::Req(_) => MsgType::Req,
            MsgBody::Ans(_) => MsgType::Ans,
            MsgBody::Dis => MsgType::Dis,
            MsgBody::Eve(_) => MsgType::Eve,
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Checksum(pub u64);
impl Debug for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x?}", self.0)
    }
}
impl Checksum {
    pub fn new(msg_type: MsgType, correlation_id: u64, payload: &[u8]) -> Checksum {
        let hasher = Crc::<u64>::new(&crc::CRC_64_REDIS);
        let mut digest = hasher.digest();

        digest.update(&[msg_type.into()]);
        digest.update(&correlation_id.to_le_bytes());
        digest.update(payload);

        Checksum(digest.finalize())
    }
}

/// A frame that could not be turned into a [NetMsg].
///
/// `BadRequest` means the frame itself was intact (checksum ok, REQ header readable)
///  but the request payload was not - the correlation id is recoverable, so the peer
///  can still be given a refusal instead of a silent drop.
#[derive(Debug)]
pub enum FrameError {
    Garbage(anyhow::Error),
    BadRequest { correlation_id: u64 },
}

/// The message envelope: type, correlation id, source address and the typed payload.
///  A checksum over everything behind the header guards against mangled frames.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NetMsg {
    pub correlation_id: u64,
    pub source: NetAddr,
    pub body: MsgBody,
}

impl NetMsg {
    pub fn write(&self, buf: &mut BytesMut) {
        let mut payload = BytesMut::new();
        self.source.ser(&mut payload);
        match &self.body {
            MsgBody::Req(request) => request.ser(&mut payload),
            MsgBody::Ans(answer) => answer.ser(&mut payload),
            MsgBody::Dis => {}
            MsgBody::Eve(event) => {
                payload.put_u8(event.event.into());
                payload.put_u32(event.node.0);
            }
        }

        let msg_type = self.body.msg_type();
        let checksum = Checksum::new(msg_type, self.correlation_id, &payload);

        buf.put_u8(msg_type.into());
        buf.put_u64(self.correlation_id);
        buf.put_u64(checksum.0);
        buf.extend_from_slice(&payload);
    }

    pub fn try_read(buf: &[u8]) -> Result<NetMsg, FrameError> {
        let mut buf = buf;
        let header = Self::try_read_header(&mut buf).map_err(FrameError::Garbage)?;
        let (msg_type, correlation_id) = header;

        match Self::try_read_payload(msg_type, correlation_id, buf) {
            Ok(msg) => Ok(msg),
            // the frame was intact, so for a request the peer can still be answered
            Err(_) if msg_type == MsgType::Req => Err(FrameError::BadRequest { correlation_id }),
            Err(e) => Err(FrameError::Garbage(e)),
        }
    }

    fn try_read_header(buf: &mut &[u8]) -> anyhow::Result<(MsgType, u64)> {
        let msg_type = MsgType::try_from(buf.try_get_u8()?)?;
        let correlation_id = buf.try_get_u64()?;
        let checksum = Checksum(buf.try_get_u64()?);

        let actual = Checksum::new(msg_type, correlation_id, *buf);
        if checksum != actual {
            return Err(anyhow!("checksum mismatch - discarding frame"));
        }
        Ok((msg_type, correlation_id))
    }

    fn try_read_payload(msg_type: MsgType, correlation_id: u64, mut buf: &[u8]) -> anyhow::Result<NetMsg> {
        let source = NetAddr::try_deser(&mut buf)?;
        let body = match msg_type {
            MsgType::Req => MsgBody::Req(Request::try_deser(&mut buf)?),
            MsgType::Ans => MsgBody::Ans(Answer::try_deser(&mut buf)?),
            MsgType::Dis => MsgBody::Dis,
            MsgType::Eve => MsgBody::Eve(Event {
                event: EventType::try_from(buf.try_get_u8()?)?,
                node: NodeId(buf.try_get_u32()?),
            }),
        };

        Ok(NetMsg {
            correlation_id,
            source,
            body,
        })
    }
}
