use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::mpsc;
use tracing::{info, Level};

use tcbroker::broker::broker::Broker;
use tcbroker::broker::broker_config::BrokerConfig;
use tcbroker::protocol::{Answer, Grant, MsgBody, NetMsg, NodeId, PropValue, Request};
use tcbroker::protocol::net_addr::NetAddr;
use tcbroker::transport::{MessageHandler, Transport};
use tcbroker::transport::local::{LocalHub, LocalTransport};

fn init_logging() {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        // .with_max_level(Level::DEBUG)
        .try_init()
        .ok();
}

struct PrintingHandler {
    name: &'static str,
    answers: mpsc::Sender<NetMsg>,
}

#[async_trait::async_trait]
impl MessageHandler for PrintingHandler {
    async fn handle_message(&self, buf: &[u8], _sender: NetAddr) {
        if let Ok(msg) = NetMsg::try_read(buf) {
            match &msg.body {
                MsgBody::Eve(event) => info!("[{}] notification: {:?}", self.name, event),
                _ => {
                    let _ = self.answers.send(msg).await;
                }
            }
        }
    }
}

struct DemoClient {
    name: &'static str,
    transport: Arc<LocalTransport>,
    answers: tokio::sync::Mutex<mpsc::Receiver<NetMsg>>,
    broker_addr: NetAddr,
    correlation: std::sync::atomic::AtomicU64,
}

impl DemoClient {
    fn new(hub: &Arc<LocalHub>, name: &'static str, broker_addr: NetAddr) -> DemoClient {
        let transport = Arc::new(hub.endpoint(name));
        let (sender, receiver) = mpsc::channel(64);

        let recv_transport = transport.clone();
        tokio::spawn(async move {
            let _ = recv_transport.recv_loop(Arc::new(PrintingHandler { name, answers: sender })).await;
        });

        DemoClient {
            name,
            transport,
            answers: tokio::sync::Mutex::new(receiver),
            broker_addr,
            correlation: std::sync::atomic::AtomicU64::new(1),
        }
    }

    async fn request(&self, request: Request) -> anyhow::Result<Answer> {
        let correlation_id = self.correlation.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let op = request.op();

        let msg = NetMsg {
            correlation_id,
            source: self.transport.self_addr(),
            body: MsgBody::Req(request),
        };
        let mut buf = BytesMut::new();
        msg.write(&mut buf);
        self.transport.send(&self.broker_addr, &buf).await?;

        let answer = self.answers.lock().await.recv().await
            .ok_or_else(|| anyhow::anyhow!("broker went away"))?;
        match answer.body {
            MsgBody::Ans(answer) => {
                info!("[{}] {:?} -> {:?}", self.name, op, answer);
                Ok(answer)
            }
            other => Err(anyhow::anyhow!("unexpected message {:?}", other)),
        }
    }
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    init_logging();

    let hub = LocalHub::new();
    let broker_addr = NetAddr::Local { name: "broker".to_string() };

    let mut config = BrokerConfig::new(broker_addr.clone());
    config.heartbeat_timeout = Duration::from_secs(2);
    config.default_entity_capacity = Some(100);
    let broker = Arc::new(Broker::new(Arc::new(config), Arc::new(hub.endpoint("broker"))));

    let run_broker = broker.clone();
    tokio::spawn(async move {
        let _ = run_broker.run().await;
    });

    let video = DemoClient::new(&hub, "video-node", broker_addr.clone());
    let audio = DemoClient::new(&hub, "audio-node", broker_addr.clone());

    let video_node = match video.request(Request::RegNode { desired: NodeId::ASSIGN }).await? {
        Answer::Accepted(Grant::Node(id)) => id,
        other => anyhow::bail!("registration failed: {:?}", other),
    };
    let audio_node = match audio.request(Request::RegNode { desired: NodeId::ASSIGN }).await? {
        Answer::Accepted(Grant::Node(id)) => id,
        other => anyhow::bail!("registration failed: {:?}", other),
    };

    video.request(Request::RegTopic {
        topic: "camera/front".to_string(),
        props: vec![
            ("channel_size".to_string(), PropValue::Number(1400)),
            ("channel_period".to_string(), PropValue::Number(40)),
        ],
    }).await?;

    let producer = match video.request(Request::RegProd { node: video_node, topic: "camera/front".to_string() }).await? {
        Answer::Accepted(Grant::Producer(id, _)) => id,
        other => anyhow::bail!("producer registration failed: {:?}", other),
    };
    let consumer = match audio.request(Request::RegCons { node: audio_node, topic: "camera/front".to_string() }).await? {
        Answer::Accepted(Grant::Consumer(id, _)) => id,
        other => anyhow::bail!("consumer registration failed: {:?}", other),
    };

    // both flows share one multicast entity and compete for its budget
    let group = NetAddr::UdpGroup("239.10.104.11:10011".parse()?);
    let tx = match video.request(Request::BindTx { producer, addr: group.clone() }).await? {
        Answer::Accepted(Grant::Binding(id)) => id,
        other => anyhow::bail!("bind failed: {:?}", other),
    };
    let rx = match audio.request(Request::BindRx { consumer, addr: group }).await? {
        Answer::Accepted(Grant::Binding(id)) => id,
        other => anyhow::bail!("bind failed: {:?}", other),
    };

    video.request(Request::TcReserv { binding: tx, quantum: 60 }).await?;
    // over budget: 60 + 50 > 100
    audio.request(Request::TcReserv { binding: rx, quantum: 50 }).await?;
    audio.request(Request::TcReserv { binding: rx, quantum: 40 }).await?;
    // over budget again: growing 60 -> 70 with 40 still held
    video.request(Request::TcModify { binding: tx, quantum: 70 }).await?;
    video.request(Request::TcFree { binding: tx }).await?;
    audio.request(Request::TcModify { binding: rx, quantum: 70 }).await?;

    // the audio node gets an unplug notification for its peer
    video.request(Request::UnregNode { node: video_node }).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    audio.request(Request::UnregNode { node: audio_node }).await?;
    Ok(())
}
