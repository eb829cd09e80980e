//! 节点间网络层
//!
//! 出站：每个对端一个发送任务，任务持有一条按需重连的 TCP 连接，
//! 发送调用只做入队，绝不在 Raft 状态锁内等待网络。每次连接与写出都
//! 受 RPC 截止时间约束；失败只记日志，由上层在下一个调度周期重试。
//!
//! 入站：监听 raft_addr，解码 `PeerMessage` 后作为事件投递给驱动器。
//! 监听器绑定完成即可服务，无需任何启动等待。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use raft::{
    AppendEntriesRequest, AppendEntriesResponse, Event, Network, NodeId, RaftDriver,
    RequestVoteRequest, RequestVoteResponse, RpcError, RpcResult,
};
use ticket_protocol::{decode, encode, read_frame, write_frame, PeerMessage, PeerPayload};

/// 每个对端的发送队列长度
const PEER_QUEUE_CAPACITY: usize = 256;

/// 出站对端传输
#[derive(Clone)]
pub struct PeerTransport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    local_id: NodeId,
    senders: HashMap<NodeId, mpsc::Sender<PeerMessage>>,
}

impl PeerTransport {
    pub fn new(
        local_id: NodeId,
        peer_addrs: HashMap<NodeId, SocketAddr>,
        rpc_deadline: Duration,
    ) -> Self {
        let mut senders = HashMap::new();
        for (peer_id, addr) in peer_addrs {
            let (tx, rx) = mpsc::channel(PEER_QUEUE_CAPACITY);
            senders.insert(peer_id.clone(), tx);
            tokio::spawn(run_peer_sender(
                local_id.clone(),
                peer_id,
                addr,
                rpc_deadline,
                rx,
            ));
        }
        Self {
            inner: Arc::new(TransportInner { local_id, senders }),
        }
    }

    fn enqueue(&self, target: &NodeId, payload: PeerPayload) -> RpcResult<()> {
        let sender = self
            .inner
            .senders
            .get(target)
            .ok_or_else(|| RpcError::NodeNotFound(target.clone()))?;

        let msg = PeerMessage {
            from: self.inner.local_id.clone(),
            payload,
        };

        sender.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                RpcError::Network(format!("send queue to {} full", target))
            }
            mpsc::error::TrySendError::Closed(_) => {
                RpcError::Network(format!("send queue to {} closed", target))
            }
        })
    }
}

#[async_trait]
impl Network for PeerTransport {
    async fn send_request_vote_request(
        &self,
        target: &NodeId,
        args: RequestVoteRequest,
    ) -> RpcResult<()> {
        self.enqueue(target, PeerPayload::VoteRequest(args))
    }

    async fn send_request_vote_response(
        &self,
        target: &NodeId,
        args: RequestVoteResponse,
    ) -> RpcResult<()> {
        self.enqueue(target, PeerPayload::VoteResponse(args))
    }

    async fn send_append_entries_request(
        &self,
        target: &NodeId,
        args: AppendEntriesRequest,
    ) -> RpcResult<()> {
        self.enqueue(target, PeerPayload::AppendRequest(args))
    }

    async fn send_append_entries_response(
        &self,
        target: &NodeId,
        args: AppendEntriesResponse,
    ) -> RpcResult<()> {
        self.enqueue(target, PeerPayload::AppendResponse(args))
    }
}

/// 对端发送任务：按需建连，逐条发送队列中的消息。
/// 发送失败丢弃消息并断开连接，消息的重发由 Raft 的重试机制负责。
async fn run_peer_sender(
    local_id: NodeId,
    peer_id: NodeId,
    addr: SocketAddr,
    rpc_deadline: Duration,
    mut rx: mpsc::Receiver<PeerMessage>,
) {
    let mut conn: Option<TcpStream> = None;

    while let Some(msg) = rx.recv().await {
        if conn.is_none() {
            match timeout(rpc_deadline, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    let _ = stream.set_nodelay(true);
                    debug!("{}: connected to peer {} at {}", local_id, peer_id, addr);
                    conn = Some(stream);
                }
                Ok(Err(e)) => {
                    debug!("{}: connect to {} failed: {}", local_id, peer_id, e);
                    continue;
                }
                Err(_) => {
                    debug!("{}: connect to {} timed out", local_id, peer_id);
                    continue;
                }
            }
        }

        let payload = match encode(&msg) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("{}: failed to encode peer message: {}", local_id, e);
                continue;
            }
        };

        let stream = conn.as_mut().expect("connection established above");
        match timeout(rpc_deadline, write_frame(stream, &payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("{}: send to {} failed: {}, reconnecting", local_id, peer_id, e);
                conn = None;
            }
            Err(_) => {
                debug!("{}: send to {} timed out, reconnecting", local_id, peer_id);
                conn = None;
            }
        }
    }

    debug!("{}: sender task for {} exiting", local_id, peer_id);
}

/// 入站监听循环：把对端消息转成事件投递给驱动器
pub async fn run_peer_listener(listener: TcpListener, driver: RaftDriver) {
    let local_addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_default();
    info!("Raft peer listener ready on {}", local_addr);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let driver = driver.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_peer_connection(stream, driver).await {
                        debug!("Peer connection from {} closed: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                warn!("Failed to accept peer connection: {}", e);
            }
        }
    }
}

async fn handle_peer_connection(
    mut stream: TcpStream,
    driver: RaftDriver,
) -> Result<(), String> {
    loop {
        let payload = read_frame(&mut stream).await.map_err(|e| e.to_string())?;
        let msg: PeerMessage = decode(&payload).map_err(|e| e.to_string())?;
        let event = peer_event(msg);

        if !driver.dispatch_event(event).is_ok() {
            debug!("Dropping inbound peer message (driver unavailable)");
        }
    }
}

fn peer_event(msg: PeerMessage) -> Event {
    let from = msg.from;
    match msg.payload {
        PeerPayload::VoteRequest(req) => Event::RequestVoteRequest(from, req),
        PeerPayload::VoteResponse(resp) => Event::RequestVoteResponse(from, resp),
        PeerPayload::AppendRequest(req) => Event::AppendEntriesRequest(from, req),
        PeerPayload::AppendResponse(resp) => Event::AppendEntriesResponse(from, resp),
    }
}
