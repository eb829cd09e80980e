//! CineRaft 节点装配
//!
//! 将共识核心、订票状态机、对端传输与定时器接到一起，并提供
//! 提案接口与后台任务（目录播种、占座过期提议）。

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use bookingstore::{BookingCommand, BookingStore, CommandEnvelope, CommandOutcome};
use raft::{
    Applied, AppendEntriesRequest, AppendEntriesResponse, ApplyResult, ClientError, ClientResult,
    Command, Event, EventHandler, EventNotify, HardState, HardStateStorage, LogEntry,
    LogEntryStorage, Network, NodeId, RaftCallbacks, RaftDriver, RaftState, RaftStateOptions,
    RequestId, RequestVoteRequest, RequestVoteResponse, Role, RpcResult, StateMachine, Storage,
    StorageResult, TimerId, TimerService, Timers,
};

use crate::config::NodeConfig;
use crate::network::PeerTransport;
use crate::state_machine::TicketStateMachine;

/// 当前 unix 毫秒时间。只允许在提议侧调用（Leader 盖戳），
/// 应用路径必须使用信封里的 apply_time_ms。
pub fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// 节点对外可见的粗粒度状态
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub role: Role,
    pub term: u64,
    pub leader: Option<NodeId>,
}

type SharedStatus = Arc<RwLock<NodeStatus>>;

/// 聚合回调：把共识核心的外部依赖委托给各个实现
struct NodeCallbacks {
    node_id: NodeId,
    storage: Arc<dyn Storage>,
    network: PeerTransport,
    timers: Timers,
    state_machine: Arc<TicketStateMachine>,
    status: SharedStatus,
}

#[async_trait]
impl Network for NodeCallbacks {
    async fn send_request_vote_request(
        &self,
        target: &NodeId,
        args: RequestVoteRequest,
    ) -> RpcResult<()> {
        self.network.send_request_vote_request(target, args).await
    }

    async fn send_request_vote_response(
        &self,
        target: &NodeId,
        args: RequestVoteResponse,
    ) -> RpcResult<()> {
        self.network.send_request_vote_response(target, args).await
    }

    async fn send_append_entries_request(
        &self,
        target: &NodeId,
        args: AppendEntriesRequest,
    ) -> RpcResult<()> {
        self.network.send_append_entries_request(target, args).await
    }

    async fn send_append_entries_response(
        &self,
        target: &NodeId,
        args: AppendEntriesResponse,
    ) -> RpcResult<()> {
        self.network
            .send_append_entries_response(target, args)
            .await
    }
}

#[async_trait]
impl HardStateStorage for NodeCallbacks {
    async fn save_hard_state(&self, hard_state: HardState) -> StorageResult<()> {
        self.storage.save_hard_state(hard_state).await
    }

    async fn load_hard_state(&self) -> StorageResult<Option<HardState>> {
        self.storage.load_hard_state().await
    }
}

#[async_trait]
impl LogEntryStorage for NodeCallbacks {
    async fn append_log_entries(&self, entries: &[LogEntry]) -> StorageResult<()> {
        self.storage.append_log_entries(entries).await
    }

    async fn get_log_entries(&self, low: u64, high: u64) -> StorageResult<Vec<LogEntry>> {
        self.storage.get_log_entries(low, high).await
    }

    async fn truncate_log_suffix(&self, idx: u64) -> StorageResult<()> {
        self.storage.truncate_log_suffix(idx).await
    }

    async fn get_last_log_index(&self) -> StorageResult<(u64, u64)> {
        self.storage.get_last_log_index().await
    }

    async fn get_log_term(&self, idx: u64) -> StorageResult<u64> {
        self.storage.get_log_term(idx).await
    }
}

impl Storage for NodeCallbacks {}

impl TimerService for NodeCallbacks {
    fn del_timer(&self, timer_id: TimerId) {
        self.timers.del_timer(timer_id);
    }

    fn set_election_timer(&self, dur: Duration) -> TimerId {
        self.timers.add_timer(Event::ElectionTimeout, dur)
    }

    fn set_heartbeat_timer(&self, dur: Duration) -> TimerId {
        self.timers.add_timer(Event::HeartbeatTimeout, dur)
    }

    fn set_apply_timer(&self, dur: Duration) -> TimerId {
        self.timers.add_timer(Event::ApplyTimeout, dur)
    }
}

#[async_trait]
impl StateMachine for NodeCallbacks {
    async fn apply_command(&self, index: u64, term: u64, cmd: Command) -> ApplyResult<Vec<u8>> {
        self.state_machine.apply_command(index, term, cmd).await
    }

    async fn client_response(
        &self,
        request_id: RequestId,
        result: ClientResult<Applied>,
    ) -> ClientResult<()> {
        self.state_machine.client_response(request_id, result).await
    }
}

#[async_trait]
impl EventNotify for NodeCallbacks {
    async fn on_state_changed(&self, role: Role, term: u64, leader_hint: Option<NodeId>) {
        if role == Role::Leader {
            info!("Node {} became LEADER term={}", self.node_id, term);
        } else {
            debug!("Node {} is now {} at term {}", self.node_id, role, term);
        }
        let mut status = self.status.write();
        status.role = role;
        status.term = term;
        status.leader = leader_hint;
    }
}

impl RaftCallbacks for NodeCallbacks {}

/// 事件处理器：持有状态机互斥锁，保证事件串行处理
struct RaftEventHandler {
    state: tokio::sync::Mutex<RaftState>,
}

#[async_trait]
impl EventHandler for RaftEventHandler {
    async fn handle_event(&self, event: Event) {
        let mut state = self.state.lock().await;
        state.handle_event(event).await;
    }
}

pub struct NodeInner {
    pub config: NodeConfig,
    store: Arc<BookingStore>,
    state_machine: Arc<TicketStateMachine>,
    driver: RaftDriver,
    status: SharedStatus,
}

/// CineRaft 节点
#[derive(Clone)]
pub struct TicketNode {
    inner: Arc<NodeInner>,
}

impl Deref for TicketNode {
    type Target = NodeInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl TicketNode {
    pub async fn new(config: NodeConfig, storage: Arc<dyn Storage>) -> anyhow::Result<Self> {
        let store = Arc::new(BookingStore::new(config.apply_cache_size));
        let state_machine = Arc::new(TicketStateMachine::new(store.clone()));

        let driver = RaftDriver::new();
        let peer_addrs: HashMap<NodeId, std::net::SocketAddr> = config
            .peers
            .iter()
            .map(|p| (p.id.clone(), p.raft_addr))
            .collect();
        let network = PeerTransport::new(config.node_id.clone(), peer_addrs, config.rpc_deadline);

        let status: SharedStatus = Arc::new(RwLock::new(NodeStatus {
            role: Role::Follower,
            term: 0,
            leader: None,
        }));

        let callbacks = Arc::new(NodeCallbacks {
            node_id: config.node_id.clone(),
            storage,
            network,
            timers: driver.timer_service(),
            state_machine: state_machine.clone(),
            status: status.clone(),
        });

        let options = RaftStateOptions {
            id: config.node_id.clone(),
            peers: config.peer_ids(),
            election_timeout_min: config.election_timeout_min,
            election_timeout_max: config.election_timeout_max,
            heartbeat_interval: config.heartbeat_interval,
            append_inflight_timeout: config.rpc_deadline * 3,
            client_request_timeout: config.propose_timeout,
            ..Default::default()
        };

        let raft_state = RaftState::new(options, callbacks).await?;
        driver.register(Arc::new(RaftEventHandler {
            state: tokio::sync::Mutex::new(raft_state),
        }));

        Ok(Self {
            inner: Arc::new(NodeInner {
                config,
                store,
                state_machine,
                driver,
                status,
            }),
        })
    }

    /// 启动事件循环、初始选举定时器与后台任务
    pub fn start(&self) {
        let driver = self.driver.clone();
        tokio::spawn(async move {
            driver.main_loop().await;
        });

        // 初始选举定时器：在 [T_min, T_max] 内随机，避免同时发起选举
        let min_ms = self.config.election_timeout_min.as_millis() as u64;
        let max_ms = self.config.election_timeout_max.as_millis() as u64;
        let delay = Duration::from_millis(rand::rng().random_range(min_ms..=max_ms));
        self.driver
            .timer_service()
            .add_timer(Event::ElectionTimeout, delay);

        let node = self.clone();
        tokio::spawn(async move {
            run_housekeeping(node).await;
        });

        info!("Node {} started", self.config.node_id);
    }

    /// 提交一条命令并等待其提交且应用，返回日志索引与状态机结果
    pub async fn propose(
        &self,
        envelope: CommandEnvelope,
    ) -> Result<(u64, CommandOutcome), ClientError> {
        let request_id = RequestId::new();
        let rx = self.state_machine.register_waiter(request_id);

        let event = Event::ClientPropose {
            cmd: envelope.encode(),
            request_id,
            client_id: envelope.client_id.clone(),
            request_seq: envelope.request_seq,
        };
        if !self.driver.dispatch_event(event).is_ok() {
            self.state_machine.abandon_waiter(request_id);
            return Err(ClientError::ShuttingDown);
        }

        match timeout(self.config.propose_timeout, rx).await {
            Err(_) => {
                self.state_machine.abandon_waiter(request_id);
                Err(ClientError::Timeout)
            }
            Ok(Err(_)) => Err(ClientError::Internal(anyhow::anyhow!(
                "proposal waiter dropped"
            ))),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Ok(Ok(applied))) => {
                let outcome = CommandOutcome::decode(&applied.output)
                    .map_err(|e| ClientError::Internal(anyhow::anyhow!("{}", e)))?;
                Ok((applied.index, outcome))
            }
        }
    }

    pub fn store(&self) -> &Arc<BookingStore> {
        &self.store
    }

    pub fn last_applied(&self) -> u64 {
        self.state_machine.last_applied()
    }

    pub fn status(&self) -> NodeStatus {
        self.status.read().clone()
    }

    /// 某个节点的客户端地址（用于 NotLeader 提示）
    pub fn client_addr_of(&self, node_id: &NodeId) -> Option<String> {
        if node_id == &self.config.node_id {
            return Some(self.config.listen_addr.to_string());
        }
        self.config
            .peers
            .iter()
            .find(|p| &p.id == node_id)
            .map(|p| p.client_addr.to_string())
    }

    pub fn driver(&self) -> &RaftDriver {
        &self.driver
    }

    /// 协作式关闭：等待中的提案收到 ShuttingDown 后停止事件循环
    pub async fn shutdown(&self) {
        info!("Node {} shutting down", self.config.node_id);
        let _ = self.driver.dispatch_event(Event::Shutdown);
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.driver.stop();
    }
}

/// Leader 的后台职责：播种影片目录、定期提议占座过期回收。
/// 两者都走共识日志，副本因此在相同日志位置做出相同变更。
async fn run_housekeeping(node: TicketNode) {
    let ttl = node.config.seat_hold_ttl;
    let interval = std::cmp::max(Duration::from_millis(500), ttl / 4);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if node.driver.is_stopped() {
            break;
        }
        if node.status().role != Role::Leader {
            continue;
        }

        if !node.store().is_seeded() && !node.config.seed_movies.is_empty() {
            let envelope = CommandEnvelope {
                client_id: None,
                request_seq: 0,
                apply_time_ms: unix_ms(),
                command: BookingCommand::SeedMovies {
                    movies: node.config.seed_movies.clone(),
                },
            };
            match node.propose(envelope).await {
                Ok(_) => info!("Node {} seeded movie catalog", node.config.node_id),
                Err(e) => debug!("Seed proposal failed, will retry: {}", e),
            }
            continue;
        }

        let envelope = CommandEnvelope {
            client_id: None,
            request_seq: 0,
            apply_time_ms: unix_ms(),
            command: BookingCommand::ExpireHolds,
        };
        if let Err(e) = node.propose(envelope).await {
            // 失去领导权或关闭中都是正常情况
            debug!("ExpireHolds proposal failed: {}", e);
        }
    }
    warn!("Housekeeping task for {} exited", node.config.node_id);
}
