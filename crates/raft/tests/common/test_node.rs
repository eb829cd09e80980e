// test_node.rs
//
// 集成测试节点：MemoryStorage + MockNodeNetwork + RaftDriver 组装的
// 单个 Raft 节点。

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use raft::mock::{MemoryStorage, MockNetworkHub, MockNodeNetwork, NetworkEvent};
use raft::{
    Applied, AppendEntriesRequest, AppendEntriesResponse, ApplyResult, ClientResult, Command,
    Event, EventHandler, EventNotify, HardState, HardStateStorage, LogEntry, LogEntryStorage,
    Network, NodeId, RaftCallbacks, RaftDriver, RaftState, RaftStateOptions, RequestId,
    RequestVoteRequest, RequestVoteResponse, Role, RpcResult, StateMachine, Storage,
    StorageResult, TimerId, TimerService, Timers,
};

use super::test_statemachine::TestStateMachine;

struct TestCallbacks {
    storage: Arc<MemoryStorage>,
    network: MockNodeNetwork,
    timers: Timers,
    state_machine: Arc<TestStateMachine>,
}

#[async_trait]
impl Network for TestCallbacks {
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
impl HardStateStorage for TestCallbacks {
    async fn save_hard_state(&self, hard_state: HardState) -> StorageResult<()> {
        self.storage.save_hard_state(hard_state).await
    }

    async fn load_hard_state(&self) -> StorageResult<Option<HardState>> {
        self.storage.load_hard_state().await
    }
}

#[async_trait]
impl LogEntryStorage for TestCallbacks {
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

impl Storage for TestCallbacks {}

impl TimerService for TestCallbacks {
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
impl StateMachine for TestCallbacks {
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
impl EventNotify for TestCallbacks {
    async fn on_state_changed(&self, _role: Role, _term: u64, _leader: Option<NodeId>) {}
}

impl RaftCallbacks for TestCallbacks {}

struct TestEventHandler {
    state: Arc<tokio::sync::Mutex<RaftState>>,
}

#[async_trait]
impl EventHandler for TestEventHandler {
    async fn handle_event(&self, event: Event) {
        let mut state = self.state.lock().await;
        state.handle_event(event).await;
    }
}

pub struct TestNodeInner {
    pub id: NodeId,
    pub driver: RaftDriver,
    pub storage: Arc<MemoryStorage>,
    pub state_machine: Arc<TestStateMachine>,
    pub raft_state: Arc<tokio::sync::Mutex<RaftState>>,
}

#[derive(Clone)]
pub struct TestNode {
    inner: Arc<TestNodeInner>,
}

impl Deref for TestNode {
    type Target = TestNodeInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl TestNode {
    pub async fn new(id: NodeId, hub: &MockNetworkHub, peers: Vec<NodeId>) -> TestNode {
        let driver = RaftDriver::new();
        let storage = Arc::new(MemoryStorage::new());
        let state_machine = TestStateMachine::new(id.clone());

        // 入站消息直接转成事件投递给本节点的驱动器
        let dispatch_driver = driver.clone();
        let network = hub.register_node(id.clone(), move |event| {
            let event = match event {
                NetworkEvent::RequestVoteRequest(from, req) => {
                    Event::RequestVoteRequest(from, req)
                }
                NetworkEvent::RequestVoteResponse(from, resp) => {
                    Event::RequestVoteResponse(from, resp)
                }
                NetworkEvent::AppendEntriesRequest(from, req) => {
                    Event::AppendEntriesRequest(from, req)
                }
                NetworkEvent::AppendEntriesResponse(from, resp) => {
                    Event::AppendEntriesResponse(from, resp)
                }
            };
            let _ = dispatch_driver.dispatch_event(event);
        });

        let callbacks = Arc::new(TestCallbacks {
            storage: storage.clone(),
            network,
            timers: driver.timer_service(),
            state_machine: state_machine.clone(),
        });

        let options = RaftStateOptions {
            id: id.clone(),
            peers,
            election_timeout_min: Duration::from_millis(150),
            election_timeout_max: Duration::from_millis(300),
            heartbeat_interval: Duration::from_millis(50),
            append_inflight_timeout: Duration::from_millis(200),
            client_request_timeout: Duration::from_secs(5),
            ..Default::default()
        };

        let raft_state = RaftState::new(options, callbacks)
            .await
            .expect("memory storage never fails to restore");
        let raft_state = Arc::new(tokio::sync::Mutex::new(raft_state));

        driver.register(Arc::new(TestEventHandler {
            state: raft_state.clone(),
        }));

        TestNode {
            inner: Arc::new(TestNodeInner {
                id,
                driver,
                storage,
                state_machine,
                raft_state,
            }),
        }
    }

    /// 启动事件循环并播种初始选举定时器
    pub fn start(&self) {
        let driver = self.driver.clone();
        tokio::spawn(async move {
            driver.main_loop().await;
        });

        let delay = Duration::from_millis(rand::rng().random_range(150..=300));
        self.driver
            .timer_service()
            .add_timer(Event::ElectionTimeout, delay);
    }

    pub fn stop(&self) {
        self.driver.stop();
    }

    pub async fn role(&self) -> Role {
        self.raft_state.lock().await.get_role()
    }

    pub async fn current_term(&self) -> u64 {
        self.raft_state.lock().await.get_current_term()
    }

    pub async fn commit_index(&self) -> u64 {
        self.raft_state.lock().await.get_commit_index()
    }
}
