use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ApplyError, ClientError, RaftError, RpcError, StorageError, TimerError};
use crate::event::Role;
use crate::message::{
    AppendEntriesRequest, AppendEntriesResponse, Applied, HardState, LogEntry, RequestVoteRequest,
    RequestVoteResponse,
};
use crate::types::{Command, NodeId, RequestId, TimerId};

// 结果类型别名
pub type RaftResult<T> = Result<T, RaftError>;
pub type RpcResult<T> = Result<T, RpcError>;
pub type StorageResult<T> = Result<T, StorageError>;
pub type TimerResult<T> = Result<T, TimerError>;
pub type ClientResult<T> = Result<T, ClientError>;
pub type ApplyResult<T> = Result<T, ApplyError>;

/// 节点间网络发送回调。
///
/// 实现必须是入队即返回：任何一次调用都不允许在持有节点状态锁的情况下
/// 阻塞等待远端。发送失败通过返回值上报，由调用方决定重试策略。
#[async_trait]
pub trait Network: Send + Sync {
    async fn send_request_vote_request(
        &self,
        target: &NodeId,
        args: RequestVoteRequest,
    ) -> RpcResult<()>;

    async fn send_request_vote_response(
        &self,
        target: &NodeId,
        args: RequestVoteResponse,
    ) -> RpcResult<()>;

    async fn send_append_entries_request(
        &self,
        target: &NodeId,
        args: AppendEntriesRequest,
    ) -> RpcResult<()>;

    async fn send_append_entries_response(
        &self,
        target: &NodeId,
        args: AppendEntriesResponse,
    ) -> RpcResult<()>;
}

/// 持久化 HardState（term + votedFor）。任何依赖它的响应发出前必须已落盘。
#[async_trait]
pub trait HardStateStorage: Send + Sync {
    async fn save_hard_state(&self, hard_state: HardState) -> StorageResult<()>;
    async fn load_hard_state(&self) -> StorageResult<Option<HardState>>;
}

/// 追加式日志存储。
///
/// - `append_log_entries`: 追加日志条目（index 必须与现有日志连续）
/// - `get_log_entries`: 读取 [low, high) 范围的日志
/// - `truncate_log_suffix`: 删除所有 index >= idx 的条目
/// - `get_last_log_index`: 返回 (last_index, last_term)；空日志为 (0, 0)
/// - `get_log_term`: 返回指定 index 的任期；index 0 返回 0
#[async_trait]
pub trait LogEntryStorage: Send + Sync {
    async fn append_log_entries(&self, entries: &[LogEntry]) -> StorageResult<()>;

    async fn get_log_entries(&self, low: u64, high: u64) -> StorageResult<Vec<LogEntry>>;

    async fn truncate_log_suffix(&self, idx: u64) -> StorageResult<()>;

    async fn get_last_log_index(&self) -> StorageResult<(u64, u64)>;

    async fn get_log_term(&self, idx: u64) -> StorageResult<u64>;
}

#[async_trait]
pub trait Storage: HardStateStorage + LogEntryStorage + Send + Sync {}

/// 定时器服务：由事件循环实现，到期后投递对应事件
pub trait TimerService: Send + Sync {
    fn del_timer(&self, timer_id: TimerId);
    fn set_election_timer(&self, dur: Duration) -> TimerId;
    fn set_heartbeat_timer(&self, dur: Duration) -> TimerId;
    fn set_apply_timer(&self, dur: Duration) -> TimerId;
}

/// 应用状态机回调
#[async_trait]
pub trait StateMachine: Send + Sync {
    /// 将已提交命令按 index 顺序应用到状态机，返回序列化后的执行结果。
    /// 必须是确定性的：不读本地时钟，不依赖调度顺序。
    async fn apply_command(&self, index: u64, term: u64, cmd: Command) -> ApplyResult<Vec<u8>>;

    /// 客户端提案的最终结果回调（提交并应用成功，或失败原因）
    async fn client_response(
        &self,
        request_id: RequestId,
        result: ClientResult<Applied>,
    ) -> ClientResult<()>;
}

/// 状态变更通知回调
#[async_trait]
pub trait EventNotify: Send + Sync {
    async fn on_state_changed(&self, role: Role, term: u64, leader_hint: Option<NodeId>);
}

#[async_trait]
pub trait RaftCallbacks:
    StateMachine + Network + Storage + TimerService + EventNotify + Send + Sync
{
}
