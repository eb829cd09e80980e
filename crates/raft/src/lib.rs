//! 基于 Raft 的共识核心
//!
//! 事件驱动的单组实现：所有输入通过 [`Event`] 进入 [`RaftState`]，
//! 外部依赖（网络、存储、定时器、状态机）以 [`RaftCallbacks`] 注入。

pub mod cluster;
pub mod driver;
pub mod error;
pub mod event;
pub mod message;
pub mod mock;
pub mod state;
pub mod storage;
pub mod traits;
pub mod types;

pub use cluster::ClusterConfig;
pub use driver::{EventHandler, RaftDriver, SendEventResult, Timers};
pub use error::{
    ApplyError, CallbackErrorHandler, ClientError, ErrorSeverity, RaftError, RpcError,
    StorageError, TimerError,
};
pub use event::{Event, Role};
pub use message::{
    Applied, AppendEntriesRequest, AppendEntriesResponse, HardState, LogEntry, RequestVoteRequest,
    RequestVoteResponse,
};
pub use state::{RaftState, RaftStateOptions};
pub use storage::{FileStorage, FileStorageOptions};
pub use traits::{
    ApplyResult, ClientResult, EventNotify, HardStateStorage, LogEntryStorage, Network,
    RaftCallbacks, RaftResult, RpcResult, StateMachine, Storage, StorageResult, TimerResult,
    TimerService,
};
pub use types::{ClientId, Command, NodeId, RequestId, TimerId};
