use thiserror::Error;
use tracing::{error, info, warn};

use crate::types::{NodeId, RequestId, TimerId};

/// 顶层 Raft 错误类型
#[derive(Debug, Error)]
pub enum RaftError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),
}

/// RPC 通信相关错误
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Target node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Network error: {0}")]
    Network(String),

    #[error("RPC timeout")]
    Timeout,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// 存储相关错误
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Log entry at index {0} not found")]
    LogNotFound(u64),

    #[error("Corrupted data: {0}")]
    Corruption(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// 定时器相关错误
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("Timer {0} not found")]
    NotFound(TimerId),

    #[error("Timer service unavailable")]
    ServiceUnavailable,
}

/// 客户端请求相关错误
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request {0} not found")]
    RequestNotFound(RequestId),

    #[error("Not leader (current leader: {0:?})")]
    NotLeader(Option<NodeId>),

    #[error("Leadership lost before commit")]
    LeadershipLost,

    #[error("Request timeout")]
    Timeout,

    #[error("Node is shutting down")]
    ShuttingDown,

    #[error("Request conflicted: {0}")]
    Conflict(anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(anyhow::Error),
}

/// 状态机应用相关错误
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Command at index {0} already applied")]
    AlreadyApplied(u64),

    #[error("State machine error: {0}")]
    Internal(String),
}

// === 统一错误处理机制 ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Fatal,       // 需要终止当前操作并进入只读模式
    Recoverable, // 可以在下一个调度周期重试的错误
    Ignorable,   // 仅需记录日志的错误
}

pub trait ErrorClass {
    fn severity(&self) -> ErrorSeverity;
    fn context(&self) -> String;
}

impl ErrorClass for RpcError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            RpcError::NodeNotFound(_) => ErrorSeverity::Recoverable,
            RpcError::Network(_) => ErrorSeverity::Recoverable,
            RpcError::Timeout => ErrorSeverity::Recoverable,
            RpcError::Serialization(_) => ErrorSeverity::Fatal,
        }
    }

    fn context(&self) -> String {
        self.to_string()
    }
}

impl ErrorClass for StorageError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            StorageError::Io(_) => ErrorSeverity::Fatal,
            StorageError::LogNotFound(_) => ErrorSeverity::Recoverable,
            StorageError::Corruption(_) => ErrorSeverity::Fatal,
            StorageError::Encoding(_) => ErrorSeverity::Fatal,
        }
    }

    fn context(&self) -> String {
        self.to_string()
    }
}

impl ErrorClass for ClientError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            ClientError::RequestNotFound(_) => ErrorSeverity::Ignorable,
            ClientError::NotLeader(_) => ErrorSeverity::Ignorable,
            ClientError::LeadershipLost => ErrorSeverity::Ignorable,
            ClientError::Timeout => ErrorSeverity::Recoverable,
            ClientError::ShuttingDown => ErrorSeverity::Ignorable,
            ClientError::Conflict(_) => ErrorSeverity::Ignorable,
            ClientError::Internal(_) => ErrorSeverity::Recoverable,
        }
    }

    fn context(&self) -> String {
        self.to_string()
    }
}

impl ErrorClass for TimerError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            TimerError::NotFound(_) => ErrorSeverity::Ignorable,
            TimerError::ServiceUnavailable => ErrorSeverity::Recoverable,
        }
    }

    fn context(&self) -> String {
        self.to_string()
    }
}

impl ErrorClass for ApplyError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            ApplyError::AlreadyApplied(_) => ErrorSeverity::Ignorable,
            ApplyError::Internal(_) => ErrorSeverity::Recoverable,
        }
    }

    fn context(&self) -> String {
        self.to_string()
    }
}

/// 回调错误的统一处理器：按严重程度分级处理，Fatal 时进入只读模式
pub struct CallbackErrorHandler {
    node_id: NodeId,
    readonly_mode: bool,
}

impl CallbackErrorHandler {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            readonly_mode: false,
        }
    }

    /// 统一处理回调错误
    pub fn handle<T, E: ErrorClass>(
        &mut self,
        result: Result<T, E>,
        operation: &str,
        target: Option<&NodeId>,
    ) -> Option<T> {
        match result {
            Ok(val) => Some(val),
            Err(e) => {
                let ctx = if let Some(t) = target {
                    format!("{} from {} to {}", operation, self.node_id, t)
                } else {
                    format!("{} on {}", operation, self.node_id)
                };

                match e.severity() {
                    ErrorSeverity::Fatal => {
                        error!(
                            "[FATAL] {} failed: {} - Entering readonly mode",
                            ctx,
                            e.context()
                        );
                        self.enter_readonly_mode();
                        None
                    }
                    ErrorSeverity::Recoverable => {
                        warn!("[RECOVERABLE] {} failed: {} - Will retry", ctx, e.context());
                        None
                    }
                    ErrorSeverity::Ignorable => {
                        info!("[IGNORABLE] {} failed: {}", ctx, e.context());
                        None
                    }
                }
            }
        }
    }

    /// 处理不需要返回值的操作
    pub fn handle_void<E: ErrorClass>(
        &mut self,
        result: Result<(), E>,
        operation: &str,
        target: Option<&NodeId>,
    ) -> bool {
        self.handle(result, operation, target).is_some()
    }

    fn enter_readonly_mode(&mut self) {
        if !self.readonly_mode {
            error!(
                "Node {} entering readonly mode due to critical failure",
                self.node_id
            );
            self.readonly_mode = true;
        }
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly_mode
    }
}
