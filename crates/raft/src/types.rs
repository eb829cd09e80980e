use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

// 类型定义
pub type NodeId = String;
pub type ClientId = String;
pub type Command = Vec<u8>;
pub type TimerId = u64;

/// 请求ID类型（用于关联 RPC 响应与过滤超时响应）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        Self(rand::random::<u64>())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<RequestId> for u64 {
    fn from(val: RequestId) -> Self {
        val.0
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
