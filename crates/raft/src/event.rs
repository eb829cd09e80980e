use std::fmt::{self, Display};

use crate::message::{
    AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest, RequestVoteResponse,
};
use crate::types::{Command, NodeId, RequestId};

/// Raft 事件定义（输入）
#[derive(Debug, Clone)]
pub enum Event {
    // 定时器事件
    /// 选举超时（Follower/Candidate 触发）
    ElectionTimeout,
    /// 心跳超时（Leader 触发日志同步）
    HeartbeatTimeout,
    /// 定期将已提交日志应用到状态机
    ApplyTimeout,

    // RPC 请求事件（来自其他节点，第一个参数为发送方）
    RequestVoteRequest(NodeId, RequestVoteRequest),
    AppendEntriesRequest(NodeId, AppendEntriesRequest),

    // RPC 响应事件（其他节点对本节点请求的回复）
    RequestVoteResponse(NodeId, RequestVoteResponse),
    AppendEntriesResponse(NodeId, AppendEntriesResponse),

    // 客户端事件
    ClientPropose {
        cmd: Command,
        request_id: RequestId,
        client_id: Option<crate::types::ClientId>,
        request_seq: u64,
    },

    // 协作式关闭：拒绝后续提案并让所有等待者收到 ShuttingDown
    Shutdown,
}

/// Raft 节点角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Follower => write!(f, "Follower"),
            Role::Candidate => write!(f, "Candidate"),
            Role::Leader => write!(f, "Leader"),
        }
    }
}
