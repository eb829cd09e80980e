use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{ClientId, Command, NodeId, RequestId};

// === 核心状态与日志 ===

/// 日志条目。index 从 1 开始且严格连续；index 0 是哨兵（term 0）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: u64,
    pub index: u64,
    pub command: Command,
    /// 发起该命令的客户端（None 表示内部命令，如周期性过期）
    pub client_id: Option<ClientId>,
    /// 客户端请求序号，与 client_id 一起构成幂等键
    pub request_seq: u64,
}

impl LogEntry {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| {
            warn!("Failed to deserialize log entry: {}", e);
            e.into()
        })
    }
}

/// 需要在响应发出前落盘的持久化状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardState {
    pub term: u64,
    pub voted_for: Option<NodeId>,
}

// === 节点间 RPC 消息 ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteRequest {
    pub term: u64,
    pub candidate_id: NodeId,
    pub last_log_index: u64,
    pub last_log_term: u64,
    pub request_id: RequestId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    pub term: u64,
    pub vote_granted: bool,
    pub request_id: RequestId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: u64,
    pub leader_id: NodeId,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<LogEntry>,
    pub leader_commit: u64,
    pub request_id: RequestId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: u64,
    pub success: bool,
    /// 冲突任期的第一个索引（缺失时为 last_index + 1），用于加速回退
    pub conflict_index: Option<u64>,
    pub request_id: RequestId,
}

/// 提案在应用后的结果：日志索引与状态机输出
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub index: u64,
    pub output: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entry_roundtrip_is_bit_identical() {
        let entry = LogEntry {
            term: 3,
            index: 17,
            command: b"hold seats".to_vec(),
            client_id: Some("c1".to_string()),
            request_seq: 7,
        };

        let bytes = entry.serialize().unwrap();
        let decoded = LogEntry::deserialize(&bytes).unwrap();
        assert_eq!(decoded, entry);

        // serialize -> deserialize -> serialize 必须逐位一致
        let bytes_again = decoded.serialize().unwrap();
        assert_eq!(bytes, bytes_again);
    }

    #[test]
    fn internal_entry_has_no_client() {
        let entry = LogEntry {
            term: 1,
            index: 1,
            command: vec![],
            client_id: None,
            request_seq: 0,
        };
        let decoded = LogEntry::deserialize(&entry.serialize().unwrap()).unwrap();
        assert!(decoded.client_id.is_none());
    }
}
