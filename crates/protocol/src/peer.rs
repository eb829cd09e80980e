//! 节点间 Raft RPC 消息
//!
//! 发送方以显式的 `from` 字段标识自己，接收端据此构造事件。

use serde::{Deserialize, Serialize};

use raft::{
    AppendEntriesRequest, AppendEntriesResponse, NodeId, RequestVoteRequest, RequestVoteResponse,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeerPayload {
    VoteRequest(RequestVoteRequest),
    VoteResponse(RequestVoteResponse),
    AppendRequest(AppendEntriesRequest),
    AppendResponse(AppendEntriesResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerMessage {
    /// 发送方节点 ID
    pub from: NodeId,
    pub payload: PeerPayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use raft::RequestId;

    #[test]
    fn peer_message_roundtrip() {
        let msg = PeerMessage {
            from: "node1".to_string(),
            payload: PeerPayload::VoteRequest(RequestVoteRequest {
                term: 2,
                candidate_id: "node1".to_string(),
                last_log_index: 10,
                last_log_term: 1,
                request_id: RequestId::from(42u64),
            }),
        };

        let bytes = crate::encode(&msg).unwrap();
        let decoded: PeerMessage = crate::decode(&bytes).unwrap();
        assert_eq!(decoded.from, "node1");
        match decoded.payload {
            PeerPayload::VoteRequest(req) => {
                assert_eq!(req.term, 2);
                assert_eq!(req.last_log_index, 10);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
