//! 节点间与客户端的线协议
//!
//! 统一的帧格式：u32 大端长度前缀 + bincode 负载。三套消息集：
//! 节点间 Raft RPC（[`peer`]）、客户端 RPC（[`client`]）与外部助手
//! 服务（[`assistant`]）。

mod assistant;
mod client;
mod frame;
mod peer;

pub use assistant::{AssistantQuery, AssistantReply};
pub use client::{ClientRequest, ClientResponse, ErrorCode};
pub use frame::{read_frame, write_frame, ProtocolError, MAX_FRAME_SIZE};
pub use peer::{PeerMessage, PeerPayload};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// 编码一条消息为帧负载
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serialize(msg).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// 从帧负载解码一条消息
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    bincode::deserialize(data).map_err(|e| ProtocolError::Decode(e.to_string()))
}
