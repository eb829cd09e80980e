//! 外部助手（会话式服务）的消息对。服务本身是黑盒，节点只做代理。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantQuery {
    pub prompt: String,
    /// 节点附带的系统状态摘要，便于助手回答场次/订单问题
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantReply {
    pub text: String,
}
