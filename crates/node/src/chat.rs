//! 外部助手服务代理
//!
//! 助手是黑盒：节点只负责带上下文转发 prompt 并在截止时间内等待回复。

use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::warn;

use ticket_protocol::{decode, encode, read_frame, write_frame, AssistantQuery, AssistantReply};

/// 助手问答的默认截止时间
const CHAT_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("assistant not configured")]
    NotConfigured,

    #[error("assistant unavailable: {0}")]
    Unavailable(String),

    #[error("assistant timeout")]
    Timeout,
}

#[derive(Clone)]
pub struct ChatClient {
    addr: Option<String>,
    deadline: Duration,
}

impl ChatClient {
    pub fn new(addr: Option<String>) -> Self {
        Self {
            addr,
            deadline: CHAT_DEADLINE,
        }
    }

    pub async fn chat(&self, prompt: String, context: String) -> Result<String, ChatError> {
        let addr = self.addr.as_ref().ok_or(ChatError::NotConfigured)?;

        let result = timeout(self.deadline, self.exchange(addr, prompt, context)).await;
        match result {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => {
                warn!("Assistant request failed: {}", e);
                Err(ChatError::Unavailable(e))
            }
            Err(_) => Err(ChatError::Timeout),
        }
    }

    async fn exchange(
        &self,
        addr: &str,
        prompt: String,
        context: String,
    ) -> Result<String, String> {
        let mut stream = TcpStream::connect(addr).await.map_err(|e| e.to_string())?;

        let query = AssistantQuery { prompt, context };
        let payload = encode(&query).map_err(|e| e.to_string())?;
        write_frame(&mut stream, &payload)
            .await
            .map_err(|e| e.to_string())?;

        let reply_bytes = read_frame(&mut stream).await.map_err(|e| e.to_string())?;
        let reply: AssistantReply = decode(&reply_bytes).map_err(|e| e.to_string())?;
        Ok(reply.text)
    }
}
