//! 订票状态机与共识核心的桥接
//!
//! 将已提交日志解码为订票命令应用到存储，并把提案结果回送给等待中的
//! 客户端请求（oneshot 等待者按 request_id 注册）。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use bookingstore::{BookingStore, CommandEnvelope};
use raft::{Applied, ApplyError, ApplyResult, ClientResult, Command, RequestId, StateMachine};

pub struct TicketStateMachine {
    store: Arc<BookingStore>,
    /// 本副本已应用到的最高日志索引（供读接口返回）
    last_applied: AtomicU64,
    /// 等待提案结果的客户端（仅 Leader 侧有等待者）
    pending: Mutex<HashMap<RequestId, oneshot::Sender<ClientResult<Applied>>>>,
}

impl TicketStateMachine {
    pub fn new(store: Arc<BookingStore>) -> Self {
        Self {
            store,
            last_applied: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<BookingStore> {
        &self.store
    }

    pub fn last_applied(&self) -> u64 {
        self.last_applied.load(Ordering::Acquire)
    }

    /// 注册一个提案等待者，结果经 `client_response` 回送
    pub fn register_waiter(
        &self,
        request_id: RequestId,
    ) -> oneshot::Receiver<ClientResult<Applied>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);
        rx
    }

    /// 放弃等待（调用方超时后清理，避免悬挂的发送端堆积）
    pub fn abandon_waiter(&self, request_id: RequestId) {
        self.pending.lock().remove(&request_id);
    }
}

#[async_trait]
impl StateMachine for TicketStateMachine {
    async fn apply_command(&self, index: u64, term: u64, cmd: Command) -> ApplyResult<Vec<u8>> {
        let envelope = CommandEnvelope::decode(&cmd)
            .map_err(|e| ApplyError::Internal(format!("index {}: {}", index, e)))?;

        debug!(
            "Applying {:?} at index {} (term {})",
            discriminant_name(&envelope),
            index,
            term
        );
        let outcome = self.store.apply(&envelope);
        self.last_applied.store(index, Ordering::Release);
        Ok(outcome.encode())
    }

    async fn client_response(
        &self,
        request_id: RequestId,
        result: ClientResult<Applied>,
    ) -> ClientResult<()> {
        let waiter = self.pending.lock().remove(&request_id);
        match waiter {
            Some(tx) => {
                if tx.send(result).is_err() {
                    debug!("Waiter for request {} already gone", request_id);
                }
            }
            None => {
                // Follower 应用日志、内部命令或已超时放弃的请求都没有等待者
                debug!("No waiter registered for request {}", request_id);
            }
        }
        Ok(())
    }
}

fn discriminant_name(envelope: &CommandEnvelope) -> &'static str {
    use bookingstore::BookingCommand::*;
    match envelope.command {
        SeedMovies { .. } => "SeedMovies",
        HoldSeats { .. } => "HoldSeats",
        ConfirmPayment { .. } => "ConfirmPayment",
        CancelBooking { .. } => "CancelBooking",
        ExpireHolds => "ExpireHolds",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookingstore::{BookingCommand, Movie};

    fn envelope(cmd: BookingCommand) -> CommandEnvelope {
        CommandEnvelope {
            client_id: None,
            request_seq: 0,
            apply_time_ms: 1_000,
            command: cmd,
        }
    }

    #[tokio::test]
    async fn apply_updates_last_applied() {
        let sm = TicketStateMachine::new(Arc::new(BookingStore::default()));
        let cmd = envelope(BookingCommand::SeedMovies {
            movies: vec![Movie {
                id: "m1".to_string(),
                title: "A".to_string(),
                total_seats: 2,
                price_cents: 1000,
                showtime: "tonight".to_string(),
            }],
        })
        .encode();

        sm.apply_command(1, 1, cmd).await.unwrap();
        assert_eq!(sm.last_applied(), 1);
        assert!(sm.store().is_seeded());
    }

    #[tokio::test]
    async fn undecodable_command_is_apply_error() {
        let sm = TicketStateMachine::new(Arc::new(BookingStore::default()));
        let result = sm.apply_command(1, 1, b"garbage".to_vec()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn waiter_receives_response() {
        let sm = TicketStateMachine::new(Arc::new(BookingStore::default()));
        let request_id = RequestId::new();
        let rx = sm.register_waiter(request_id);

        sm.client_response(
            request_id,
            Ok(Applied {
                index: 3,
                output: vec![1, 2],
            }),
        )
        .await
        .unwrap();

        let applied = rx.await.unwrap().unwrap();
        assert_eq!(applied.index, 3);
    }
}
