// test_statemachine.rs
//
// 集成测试用的简单 KV 状态机：记录应用历史，便于断言副本一致性。

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use raft::{
    Applied, ApplyError, ApplyResult, ClientResult, Command, NodeId, RequestId, StateMachine,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KvCommand {
    Set { key: String, value: String },
}

impl KvCommand {
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap()
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        bincode::deserialize(data).ok()
    }
}

pub struct TestStateMachine {
    pub id: NodeId,
    data: Mutex<BTreeMap<String, String>>,
    /// (index, command) 应用历史，用于日志匹配断言
    applied_log: Mutex<Vec<(u64, KvCommand)>>,
    last_applied: AtomicU64,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<ClientResult<Applied>>>>,
}

impl TestStateMachine {
    pub fn new(id: NodeId) -> Arc<Self> {
        Arc::new(Self {
            id,
            data: Mutex::new(BTreeMap::new()),
            applied_log: Mutex::new(Vec::new()),
            last_applied: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.data.lock().get(key).cloned()
    }

    pub fn data_snapshot(&self) -> BTreeMap<String, String> {
        self.data.lock().clone()
    }

    pub fn applied_history(&self) -> Vec<(u64, KvCommand)> {
        self.applied_log.lock().clone()
    }

    pub fn last_applied(&self) -> u64 {
        self.last_applied.load(Ordering::Acquire)
    }

    pub fn register_waiter(
        &self,
        request_id: RequestId,
    ) -> oneshot::Receiver<ClientResult<Applied>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);
        rx
    }
}

#[async_trait]
impl StateMachine for TestStateMachine {
    async fn apply_command(&self, index: u64, _term: u64, cmd: Command) -> ApplyResult<Vec<u8>> {
        let command = KvCommand::decode(&cmd)
            .ok_or_else(|| ApplyError::Internal(format!("bad command at index {}", index)))?;

        match &command {
            KvCommand::Set { key, value } => {
                self.data.lock().insert(key.clone(), value.clone());
            }
        }
        self.applied_log.lock().push((index, command));
        self.last_applied.store(index, Ordering::Release);
        Ok(vec![])
    }

    async fn client_response(
        &self,
        request_id: RequestId,
        result: ClientResult<Applied>,
    ) -> ClientResult<()> {
        if let Some(tx) = self.pending.lock().remove(&request_id) {
            let _ = tx.send(result);
        }
        Ok(())
    }
}
