// test_cluster.rs
//
// 集成测试集群：共享一个 MockNetworkHub 的若干 TestNode。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use raft::mock::MockNetworkHub;
use raft::{ClientError, Event, NodeId, RequestId, Role};

use super::test_node::TestNode;
use super::test_statemachine::KvCommand;

pub struct TestCluster {
    pub hub: MockNetworkHub,
    pub nodes: HashMap<NodeId, TestNode>,
}

impl TestCluster {
    pub async fn new(ids: &[&str]) -> TestCluster {
        let hub = MockNetworkHub::new();
        let all: Vec<NodeId> = ids.iter().map(|s| s.to_string()).collect();

        let mut nodes = HashMap::new();
        for id in &all {
            let peers: Vec<NodeId> = all.iter().filter(|p| *p != id).cloned().collect();
            let node = TestNode::new(id.clone(), &hub, peers).await;
            nodes.insert(id.clone(), node);
        }

        TestCluster { hub, nodes }
    }

    pub fn start(&self) {
        for node in self.nodes.values() {
            node.start();
        }
    }

    pub fn node(&self, id: &str) -> &TestNode {
        self.nodes.get(id).expect("unknown node id")
    }

    /// 当前 Leader（存活节点中角色为 Leader 的）
    pub async fn leader(&self) -> Option<NodeId> {
        for (id, node) in &self.nodes {
            if node.driver.is_stopped() {
                continue;
            }
            if node.role().await == Role::Leader {
                return Some(id.clone());
            }
        }
        None
    }

    /// 轮询等待 Leader 出现
    pub async fn wait_for_leader(&self, timeout: Duration) -> NodeId {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(leader) = self.leader().await {
                return leader;
            }
            assert!(
                Instant::now() < deadline,
                "no leader elected within {:?}",
                timeout
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// 等待某个存活节点以外的新 Leader
    pub async fn wait_for_other_leader(&self, not: &NodeId, timeout: Duration) -> NodeId {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(leader) = self.leader().await {
                if &leader != not {
                    return leader;
                }
            }
            assert!(
                Instant::now() < deadline,
                "no new leader (other than {}) within {:?}",
                not,
                timeout
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// 向指定节点提交命令并等待应用完成
    pub async fn propose(
        &self,
        target: &NodeId,
        command: KvCommand,
        timeout: Duration,
    ) -> Result<u64, ClientError> {
        let node = self.node(target);
        let request_id = RequestId::new();
        let rx = node.state_machine.register_waiter(request_id);

        let event = Event::ClientPropose {
            cmd: command.encode(),
            request_id,
            client_id: Some("test-client".to_string()),
            request_seq: u64::from(request_id),
        };
        if !node.driver.dispatch_event(event).is_ok() {
            return Err(ClientError::ShuttingDown);
        }

        match tokio::time::timeout(timeout, rx).await {
            Err(_) => Err(ClientError::Timeout),
            Ok(Err(_)) => Err(ClientError::Internal(anyhow::anyhow!("waiter dropped"))),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Ok(Ok(applied))) => Ok(applied.index),
        }
    }

    /// 等待所有存活节点的状态机中 key 达到期望值
    pub async fn wait_for_value(
        &self,
        key: &str,
        expected: &str,
        timeout: Duration,
    ) -> Result<(), String> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut missing = Vec::new();
            for (id, node) in &self.nodes {
                if node.driver.is_stopped() {
                    continue;
                }
                if node.state_machine.get(key).as_deref() != Some(expected) {
                    missing.push(id.clone());
                }
            }
            if missing.is_empty() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(format!(
                    "key {}={} not replicated to {:?} within {:?}",
                    key, expected, missing, timeout
                ));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// 断言日志匹配性质：任意两个节点在相同 index 上的条目一致
    pub async fn assert_logs_match(&self) {
        let snapshots: Vec<(NodeId, Vec<raft::LogEntry>)> = {
            let mut v = Vec::new();
            for (id, node) in &self.nodes {
                v.push((id.clone(), node.storage.log_snapshot()));
            }
            v
        };

        for (a_id, a_log) in &snapshots {
            for (b_id, b_log) in &snapshots {
                let common = std::cmp::min(a_log.len(), b_log.len());
                for i in 0..common {
                    assert_eq!(
                        (a_log[i].term, &a_log[i].command),
                        (b_log[i].term, &b_log[i].command),
                        "log mismatch at index {} between {} and {}",
                        i + 1,
                        a_id,
                        b_id
                    );
                }
            }
        }
    }

    pub fn stop_all(&self) {
        for node in self.nodes.values() {
            node.stop();
        }
    }
}
