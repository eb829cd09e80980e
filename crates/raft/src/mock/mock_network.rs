//! 进程内模拟网络（测试用）
//!
//! 节点注册一个 dispatch 回调；消息直接投递到目标节点的回调。
//! 链路可以按方向切断以模拟网络分区。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::RpcError;
use crate::message::{
    AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest, RequestVoteResponse,
};
use crate::traits::{Network, RpcResult};
use crate::types::NodeId;

/// 投递给目标节点的网络事件，第一个字段为发送方
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    RequestVoteRequest(NodeId, RequestVoteRequest),
    RequestVoteResponse(NodeId, RequestVoteResponse),
    AppendEntriesRequest(NodeId, AppendEntriesRequest),
    AppendEntriesResponse(NodeId, AppendEntriesResponse),
}

type Dispatch = Arc<dyn Fn(NetworkEvent) + Send + Sync>;

#[derive(Default)]
struct HubInner {
    nodes: Mutex<HashMap<NodeId, Dispatch>>,
    /// 单向切断的链路 (from, to)
    blocked: Mutex<HashSet<(NodeId, NodeId)>>,
}

/// 模拟网络中枢
#[derive(Clone, Default)]
pub struct MockNetworkHub {
    inner: Arc<HubInner>,
}

impl MockNetworkHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册节点并返回其网络句柄
    pub fn register_node<F>(&self, id: NodeId, dispatch: F) -> MockNodeNetwork
    where
        F: Fn(NetworkEvent) + Send + Sync + 'static,
    {
        self.inner
            .nodes
            .lock()
            .insert(id.clone(), Arc::new(dispatch));
        MockNodeNetwork {
            hub: self.clone(),
            id,
        }
    }

    /// 切断 from -> to 的单向链路
    pub fn block_link(&self, from: &NodeId, to: &NodeId) {
        self.inner
            .blocked
            .lock()
            .insert((from.clone(), to.clone()));
    }

    /// 将某个节点与其他所有节点双向隔离
    pub fn isolate(&self, node: &NodeId) {
        let peers: Vec<NodeId> = self.inner.nodes.lock().keys().cloned().collect();
        let mut blocked = self.inner.blocked.lock();
        for peer in peers {
            if &peer != node {
                blocked.insert((node.clone(), peer.clone()));
                blocked.insert((peer, node.clone()));
            }
        }
    }

    /// 恢复某个节点的全部链路
    pub fn heal(&self, node: &NodeId) {
        self.inner
            .blocked
            .lock()
            .retain(|(from, to)| from != node && to != node);
    }

    /// 恢复所有链路
    pub fn heal_all(&self) {
        self.inner.blocked.lock().clear();
    }

    fn deliver(&self, from: &NodeId, to: &NodeId, event: NetworkEvent) -> RpcResult<()> {
        if self
            .inner
            .blocked
            .lock()
            .contains(&(from.clone(), to.clone()))
        {
            debug!("Dropping message {} -> {} (link blocked)", from, to);
            return Err(RpcError::Network(format!(
                "link {} -> {} blocked",
                from, to
            )));
        }

        let dispatch = self
            .inner
            .nodes
            .lock()
            .get(to)
            .cloned()
            .ok_or_else(|| RpcError::NodeNotFound(to.clone()))?;

        dispatch(event);
        Ok(())
    }
}

/// 单个节点的网络句柄
#[derive(Clone)]
pub struct MockNodeNetwork {
    hub: MockNetworkHub,
    id: NodeId,
}

#[async_trait]
impl Network for MockNodeNetwork {
    async fn send_request_vote_request(
        &self,
        target: &NodeId,
        args: RequestVoteRequest,
    ) -> RpcResult<()> {
        self.hub
            .deliver(&self.id, target, NetworkEvent::RequestVoteRequest(self.id.clone(), args))
    }

    async fn send_request_vote_response(
        &self,
        target: &NodeId,
        args: RequestVoteResponse,
    ) -> RpcResult<()> {
        self.hub.deliver(
            &self.id,
            target,
            NetworkEvent::RequestVoteResponse(self.id.clone(), args),
        )
    }

    async fn send_append_entries_request(
        &self,
        target: &NodeId,
        args: AppendEntriesRequest,
    ) -> RpcResult<()> {
        self.hub.deliver(
            &self.id,
            target,
            NetworkEvent::AppendEntriesRequest(self.id.clone(), args),
        )
    }

    async fn send_append_entries_response(
        &self,
        target: &NodeId,
        args: AppendEntriesResponse,
    ) -> RpcResult<()> {
        self.hub.deliver(
            &self.id,
            target,
            NetworkEvent::AppendEntriesResponse(self.id.clone(), args),
        )
    }
}
