use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::NodeId;

/// 集群成员配置。成员集在进程生命周期内固定（不支持动态变更）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub voters: HashSet<NodeId>,
}

impl ClusterConfig {
    pub fn empty() -> Self {
        Self {
            voters: HashSet::new(),
        }
    }

    pub fn simple(voters: HashSet<NodeId>) -> Self {
        Self { voters }
    }

    /// 多数派所需的最小节点数
    pub fn quorum(&self) -> usize {
        self.voters.len() / 2 + 1
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.voters.contains(id)
    }

    /// 给定的确认集合是否构成多数派
    pub fn majority(&self, acks: &HashSet<NodeId>) -> bool {
        acks.intersection(&self.voters).count() >= self.quorum()
    }

    /// 除自身之外的所有成员
    pub fn peers_of(&self, id: &NodeId) -> Vec<NodeId> {
        self.voters.iter().filter(|v| *v != id).cloned().collect()
    }
}
