//! Raft State Machine Module
//!
//! This module contains the core `RaftState` struct and its implementation,
//! split across multiple files for maintainability:
//!
//! - `mod.rs` - State struct definition and options
//! - `election.rs` - Election handling
//! - `replication.rs` - Log replication and commit advancement
//! - `client.rs` - Client request handling and log application

mod client;
mod election;
mod replication;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{error, info};

use crate::cluster::ClusterConfig;
use crate::error::{CallbackErrorHandler, RaftError};
use crate::event::{Event, Role};
use crate::message::HardState;
use crate::traits::RaftCallbacks;
use crate::types::{NodeId, RequestId, TimerId};

/// Raft 状态机配置选项
#[derive(Debug, Clone)]
pub struct RaftStateOptions {
    pub id: NodeId,
    pub peers: Vec<NodeId>,
    pub election_timeout_min: Duration,
    pub election_timeout_max: Duration,
    pub heartbeat_interval: Duration,
    /// 日志应用到状态机的间隔
    pub apply_interval: Duration,
    /// 每次应用到状态机的日志条数上限
    pub apply_batch_size: u64,
    /// 单次 AppendEntries 携带的日志条数上限
    pub max_entries_per_append: u64,
    /// 在途 AppendEntries 的过期时间（超过后允许重发同一段日志）
    pub append_inflight_timeout: Duration,
    /// 客户端提案在 Leader 侧的最长等待时间
    pub client_request_timeout: Duration,
}

impl Default for RaftStateOptions {
    fn default() -> Self {
        Self {
            id: String::new(),
            peers: vec![],
            election_timeout_min: Duration::from_millis(150),
            election_timeout_max: Duration::from_millis(300),
            heartbeat_interval: Duration::from_millis(50),
            apply_interval: Duration::from_millis(10),
            apply_batch_size: 64,
            max_entries_per_append: 64,
            append_inflight_timeout: Duration::from_millis(300),
            client_request_timeout: Duration::from_secs(30),
        }
    }
}

/// 在途的日志复制请求（Leader 用，按 request_id 关联响应）
#[derive(Debug, Clone)]
pub(crate) struct InflightAppend {
    pub peer: NodeId,
    /// 本次请求成功后 follower 的日志至少匹配到的索引
    pub match_to: u64,
    pub sent_at: Instant,
}

/// Raft 状态机（可变状态，无 Clone）
pub struct RaftState {
    // 节点标识与配置
    pub id: NodeId,
    pub leader_id: Option<NodeId>,
    pub config: ClusterConfig,

    // 核心状态
    pub role: Role,
    pub current_term: u64,
    pub voted_for: Option<NodeId>,

    // 日志与提交状态
    pub commit_index: u64,
    pub last_applied: u64,
    pub last_log_index: u64,
    pub last_log_term: u64,

    // Leader 专用状态
    pub next_index: HashMap<NodeId, u64>,
    pub match_index: HashMap<NodeId, u64>,
    pub(crate) inflight_appends: HashMap<RequestId, InflightAppend>,

    /// 客户端请求ID -> 日志索引
    pub client_requests: HashMap<RequestId, u64>,
    /// 日志索引 -> 客户端请求ID
    pub client_requests_revert: HashMap<u64, RequestId>,
    /// 客户端请求ID -> 创建时间（用于过期清理）
    pub client_request_timestamps: HashMap<RequestId, Instant>,

    // 选举跟踪（仅 Candidate 状态有效）
    pub election_votes: HashMap<NodeId, bool>,
    pub current_election_id: Option<RequestId>,

    // 定时器
    pub election_timer: Option<TimerId>,
    pub heartbeat_timer: Option<TimerId>,
    pub apply_timer: Option<TimerId>,
    pub last_heartbeat: Instant,

    // 协作式关闭标志
    pub shutting_down: bool,

    // 外部依赖
    pub callbacks: Arc<dyn RaftCallbacks>,

    // 统一错误处理器
    pub error_handler: CallbackErrorHandler,

    pub options: RaftStateOptions,
}

impl RaftState {
    /// 初始化状态：从存储恢复 HardState 与日志末尾信息
    pub async fn new(options: RaftStateOptions, callbacks: Arc<dyn RaftCallbacks>) -> Result<Self> {
        let (current_term, voted_for) = match callbacks.load_hard_state().await {
            Ok(Some(hard_state)) => (hard_state.term, hard_state.voted_for),
            Ok(None) => (0, None),
            Err(err) => {
                error!("Failed to load hard state: {}", err);
                return Err(RaftError::Storage(err).into());
            }
        };

        let (last_log_index, last_log_term) = match callbacks.get_last_log_index().await {
            Ok((index, term)) => (index, term),
            Err(err) => {
                error!("Failed to get last log index: {}", err);
                return Err(RaftError::Storage(err).into());
            }
        };

        let voters = std::iter::once(options.id.clone())
            .chain(options.peers.iter().cloned())
            .collect();

        info!(
            "Node {} restored: term={}, voted_for={:?}, last_log=({}, {})",
            options.id, current_term, voted_for, last_log_index, last_log_term
        );

        Ok(RaftState {
            error_handler: CallbackErrorHandler::new(options.id.clone()),
            id: options.id.clone(),
            leader_id: None,
            config: ClusterConfig::simple(voters),
            role: Role::Follower,
            current_term,
            voted_for,
            commit_index: 0,
            last_applied: 0,
            last_log_index,
            last_log_term,
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            inflight_appends: HashMap::new(),
            client_requests: HashMap::new(),
            client_requests_revert: HashMap::new(),
            client_request_timestamps: HashMap::new(),
            election_votes: HashMap::new(),
            current_election_id: None,
            election_timer: None,
            heartbeat_timer: None,
            apply_timer: None,
            last_heartbeat: Instant::now(),
            shutting_down: false,
            callbacks,
            options,
        })
    }

    /// 获取最后一个日志条目的索引
    pub fn get_last_log_index(&self) -> u64 {
        self.last_log_index
    }

    /// 获取最后一个日志条目的任期
    pub fn get_last_log_term(&self) -> u64 {
        self.last_log_term
    }

    pub fn get_role(&self) -> Role {
        self.role
    }

    pub fn get_current_term(&self) -> u64 {
        self.current_term
    }

    pub fn get_commit_index(&self) -> u64 {
        self.commit_index
    }

    pub fn get_last_applied(&self) -> u64 {
        self.last_applied
    }

    pub fn get_leader_hint(&self) -> Option<NodeId> {
        self.leader_id.clone()
    }

    /// 统一保存 HardState（集中管理持久化）
    pub async fn persist_hard_state(&mut self) {
        let hard_state = HardState {
            term: self.current_term,
            voted_for: self.voted_for.clone(),
        };
        let _ = self.error_handler.handle_void(
            self.callbacks.save_hard_state(hard_state).await,
            "save_hard_state",
            None,
        );
    }

    /// 清理 Leader 专用状态（角色切换时调用）
    pub(crate) async fn clear_leader_state(&mut self) {
        self.next_index.clear();
        self.match_index.clear();
        self.inflight_appends.clear();

        // 未提交的客户端提案在此失效
        self.fail_all_client_requests(crate::error::ClientError::LeadershipLost)
            .await;

        // 清理心跳定时器
        if let Some(timer_id) = self.heartbeat_timer.take() {
            self.callbacks.del_timer(timer_id);
        }
    }

    /// 降级为 Follower（发现更高任期或收到合法 Leader 的消息时）
    pub(crate) async fn step_down_to_follower(&mut self, new_term: Option<u64>) {
        if let Some(term) = new_term.filter(|&t| t > self.current_term) {
            self.current_term = term;
            self.voted_for = None;
        }

        let was_leader = self.role == Role::Leader;
        self.role = Role::Follower;
        self.leader_id = None;
        self.current_election_id = None;
        self.election_votes.clear();

        if was_leader {
            self.clear_leader_state().await;
        }

        // Leader 在任期间没有选举定时器在走，降级后必须重新装上，
        // 否则该节点再也不会参与选举
        self.reset_election_timer();

        // 持久化状态变更
        self.persist_hard_state().await;

        self.callbacks
            .on_state_changed(Role::Follower, self.current_term, self.leader_id.clone())
            .await;
    }

    /// 协作式关闭：所有等待中的提案收到 ShuttingDown，之后拒绝新提案
    pub(crate) async fn handle_shutdown(&mut self) {
        info!("Node {} shutting down, failing in-flight proposals", self.id);
        self.shutting_down = true;
        self.fail_all_client_requests(crate::error::ClientError::ShuttingDown)
            .await;

        for timer in [
            self.election_timer.take(),
            self.heartbeat_timer.take(),
            self.apply_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            self.callbacks.del_timer(timer);
        }
    }

    /// 处理事件（主入口）
    pub async fn handle_event(&mut self, event: Event) {
        if self.shutting_down && !matches!(event, Event::Shutdown) {
            return;
        }

        match event {
            Event::ElectionTimeout => self.handle_election_timeout().await,
            Event::HeartbeatTimeout => self.handle_heartbeat_timeout().await,
            Event::ApplyTimeout => self.apply_committed_logs().await,
            Event::RequestVoteRequest(sender, request) => {
                self.handle_request_vote(sender, request).await
            }
            Event::RequestVoteResponse(sender, response) => {
                self.handle_request_vote_response(sender, response).await
            }
            Event::AppendEntriesRequest(sender, request) => {
                self.handle_append_entries_request(sender, request).await
            }
            Event::AppendEntriesResponse(sender, response) => {
                self.handle_append_entries_response(sender, response).await
            }
            Event::ClientPropose {
                cmd,
                request_id,
                client_id,
                request_seq,
            } => {
                self.handle_client_propose(cmd, request_id, client_id, request_seq)
                    .await
            }
            Event::Shutdown => self.handle_shutdown().await,
        }
    }
}
