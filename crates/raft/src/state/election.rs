//! Election handling for Raft state machine

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use super::RaftState;
use crate::event::Role;
use crate::message::{RequestVoteRequest, RequestVoteResponse};
use crate::types::{NodeId, RequestId};

impl RaftState {
    /// 处理选举超时
    pub(crate) async fn handle_election_timeout(&mut self) {
        if self.role == Role::Leader {
            debug!(target: "raft", "Node {} is the leader and will not start a new election", self.id);
            return;
        }

        self.start_election().await;
    }

    /// 开始新一轮选举（递增 term、给自己投票、并行发出 RequestVote）
    pub(crate) async fn start_election(&mut self) {
        // 切换为 Candidate 并递增任期
        self.current_term += 1;
        self.role = Role::Candidate;
        self.voted_for = Some(self.id.clone());
        self.leader_id = None;

        info!(
            "Node {} starting election for term {}",
            self.id, self.current_term
        );

        // 持久化状态变更
        self.persist_hard_state().await;

        // 重置选举定时器（每轮重新取随机值以避免分裂投票）
        self.reset_election_timer();

        // 生成新选举ID并初始化跟踪状态
        let election_id = RequestId::new();
        self.current_election_id = Some(election_id);
        self.election_votes.clear();
        self.election_votes.insert(self.id.clone(), true);

        let req = RequestVoteRequest {
            term: self.current_term,
            candidate_id: self.id.clone(),
            last_log_index: self.get_last_log_index(),
            last_log_term: self.get_last_log_term(),
            request_id: election_id,
        };

        // 发送投票请求
        for peer in self.config.peers_of(&self.id) {
            let result = self.error_handler.handle(
                self.callbacks
                    .send_request_vote_request(&peer, req.clone())
                    .await,
                "send_request_vote_request",
                Some(&peer),
            );
            if result.is_none() {
                warn!("Failed to send RequestVote to {}, will retry next round", peer);
            }
        }

        self.callbacks
            .on_state_changed(Role::Candidate, self.current_term, None)
            .await;

        // 单节点集群：立即检查结果
        self.check_election_result().await;
    }

    /// 处理投票请求
    pub(crate) async fn handle_request_vote(&mut self, sender: NodeId, request: RequestVoteRequest) {
        if sender != request.candidate_id {
            warn!(
                "Node {} received vote request from {}, but candidate is {}",
                self.id, sender, request.candidate_id
            );
            return;
        }

        // 处理更高任期
        if request.term > self.current_term {
            info!(
                "Node {} stepping down to Follower, updating term from {} to {}",
                self.id, self.current_term, request.term
            );
            self.step_down_to_follower(Some(request.term)).await;
        }

        // 决定是否投票
        let mut vote_granted = false;

        if request.term >= self.current_term
            && (self.voted_for.is_none() || self.voted_for == Some(request.candidate_id.clone()))
        {
            let log_ok = self.is_log_up_to_date(request.last_log_index, request.last_log_term);

            if log_ok {
                self.voted_for = Some(request.candidate_id.clone());
                vote_granted = true;
                self.reset_election_timer();
                info!(
                    "Node {} granting vote to {} for term {}",
                    self.id, request.candidate_id, self.current_term
                );

                // 响应发出前必须已落盘
                self.persist_hard_state().await;
            } else {
                info!(
                    "Node {} rejecting vote for {}, logs not up-to-date",
                    self.id, request.candidate_id
                );
            }
        } else {
            info!(
                "Node {} rejecting vote for {} in term {}, already voted for {:?} (args.term: {})",
                self.id, request.candidate_id, self.current_term, self.voted_for, request.term
            );
        }

        let resp = RequestVoteResponse {
            term: self.current_term,
            vote_granted,
            request_id: request.request_id,
        };

        let _ = self.error_handler.handle(
            self.callbacks
                .send_request_vote_response(&request.candidate_id, resp)
                .await,
            "send_request_vote_response",
            Some(&request.candidate_id),
        );
    }

    /// 检查候选人日志是否至少与本地一样新
    pub(crate) fn is_log_up_to_date(
        &self,
        candidate_last_index: u64,
        candidate_last_term: u64,
    ) -> bool {
        let self_last_term = self.get_last_log_term();
        let self_last_index = self.get_last_log_index();

        candidate_last_term > self_last_term
            || (candidate_last_term == self_last_term && candidate_last_index >= self_last_index)
    }

    /// 处理投票响应
    pub(crate) async fn handle_request_vote_response(
        &mut self,
        peer: NodeId,
        response: RequestVoteResponse,
    ) {
        debug!("Node {}: received vote response: {:?}", self.id, response);
        if self.role != Role::Candidate || self.current_election_id != Some(response.request_id) {
            return;
        }

        // 过滤无效投票者
        if !self.config.contains(&peer) {
            warn!(
                "Node {}: received vote response from unknown peer {}",
                self.id, peer
            );
            return;
        }

        // 处理更高任期
        if response.term > self.current_term {
            info!(
                "Stepping down from candidate due to higher term {} from peer {} (current term {})",
                response.term, peer, self.current_term
            );
            self.step_down_to_follower(Some(response.term)).await;
            return;
        }

        // 记录投票结果
        if response.term == self.current_term {
            self.election_votes.insert(peer, response.vote_granted);
        }

        self.check_election_result().await;
    }

    /// 检查选举结果
    pub(crate) async fn check_election_result(&mut self) {
        if self.role != Role::Candidate {
            return;
        }

        let granted_votes: HashSet<_> = self
            .election_votes
            .iter()
            .filter_map(|(id, &granted)| if granted { Some(id.clone()) } else { None })
            .collect();

        if self.config.majority(&granted_votes) {
            info!(
                "Node {} won election with {} votes for term {}",
                self.id,
                granted_votes.len(),
                self.current_term
            );
            self.become_leader().await;
        }
    }

    /// 成为 Leader
    pub(crate) async fn become_leader(&mut self) {
        warn!(
            "Node {} becoming leader for term {} (previous role: {:?})",
            self.id, self.current_term, self.role
        );

        self.role = Role::Leader;
        self.current_election_id = None;
        self.leader_id = Some(self.id.clone());

        // 初始化复制状态
        let last_log_index = self.get_last_log_index();
        self.next_index.clear();
        self.match_index.clear();
        self.inflight_appends.clear();

        for peer in self.config.peers_of(&self.id) {
            self.next_index.insert(peer.clone(), last_log_index + 1);
            self.match_index.insert(peer, 0);
        }

        self.reset_heartbeat_timer();

        self.callbacks
            .on_state_changed(Role::Leader, self.current_term, Some(self.id.clone()))
            .await;

        // 立即发送空 AppendEntries 宣告领导权
        self.broadcast_append_entries().await;

        // 启动日志应用定时器
        self.reset_apply_timer();
    }

    /// 重置心跳定时器
    pub(crate) fn reset_heartbeat_timer(&mut self) {
        if let Some(timer_id) = self.heartbeat_timer.take() {
            self.callbacks.del_timer(timer_id);
        }
        self.heartbeat_timer = Some(
            self.callbacks
                .set_heartbeat_timer(self.options.heartbeat_interval),
        );
    }

    /// 重置日志应用定时器
    pub(crate) fn reset_apply_timer(&mut self) {
        if let Some(timer_id) = self.apply_timer.take() {
            self.callbacks.del_timer(timer_id);
        }
        self.apply_timer = Some(self.callbacks.set_apply_timer(self.options.apply_interval));
    }

    /// 重置选举定时器（[T_min, T_max] 内均匀随机）
    pub(crate) fn reset_election_timer(&mut self) {
        let min_ms = self.options.election_timeout_min.as_millis() as u64;
        let max_ms = self.options.election_timeout_max.as_millis() as u64;

        let (actual_min, actual_max) = if min_ms < max_ms {
            (min_ms, max_ms)
        } else {
            warn!(
                "Node {} has invalid election timeout range ({}..{}ms), using default range",
                self.id, min_ms, max_ms
            );
            (150, 300)
        };

        let mut rng = rand::rng();
        let election_timeout =
            Duration::from_millis(rng.random_range(actual_min..=actual_max));

        debug!(
            "Node {} reset election timer to {:?}",
            self.id, election_timeout
        );

        if let Some(timer_id) = self.election_timer.take() {
            self.callbacks.del_timer(timer_id);
        }

        self.election_timer = Some(self.callbacks.set_election_timer(election_timeout));
    }
}
