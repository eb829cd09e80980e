//! Log replication handling for Raft state machine

use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::{InflightAppend, RaftState};
use crate::event::Role;
use crate::message::{AppendEntriesRequest, AppendEntriesResponse};
use crate::types::{NodeId, RequestId};

impl RaftState {
    /// 处理心跳超时
    pub(crate) async fn handle_heartbeat_timeout(&mut self) {
        if self.role != Role::Leader {
            return;
        }

        // 丢弃过期的在途复制请求，允许下一轮重发同一段日志
        let timeout = self.options.append_inflight_timeout;
        self.inflight_appends
            .retain(|_, inflight| inflight.sent_at.elapsed() < timeout);

        // 清理等待超时的客户端提案
        self.cleanup_expired_client_requests().await;

        self.broadcast_append_entries().await;
    }

    /// 广播 AppendEntries。心跳与日志复制共用此路径：
    /// 有待复制日志且无在途请求时携带一批日志，否则发送空心跳。
    pub(crate) async fn broadcast_append_entries(&mut self) {
        if self.role != Role::Leader {
            return;
        }

        let current_term = self.current_term;
        let leader_id = self.id.clone();
        let leader_commit = self.commit_index;
        let last_log_index = self.get_last_log_index();
        let now = Instant::now();

        self.reset_heartbeat_timer();

        for peer in self.config.peers_of(&self.id) {
            let next_idx = *self.next_index.get(&peer).unwrap_or(&(last_log_index + 1));
            let has_inflight = self
                .inflight_appends
                .values()
                .any(|inflight| inflight.peer == peer);

            // 同一 follower 一次只保留一个在途批次，保证心跳不会越过日志
            let mut entries = Vec::new();
            if !has_inflight && last_log_index >= next_idx {
                let high = std::cmp::min(
                    next_idx + self.options.max_entries_per_append,
                    last_log_index + 1,
                );
                entries = match self.error_handler.handle(
                    self.callbacks.get_log_entries(next_idx, high).await,
                    "get_log_entries",
                    Some(&peer),
                ) {
                    Some(entries) => entries,
                    None => continue,
                };
            }

            let prev_log_index = next_idx - 1;
            let prev_log_term = if prev_log_index == 0 {
                0
            } else {
                match self.error_handler.handle(
                    self.callbacks.get_log_term(prev_log_index).await,
                    "get_log_term",
                    Some(&peer),
                ) {
                    Some(term) => term,
                    None => continue,
                }
            };

            let entries_len = entries.len() as u64;
            let request_id = RequestId::new();
            let req = AppendEntriesRequest {
                term: current_term,
                leader_id: leader_id.clone(),
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
                request_id,
            };

            if entries_len > 0 {
                info!(
                    "Leader {} sending {} entries to {}: prev_log_index={}, next_index={}",
                    self.id, entries_len, peer, prev_log_index, next_idx
                );
                self.inflight_appends.insert(
                    request_id,
                    InflightAppend {
                        peer: peer.clone(),
                        match_to: prev_log_index + entries_len,
                        sent_at: now,
                    },
                );
            }

            if let Err(err) = self
                .callbacks
                .send_append_entries_request(&peer, req)
                .await
            {
                warn!(
                    "Node {}: send append entries request to {} failed: {}",
                    self.id, peer, err
                );
                self.inflight_appends.remove(&request_id);
            }
        }
    }

    /// 处理 AppendEntries 请求
    pub(crate) async fn handle_append_entries_request(
        &mut self,
        sender: NodeId,
        request: AppendEntriesRequest,
    ) {
        if sender != request.leader_id {
            warn!(
                "Node {} received AppendEntries from {}, but leader is {}",
                self.id, sender, request.leader_id
            );
            return;
        }

        // 1. term 太小直接拒绝
        if request.term < self.current_term {
            debug!(
                "Node {} rejecting AppendEntries from {} (term {}) - local term is {}",
                self.id, request.leader_id, request.term, self.current_term
            );
            let resp = AppendEntriesResponse {
                term: self.current_term,
                success: false,
                conflict_index: None,
                request_id: request.request_id,
            };
            let _ = self.error_handler.handle(
                self.callbacks
                    .send_append_entries_response(&request.leader_id, resp)
                    .await,
                "send_append_entries_response",
                Some(&request.leader_id),
            );
            return;
        }

        // 2. 合法 Leader：承认领导权并重置选举定时器
        if self.role != Role::Follower || self.leader_id.as_ref() != Some(&request.leader_id) {
            info!(
                "Node {} recognizing {} as leader for term {}",
                self.id, request.leader_id, request.term
            );
        }

        let was_leader = self.role == Role::Leader;
        let was_candidate = self.role == Role::Candidate;
        self.role = Role::Follower;

        if request.term > self.current_term {
            self.current_term = request.term;
            self.voted_for = None;
            self.persist_hard_state().await;
        } else if was_candidate {
            // 同任期出现合法 Leader，候选状态作废
            self.current_election_id = None;
            self.election_votes.clear();
        }
        if was_leader {
            self.clear_leader_state().await;
        }
        self.leader_id = Some(request.leader_id.clone());
        self.last_heartbeat = Instant::now();
        self.reset_election_timer();

        // 3. 日志连续性检查
        let last_index = self.get_last_log_index();
        if request.prev_log_index > last_index {
            let resp = AppendEntriesResponse {
                term: self.current_term,
                success: false,
                conflict_index: Some(last_index + 1),
                request_id: request.request_id,
            };
            debug!(
                "Node {} missing entry at prev_log_index {} (last {}), conflict_index={}",
                self.id,
                request.prev_log_index,
                last_index,
                last_index + 1
            );
            let _ = self.error_handler.handle(
                self.callbacks
                    .send_append_entries_response(&request.leader_id, resp)
                    .await,
                "send_append_entries_response",
                Some(&request.leader_id),
            );
            return;
        }

        let local_prev_term = if request.prev_log_index == 0 {
            0
        } else {
            match self.error_handler.handle(
                self.callbacks.get_log_term(request.prev_log_index).await,
                "get_log_term",
                Some(&request.leader_id),
            ) {
                Some(term) => term,
                None => return,
            }
        };

        if local_prev_term != request.prev_log_term {
            // 返回冲突任期的第一个索引以加速回退
            let conflict_index = self
                .first_index_of_term(local_prev_term, request.prev_log_index)
                .await;
            warn!(
                "Node {} log inconsistency at index {} (leader term {}, local term {}), conflict_index={}",
                self.id, request.prev_log_index, request.prev_log_term, local_prev_term, conflict_index
            );
            let resp = AppendEntriesResponse {
                term: self.current_term,
                success: false,
                conflict_index: Some(conflict_index),
                request_id: request.request_id,
            };
            let _ = self.error_handler.handle(
                self.callbacks
                    .send_append_entries_response(&request.leader_id, resp)
                    .await,
                "send_append_entries_response",
                Some(&request.leader_id),
            );
            return;
        }

        // 4. 冲突截断 + 追加缺失的日志
        let mut success = true;
        if !request.entries.is_empty() {
            success = self.reconcile_entries(&request).await;
        }

        // 5. 更新提交索引：不超过本批最后一个新条目
        if success && request.leader_commit > self.commit_index {
            let last_new_entry = request.prev_log_index + request.entries.len() as u64;
            let new_commit_index = std::cmp::min(request.leader_commit, last_new_entry);
            if new_commit_index > self.commit_index {
                debug!(
                    "Node {} updating commit index from {} to {}",
                    self.id, self.commit_index, new_commit_index
                );
                self.commit_index = new_commit_index;
            }
        }

        let resp = AppendEntriesResponse {
            term: self.current_term,
            success,
            conflict_index: if success {
                None
            } else {
                Some(self.commit_index + 1)
            },
            request_id: request.request_id,
        };
        let _ = self.error_handler.handle(
            self.callbacks
                .send_append_entries_response(&request.leader_id, resp)
                .await,
            "send_append_entries_response",
            Some(&request.leader_id),
        );

        // 应用已提交的日志
        if success && self.commit_index > self.last_applied {
            self.apply_committed_logs().await;
        }
    }

    /// 对收到的日志做冲突截断与缺失追加。
    /// 对每个条目：本地同索引任期不同则从该索引截断，之后追加剩余条目；
    /// 已存在且任期一致的条目跳过（过期重复不会破坏后续日志）。
    async fn reconcile_entries(&mut self, request: &AppendEntriesRequest) -> bool {
        let mut append_from = None;

        for (i, entry) in request.entries.iter().enumerate() {
            if entry.index > self.get_last_log_index() {
                append_from = Some(i);
                break;
            }

            let local_term = match self.error_handler.handle(
                self.callbacks.get_log_term(entry.index).await,
                "get_log_term",
                None,
            ) {
                Some(term) => term,
                None => return false,
            };

            if local_term != entry.term {
                if entry.index <= self.commit_index {
                    // 已提交条目出现任期冲突说明协议被破坏，拒绝并报警
                    error!(
                        "Node {} refusing to truncate committed entry at index {} (commit_index {})",
                        self.id, entry.index, self.commit_index
                    );
                    return false;
                }

                info!(
                    "Node {} truncating conflicting suffix from index {} (local term {}, leader term {})",
                    self.id, entry.index, local_term, entry.term
                );
                if !self.error_handler.handle_void(
                    self.callbacks.truncate_log_suffix(entry.index).await,
                    "truncate_log_suffix",
                    None,
                ) {
                    return false;
                }

                // 截断后更新日志末尾信息
                self.last_log_index = entry.index - 1;
                self.last_log_term = if self.last_log_index == 0 {
                    0
                } else {
                    match self.error_handler.handle(
                        self.callbacks.get_log_term(self.last_log_index).await,
                        "get_log_term",
                        None,
                    ) {
                        Some(term) => term,
                        None => return false,
                    }
                };

                append_from = Some(i);
                break;
            }
        }

        let Some(from) = append_from else {
            // 所有条目均已存在
            return true;
        };

        let to_append = &request.entries[from..];
        debug!(
            "Node {} appending {} log entries starting from index {}",
            self.id,
            to_append.len(),
            to_append[0].index
        );

        if !self.error_handler.handle_void(
            self.callbacks.append_log_entries(to_append).await,
            "append_log_entries",
            None,
        ) {
            return false;
        }

        if let Some(last_entry) = to_append.last() {
            self.last_log_index = last_entry.index;
            self.last_log_term = last_entry.term;
        }
        true
    }

    /// 找到指定任期在日志中的第一个索引（用于冲突回退）
    pub(crate) async fn first_index_of_term(&mut self, term: u64, from_index: u64) -> u64 {
        let mut first = from_index;
        while first > 1 {
            match self.callbacks.get_log_term(first - 1).await {
                Ok(t) if t == term => first -= 1,
                _ => break,
            }
        }
        first
    }

    /// 处理 AppendEntries 响应
    pub(crate) async fn handle_append_entries_response(
        &mut self,
        peer: NodeId,
        response: AppendEntriesResponse,
    ) {
        if self.role != Role::Leader {
            return;
        }

        // 处理更高任期
        if response.term > self.current_term {
            warn!(
                "Node {} stepping down to Follower, found higher term {} from {} (current term {})",
                self.id, response.term, peer, self.current_term
            );
            self.step_down_to_follower(Some(response.term)).await;
            return;
        }

        if response.term != self.current_term {
            return;
        }

        let inflight = self.inflight_appends.remove(&response.request_id);

        if response.success {
            // 只有携带日志的请求会推进 match_index；空心跳的确认没有在途记录
            if let Some(inflight) = inflight {
                if inflight.peer != peer {
                    warn!(
                        "Node {} got response for request {} from {} but it was sent to {}",
                        self.id, response.request_id, peer, inflight.peer
                    );
                    return;
                }

                let current_match = self.match_index.get(&peer).copied().unwrap_or(0);
                if inflight.match_to > current_match {
                    self.match_index.insert(peer.clone(), inflight.match_to);
                }
                let current_next = self.next_index.get(&peer).copied().unwrap_or(1);
                if inflight.match_to + 1 > current_next {
                    self.next_index.insert(peer.clone(), inflight.match_to + 1);
                    debug!(
                        "Node {} updated replication state for {}: match_index={}, next_index={}",
                        self.id,
                        peer,
                        inflight.match_to,
                        inflight.match_to + 1
                    );
                }

                self.update_commit_index().await;

                // 还有积压日志时立刻继续复制
                if self.get_last_log_index() >= inflight.match_to + 1 {
                    self.broadcast_append_entries().await;
                }
            }
        } else {
            // 冲突回退：直接跳到 follower 报告的冲突任期首索引
            let fallback = self
                .next_index
                .get(&peer)
                .copied()
                .unwrap_or(1)
                .saturating_sub(1);
            let new_next = response
                .conflict_index
                .unwrap_or(fallback)
                .clamp(1, self.get_last_log_index() + 1);
            self.next_index.insert(peer.clone(), new_next);
            info!(
                "Node {} log conflict from {}: next_index={} (conflict_index={:?})",
                self.id, peer, new_next, response.conflict_index
            );
        }
    }

    /// 更新提交索引：多数派匹配且条目属于当前任期才可提交，
    /// 旧任期条目只能随当前任期条目间接提交。
    pub(crate) async fn update_commit_index(&mut self) {
        if self.role != Role::Leader {
            return;
        }

        let quorum = self.config.quorum();
        let mut match_indices: Vec<u64> = self
            .config
            .peers_of(&self.id)
            .iter()
            .map(|peer| self.match_index.get(peer).copied().unwrap_or(0))
            .collect();
        match_indices.push(self.get_last_log_index());
        match_indices.sort_unstable_by(|a, b| b.cmp(a));

        if match_indices.len() < quorum {
            return;
        }
        let candidate_index = match_indices[quorum - 1];

        if candidate_index <= self.commit_index {
            return;
        }

        let candidate_term = match self.error_handler.handle(
            self.callbacks.get_log_term(candidate_index).await,
            "get_log_term",
            None,
        ) {
            Some(term) => term,
            None => return,
        };

        let old_commit_index = self.commit_index;
        if candidate_term == self.current_term {
            self.commit_index = candidate_index;
        } else {
            // 多数派匹配点落在旧任期：只有 (commit, candidate] 中存在
            // 当前任期条目时才能间接提交
            let mut has_current_term = false;
            for i in (self.commit_index + 1)..=candidate_index {
                if self.callbacks.get_log_term(i).await.unwrap_or(0) == self.current_term {
                    has_current_term = true;
                    break;
                }
            }
            if has_current_term {
                self.commit_index = candidate_index;
            }
        }

        if self.commit_index > old_commit_index {
            info!(
                "Node {} commit_index advanced from {} to {}",
                self.id, old_commit_index, self.commit_index
            );
            self.apply_committed_logs().await;
        }
    }
}
