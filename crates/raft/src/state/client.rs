//! Client request handling and log application for Raft state machine

use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::RaftState;
use crate::error::ClientError;
use crate::event::Role;
use crate::message::{Applied, LogEntry};
use crate::types::{ClientId, Command, RequestId};

impl RaftState {
    /// 处理客户端提议
    pub(crate) async fn handle_client_propose(
        &mut self,
        cmd: Command,
        request_id: RequestId,
        client_id: Option<ClientId>,
        request_seq: u64,
    ) {
        debug!(
            "Node {} handling ClientPropose with request_id={}, role={:?}",
            self.id, request_id, self.role
        );

        if self.shutting_down {
            self.respond_client(request_id, Err(ClientError::ShuttingDown))
                .await;
            return;
        }

        if self.role != Role::Leader {
            debug!(
                "Node {} rejecting ClientPropose (not leader, current role: {:?}, leader: {:?})",
                self.id, self.role, self.leader_id
            );
            self.respond_client(
                request_id,
                Err(ClientError::NotLeader(self.leader_id.clone())),
            )
            .await;
            return;
        }

        // 重复的 request_id：要么已提交要么仍在途
        if let Some(&index) = self.client_requests.get(&request_id) {
            debug!(
                "Node {} request {} already in progress at index {}",
                self.id, request_id, index
            );
            self.respond_client(
                request_id,
                Err(ClientError::Conflict(anyhow::anyhow!(
                    "request already in progress at index {}",
                    index
                ))),
            )
            .await;
            return;
        }

        // 生成日志条目并落盘（响应依赖持久化，必须先写日志）
        let index = self.get_last_log_index() + 1;
        let new_entry = LogEntry {
            term: self.current_term,
            index,
            command: cmd,
            client_id,
            request_seq,
        };

        let append_success = self.error_handler.handle_void(
            self.callbacks
                .append_log_entries(std::slice::from_ref(&new_entry))
                .await,
            "append_log_entries",
            None,
        );
        if !append_success {
            error!(
                "Node {} failed to append log entry for request_id={}",
                self.id, request_id
            );
            self.respond_client(
                request_id,
                Err(ClientError::Internal(anyhow::anyhow!(
                    "failed to append log"
                ))),
            )
            .await;
            return;
        }

        self.last_log_index = index;
        self.last_log_term = self.current_term;

        // 记录客户端请求与日志索引的映射
        self.client_requests.insert(request_id, index);
        self.client_requests_revert.insert(index, request_id);
        self.client_request_timestamps
            .insert(request_id, Instant::now());

        debug!(
            "Node {} (Leader) appended log entry at index {} for request_id={}, replicating",
            self.id, index, request_id
        );

        // 立即同步日志；单节点集群在此直接满足多数派
        self.broadcast_append_entries().await;
        self.update_commit_index().await;
    }

    /// 应用已提交的日志（严格按 index 顺序，单次批量有上限）
    pub(crate) async fn apply_committed_logs(&mut self) {
        if self.last_applied >= self.commit_index {
            return;
        }

        let start = self.last_applied + 1;
        let end = std::cmp::min(
            self.commit_index,
            self.last_applied + self.options.apply_batch_size,
        );

        let entries = match self.callbacks.get_log_entries(start, end + 1).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Node {} failed to read committed logs: {}", self.id, e);
                return;
            }
        };

        for (i, entry) in entries.into_iter().enumerate() {
            let expected_index = start + i as u64;

            if entry.index != expected_index {
                error!(
                    "Log index discontinuous: expected {}, got {}",
                    expected_index, entry.index
                );
                break;
            }

            if entry.index <= self.last_applied || entry.index > self.commit_index {
                continue;
            }

            let index = entry.index;
            debug!(
                "Node {} applying command to state machine: index={}, term={}",
                self.id, entry.index, entry.term
            );
            let result = self
                .callbacks
                .apply_command(entry.index, entry.term, entry.command)
                .await;
            // lastApplied 单步推进；应用失败也推进以保持副本一致
            self.last_applied = index;

            match result {
                Ok(output) => self.check_client_response(index, output).await,
                Err(e) => {
                    warn!(
                        "Node {} state machine rejected entry at index {}: {}",
                        self.id, index, e
                    );
                    if let Some(&req_id) = self.client_requests_revert.get(&index) {
                        self.remove_client_request(req_id, index);
                        self.respond_client(
                            req_id,
                            Err(ClientError::Internal(anyhow::anyhow!("{}", e))),
                        )
                        .await;
                    }
                }
            }
        }

        // 还有积压时保持应用定时器运转
        if self.last_applied < self.commit_index {
            self.reset_apply_timer();
        }
    }

    /// 提案应用完成后唤醒等待者
    pub(crate) async fn check_client_response(&mut self, log_index: u64, output: Vec<u8>) {
        if let Some(&req_id) = self.client_requests_revert.get(&log_index) {
            self.remove_client_request(req_id, log_index);
            self.respond_client(
                req_id,
                Ok(Applied {
                    index: log_index,
                    output,
                }),
            )
            .await;
        }
    }

    /// 清理等待超时的客户端请求
    pub(crate) async fn cleanup_expired_client_requests(&mut self) {
        let now = Instant::now();
        let timeout = self.options.client_request_timeout;
        let expired: Vec<RequestId> = self
            .client_request_timestamps
            .iter()
            .filter(|(_, ts)| now.duration_since(**ts) > timeout)
            .map(|(id, _)| *id)
            .collect();

        for req_id in expired {
            if let Some(index) = self.client_requests.remove(&req_id) {
                self.client_requests_revert.remove(&index);
                self.client_request_timestamps.remove(&req_id);

                info!(
                    "Node {} cleaning up expired client request {} at index {}",
                    self.id, req_id, index
                );
                self.respond_client(req_id, Err(ClientError::Timeout)).await;
            }
        }
    }

    /// 角色丢失或关闭时让所有等待中的提案失败
    pub(crate) async fn fail_all_client_requests(&mut self, reason: ClientError) {
        let shutting_down = matches!(reason, ClientError::ShuttingDown);
        let pending: Vec<(RequestId, u64)> = self.client_requests.drain().collect();
        self.client_requests_revert.clear();
        self.client_request_timestamps.clear();

        for (req_id, index) in pending {
            debug!(
                "Node {} failing pending request {} at index {}: {}",
                self.id,
                req_id,
                index,
                if shutting_down {
                    "shutting down"
                } else {
                    "leadership lost"
                }
            );
            let err = if shutting_down {
                ClientError::ShuttingDown
            } else {
                ClientError::LeadershipLost
            };
            self.respond_client(req_id, Err(err)).await;
        }
    }

    fn remove_client_request(&mut self, req_id: RequestId, index: u64) {
        self.client_requests.remove(&req_id);
        self.client_requests_revert.remove(&index);
        self.client_request_timestamps.remove(&req_id);
    }

    async fn respond_client(
        &mut self,
        request_id: RequestId,
        result: crate::traits::ClientResult<Applied>,
    ) {
        let _ = self.error_handler.handle_void(
            self.callbacks.client_response(request_id, result).await,
            "client_response",
            None,
        );
    }
}
