//! Raft 持久化存储实现
//!
//! 逻辑布局：一个追加式 `raft.log`（长度前缀的日志条目）加一个
//! `raft.meta`（currentTerm / votedFor）。状态机可从 index 1 重放重建，
//! 无需单独的状态文件。

mod file_storage;

pub use file_storage::{FileStorage, FileStorageOptions};
