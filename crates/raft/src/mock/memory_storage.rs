//! 内存存储实现（测试用）

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StorageError;
use crate::message::{HardState, LogEntry};
use crate::traits::{HardStateStorage, LogEntryStorage, Storage, StorageResult};

#[derive(Default)]
struct MemoryStorageInner {
    hard_state: Option<HardState>,
    log: Vec<LogEntry>,
}

/// 满足 `Storage` 的内存实现。日志 index 从 1 开始连续存放。
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryStorageInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试辅助：直接读取当前日志快照
    pub fn log_snapshot(&self) -> Vec<LogEntry> {
        self.inner.lock().log.clone()
    }
}

#[async_trait]
impl HardStateStorage for MemoryStorage {
    async fn save_hard_state(&self, hard_state: HardState) -> StorageResult<()> {
        self.inner.lock().hard_state = Some(hard_state);
        Ok(())
    }

    async fn load_hard_state(&self) -> StorageResult<Option<HardState>> {
        Ok(self.inner.lock().hard_state.clone())
    }
}

#[async_trait]
impl LogEntryStorage for MemoryStorage {
    async fn append_log_entries(&self, entries: &[LogEntry]) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        let mut expected = inner.log.len() as u64 + 1;
        for entry in entries {
            if entry.index != expected {
                return Err(StorageError::Corruption(format!(
                    "non-contiguous append: expected index {}, got {}",
                    expected, entry.index
                )));
            }
            expected += 1;
        }
        inner.log.extend_from_slice(entries);
        Ok(())
    }

    async fn get_log_entries(&self, low: u64, high: u64) -> StorageResult<Vec<LogEntry>> {
        let inner = self.inner.lock();
        if low == 0 || low > high {
            return Err(StorageError::LogNotFound(low));
        }
        let last = inner.log.len() as u64;
        let high = std::cmp::min(high, last + 1);
        if low > last {
            return Ok(vec![]);
        }
        Ok(inner.log[(low - 1) as usize..(high - 1) as usize].to_vec())
    }

    async fn truncate_log_suffix(&self, idx: u64) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        if idx == 0 {
            return Err(StorageError::LogNotFound(0));
        }
        if idx <= inner.log.len() as u64 {
            inner.log.truncate((idx - 1) as usize);
        }
        Ok(())
    }

    async fn get_last_log_index(&self) -> StorageResult<(u64, u64)> {
        let inner = self.inner.lock();
        let last = inner.log.len() as u64;
        let term = inner.log.last().map(|e| e.term).unwrap_or(0);
        Ok((last, term))
    }

    async fn get_log_term(&self, idx: u64) -> StorageResult<u64> {
        let inner = self.inner.lock();
        if idx == 0 {
            return Ok(0);
        }
        inner
            .log
            .get((idx - 1) as usize)
            .map(|e| e.term)
            .ok_or(StorageError::LogNotFound(idx))
    }
}

impl Storage for MemoryStorage {}
