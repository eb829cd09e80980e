//! 基于文件的 Raft 存储
//!
//! - `raft.meta`：HardState，原子写（临时文件 + rename）
//! - `raft.log`：追加式日志，u32 长度前缀 + bincode 编码的条目；
//!   内存中维护每个条目的文件偏移以支持随机读与后缀截断。
//!
//! 打开时扫描整个日志重建偏移索引；尾部残缺帧视为崩溃时的半截写入并
//! 截掉，中段解码失败视为数据损坏。

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::StorageError;
use crate::message::{HardState, LogEntry};
use crate::traits::{
    HardStateStorage, LogEntryStorage, Storage, StorageResult,
};

/// 文件存储配置
#[derive(Debug, Clone)]
pub struct FileStorageOptions {
    /// 数据目录；`raft.log` 与 `raft.meta` 都在其下
    pub base_dir: PathBuf,
    /// 每次写入后是否 fsync。关闭后崩溃可能丢失最近的写入。
    pub sync_on_write: bool,
}

impl Default for FileStorageOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./data"),
            sync_on_write: true,
        }
    }
}

impl FileStorageOptions {
    pub fn with_base_dir<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    fn log_path(&self) -> PathBuf {
        self.base_dir.join("raft.log")
    }

    fn meta_path(&self) -> PathBuf {
        self.base_dir.join("raft.meta")
    }
}

struct FileStorageInner {
    options: FileStorageOptions,
    log_file: File,
    /// offsets[i] 为 index = i + 1 的条目在文件中的起始偏移
    offsets: Vec<u64>,
    /// terms[i] 为 index = i + 1 的条目任期（避免读盘查任期）
    terms: Vec<u64>,
}

/// 文件存储。所有操作在互斥锁内同步完成；日志量级下这是最简单的
/// 正确实现，且保证响应发出前数据已落盘。
pub struct FileStorage {
    inner: Mutex<FileStorageInner>,
}

impl FileStorage {
    /// 打开（或创建）存储目录并重建日志索引
    pub fn open(options: FileStorageOptions) -> StorageResult<Self> {
        std::fs::create_dir_all(&options.base_dir)?;

        let mut log_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(options.log_path())?;

        let (offsets, terms) = Self::scan_log(&mut log_file)?;
        info!(
            "FileStorage opened: base_dir={:?}, entries={}",
            options.base_dir,
            offsets.len()
        );

        Ok(Self {
            inner: Mutex::new(FileStorageInner {
                options,
                log_file,
                offsets,
                terms,
            }),
        })
    }

    /// 扫描日志文件重建偏移索引。尾部的半截帧会被截掉。
    fn scan_log(file: &mut File) -> StorageResult<(Vec<u64>, Vec<u64>)> {
        let file_len = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        let mut offsets = Vec::new();
        let mut terms = Vec::new();
        let mut pos: u64 = 0;
        let mut expected_index: u64 = 1;

        while pos < file_len {
            if pos + 4 > file_len {
                warn!("Torn frame header at offset {}, truncating tail", pos);
                file.set_len(pos)?;
                break;
            }

            let mut len_buf = [0u8; 4];
            file.read_exact(&mut len_buf)?;
            let len = u32::from_le_bytes(len_buf) as u64;

            if pos + 4 + len > file_len {
                warn!("Torn frame payload at offset {}, truncating tail", pos);
                file.set_len(pos)?;
                break;
            }

            let mut payload = vec![0u8; len as usize];
            file.read_exact(&mut payload)?;

            let entry: LogEntry = bincode::deserialize(&payload).map_err(|e| {
                StorageError::Corruption(format!(
                    "undecodable log entry at offset {}: {}",
                    pos, e
                ))
            })?;

            if entry.index != expected_index {
                return Err(StorageError::Corruption(format!(
                    "log index discontinuity at offset {}: expected {}, got {}",
                    pos, expected_index, entry.index
                )));
            }

            offsets.push(pos);
            terms.push(entry.term);
            expected_index += 1;
            pos += 4 + len;
        }

        Ok((offsets, terms))
    }

    fn read_entry_at(inner: &mut FileStorageInner, offset: u64) -> StorageResult<LogEntry> {
        inner.log_file.seek(SeekFrom::Start(offset))?;
        let mut len_buf = [0u8; 4];
        inner.log_file.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        inner.log_file.read_exact(&mut payload)?;
        bincode::deserialize(&payload)
            .map_err(|e| StorageError::Corruption(format!("undecodable log entry: {}", e)))
    }
}

#[async_trait]
impl HardStateStorage for FileStorage {
    async fn save_hard_state(&self, hard_state: HardState) -> StorageResult<()> {
        let inner = self.inner.lock();
        let bytes = bincode::serialize(&hard_state)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;

        // 原子替换：写临时文件后 rename
        let tmp_path = inner.options.meta_path().with_extension("meta.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&bytes)?;
            if inner.options.sync_on_write {
                tmp.sync_all()?;
            }
        }
        std::fs::rename(&tmp_path, inner.options.meta_path())?;
        Ok(())
    }

    async fn load_hard_state(&self) -> StorageResult<Option<HardState>> {
        let inner = self.inner.lock();
        let path = inner.options.meta_path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        let hard_state = bincode::deserialize(&bytes)
            .map_err(|e| StorageError::Corruption(format!("undecodable hard state: {}", e)))?;
        Ok(Some(hard_state))
    }
}

#[async_trait]
impl LogEntryStorage for FileStorage {
    async fn append_log_entries(&self, entries: &[LogEntry]) -> StorageResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        let mut expected = inner.offsets.len() as u64 + 1;
        for entry in entries {
            if entry.index != expected {
                return Err(StorageError::Corruption(format!(
                    "non-contiguous append: expected index {}, got {}",
                    expected, entry.index
                )));
            }
            expected += 1;
        }

        let mut pos = inner.log_file.seek(SeekFrom::End(0))?;
        let mut buf = Vec::new();
        let mut new_offsets = Vec::with_capacity(entries.len());
        let mut new_terms = Vec::with_capacity(entries.len());
        for entry in entries {
            let payload = bincode::serialize(entry)
                .map_err(|e| StorageError::Encoding(e.to_string()))?;
            buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            buf.extend_from_slice(&payload);
            new_offsets.push(pos);
            new_terms.push(entry.term);
            pos += 4 + payload.len() as u64;
        }

        inner.log_file.write_all(&buf)?;
        if inner.options.sync_on_write {
            inner.log_file.sync_data()?;
        }
        inner.offsets.extend(new_offsets);
        inner.terms.extend(new_terms);
        Ok(())
    }

    async fn get_log_entries(&self, low: u64, high: u64) -> StorageResult<Vec<LogEntry>> {
        let mut inner = self.inner.lock();
        let last = inner.offsets.len() as u64;
        if low == 0 || low > high {
            return Err(StorageError::LogNotFound(low));
        }

        let high = std::cmp::min(high, last + 1);
        let mut entries = Vec::new();
        for idx in low..high {
            let offset = inner.offsets[(idx - 1) as usize];
            entries.push(Self::read_entry_at(&mut inner, offset)?);
        }
        Ok(entries)
    }

    async fn truncate_log_suffix(&self, idx: u64) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        let last = inner.offsets.len() as u64;
        if idx == 0 {
            return Err(StorageError::LogNotFound(0));
        }
        if idx > last {
            return Ok(());
        }

        let offset = inner.offsets[(idx - 1) as usize];
        inner.log_file.set_len(offset)?;
        if inner.options.sync_on_write {
            inner.log_file.sync_data()?;
        }
        inner.offsets.truncate((idx - 1) as usize);
        inner.terms.truncate((idx - 1) as usize);
        info!("Truncated log suffix from index {}", idx);
        Ok(())
    }

    async fn get_last_log_index(&self) -> StorageResult<(u64, u64)> {
        let inner = self.inner.lock();
        let last = inner.offsets.len() as u64;
        let term = inner.terms.last().copied().unwrap_or(0);
        Ok((last, term))
    }

    async fn get_log_term(&self, idx: u64) -> StorageResult<u64> {
        let inner = self.inner.lock();
        if idx == 0 {
            // index 0 是哨兵
            return Ok(0);
        }
        inner
            .terms
            .get((idx - 1) as usize)
            .copied()
            .ok_or(StorageError::LogNotFound(idx))
    }
}

impl Storage for FileStorage {}
