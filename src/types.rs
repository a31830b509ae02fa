use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use garde::Validate;

/// S3 单次批量删除允许的最大 key 数
pub const MAX_DELETE_BATCH: usize = 1000;

/// 内容类型嗅探读取的前缀长度
pub const SNIFF_LEN: usize = 512;

/// 默认分片大小 / 分片上传阈值（100MiB）
pub const DEFAULT_PART_SIZE: u64 = 100 * 1024 * 1024;

/// S3 允许的最小分片大小（5MiB）
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// 存储桶列表项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEntry {
    pub name: String,
    pub creation_date: Option<DateTime<Utc>>,
}

/// 对象列表项
///
/// `key` 保留后端返回的原样，可能缺失或为空，由上层过滤。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectEntry {
    pub key: Option<String>,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

impl ObjectEntry {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Default::default()
        }
    }

    /// 非空 key，缺失或空字符串返回 None
    pub fn usable_key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }
}

/// 分页结果，`next_cursor` 为 None 表示最后一页
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}

/// 批量删除中单个 key 的失败信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFailure {
    pub key: String,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl KeyFailure {
    pub fn new(key: &str, code: Option<&str>, message: Option<&str>) -> Self {
        Self {
            key: key.to_string(),
            code: code.map(str::to_string),
            message: message.map(str::to_string),
        }
    }
}

impl std::fmt::Display for KeyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} {}",
            self.key,
            self.code.as_deref().unwrap_or("-"),
            self.message.as_deref().unwrap_or("")
        )
    }
}

/// 批量删除结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeleteOutcome {
    pub deleted: Vec<String>,
    pub errors: Vec<KeyFailure>,
}

/// 上传策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    /// 单次 PUT
    Simple,
    /// 分片上传
    Multipart { part_size: u64 },
}

impl std::fmt::Display for UploadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadStrategy::Simple => write!(f, "simple"),
            UploadStrategy::Multipart { part_size } => write!(f, "multipart({})", part_size),
        }
    }
}

/// 上传结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    pub strategy: UploadStrategy,
    pub content_type: String,
    pub size: u64,
}

/// 上传选项
#[derive(Debug, Clone, Copy, Deserialize, Serialize, SmartDefault, Validate, PartialEq, Eq)]
#[serde(default)]
pub struct TransferOptions {
    /// 使用分片上传的阈值（大小 >= 阈值时分片）
    #[default(DEFAULT_PART_SIZE)]
    #[garde(range(min = MIN_PART_SIZE))]
    pub multipart_threshold: u64,

    /// 分片大小
    #[default(DEFAULT_PART_SIZE)]
    #[garde(range(min = MIN_PART_SIZE))]
    pub part_size: u64,
}

impl TransferOptions {
    /// 根据对象大小选择上传策略
    pub fn decide(&self, size: u64) -> UploadStrategy {
        if size >= self.multipart_threshold {
            UploadStrategy::Multipart {
                part_size: self.part_size,
            }
        } else {
            UploadStrategy::Simple
        }
    }
}

/// 删除存储桶选项
#[derive(Debug, Clone, Copy, Deserialize, Serialize, SmartDefault, Validate, PartialEq, Eq)]
#[serde(default)]
pub struct TeardownOptions {
    /// 每次批量删除的 key 数
    #[default(MAX_DELETE_BATCH)]
    #[garde(range(min = 1, max = MAX_DELETE_BATCH))]
    pub batch_size: usize,

    /// 批量删除并发数
    #[default = 1]
    #[garde(range(min = 1, max = 64))]
    pub concurrency: usize,
}
