use thiserror::Error;

use crate::types::KeyFailure;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 存储操作统一错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("不存在: {}", location(.bucket, .key.as_deref()))]
    NotFound { bucket: String, key: Option<String> },

    #[error("存储桶已存在: {bucket}")]
    AlreadyExists { bucket: String },

    #[error("IO 错误 [{operation}]: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("后端错误 [{operation}] {}: {source}", location(.bucket, .key.as_deref()))]
    Backend {
        operation: &'static str,
        bucket: String,
        key: Option<String>,
        #[source]
        source: BoxError,
    },

    #[error("批量删除部分失败 [{bucket}]: {} 个对象删除失败", .failures.len())]
    PartialBatchFailure {
        bucket: String,
        failures: Vec<KeyFailure>,
    },

    #[error("操作已取消: {operation}")]
    Cancelled { operation: &'static str },

    #[error("操作超时: {operation}")]
    DeadlineExceeded { operation: &'static str },

    #[error("配置错误: {0}")]
    Configuration(String),
}

impl StorageError {
    /// 从后端 SDK 错误转换，附带失败操作的上下文
    pub fn backend<E>(err: E, operation: &'static str, bucket: &str, key: Option<&str>) -> Self
    where
        E: Into<BoxError>,
    {
        StorageError::Backend {
            operation,
            bucket: bucket.to_string(),
            key: key.map(str::to_string),
            source: err.into(),
        }
    }

    pub fn not_found(bucket: &str, key: Option<&str>) -> Self {
        StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.map(str::to_string),
        }
    }

    pub fn io(operation: &'static str, source: std::io::Error) -> Self {
        StorageError::Io { operation, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

fn location(bucket: &str, key: Option<&str>) -> String {
    match key {
        Some(key) => format!("{}/{}", bucket, key),
        None => bucket.to_string(),
    }
}
