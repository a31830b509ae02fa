//! 存储后端接口
//!
//! 对对象存储客户端的最小封装：列举、读取、写入、删除和分页。
//! 上层的 [`BucketManager`](crate::BucketManager) 和
//! [`ObjectCoordinator`](crate::ObjectCoordinator) 只依赖这个 trait，
//! 通过构造函数注入具体实现。

mod aws_s3;
mod memory;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::error::StorageError;
use crate::types::{BatchDeleteOutcome, BucketEntry, ObjectEntry, Page};

pub use aws_s3::{AwsS3Backend, AwsS3BackendConfig};
pub use memory::{BackendCall, MemoryBackend};

/// 对象内容读取流
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    // === 存储桶 ===

    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// 轻量存在性探测，不存在返回 `Ok(false)`
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    async fn list_buckets_page(
        &self,
        prefix: Option<&str>,
        cursor: Option<&str>,
    ) -> Result<Page<BucketEntry>, StorageError>;

    /// 删除空存储桶
    async fn delete_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    // === 对象 ===

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        cursor: Option<&str>,
    ) -> Result<Page<ObjectEntry>, StorageError>;

    /// 对象不存在时返回 [`StorageError::NotFound`]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader, StorageError>;

    async fn put_object_simple(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// 分片上传，从 `reader` 读取恰好 `size` 字节
    async fn put_object_multipart(
        &self,
        bucket: &str,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
        part_size: u64,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// 批量删除，`keys` 不超过 1000 个
    ///
    /// 单个 key 的失败通过 [`BatchDeleteOutcome::errors`] 返回，不作为整体错误。
    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutcome, StorageError>;
}
