//! 内存存储后端
//!
//! 用于测试和本地调试：记录所有调用，支持分页大小控制、故障注入和调用延迟。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{Mutex, MutexGuard};

use crate::backend::{ObjectReader, StorageBackend};
use crate::error::StorageError;
use crate::types::{
    BatchDeleteOutcome, BucketEntry, KeyFailure, ObjectEntry, Page, MAX_DELETE_BATCH,
};

/// 后端调用记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    CreateBucket(String),
    BucketExists(String),
    ListBucketsPage {
        prefix: Option<String>,
        cursor: Option<String>,
    },
    DeleteBucket(String),
    ListObjectsPage {
        bucket: String,
        prefix: Option<String>,
        cursor: Option<String>,
    },
    GetObject {
        bucket: String,
        key: String,
    },
    PutObjectSimple {
        bucket: String,
        key: String,
        size: u64,
        content_type: String,
    },
    PutObjectMultipart {
        bucket: String,
        key: String,
        size: u64,
        part_size: u64,
        content_type: String,
    },
    DeleteObject {
        bucket: String,
        key: String,
    },
    DeleteObjects {
        bucket: String,
        keys: Vec<String>,
    },
}

impl BackendCall {
    pub fn operation(&self) -> &'static str {
        match self {
            BackendCall::CreateBucket(_) => "create_bucket",
            BackendCall::BucketExists(_) => "bucket_exists",
            BackendCall::ListBucketsPage { .. } => "list_buckets",
            BackendCall::DeleteBucket(_) => "delete_bucket",
            BackendCall::ListObjectsPage { .. } => "list_objects",
            BackendCall::GetObject { .. } => "get_object",
            BackendCall::PutObjectSimple { .. } => "put_object",
            BackendCall::PutObjectMultipart { .. } => "put_object_multipart",
            BackendCall::DeleteObject { .. } => "delete_object",
            BackendCall::DeleteObjects { .. } => "delete_objects",
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    last_modified: chrono::DateTime<Utc>,
}

#[derive(Debug, Default)]
struct BucketState {
    objects: BTreeMap<String, StoredObject>,
    /// 只出现在列举结果中的条目（缺失或空 key）
    listing_artifacts: Vec<ObjectEntry>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, BucketState>,
    calls: Vec<BackendCall>,
    failing_operations: HashSet<&'static str>,
    rejected_keys: HashMap<String, String>,
}

/// 内存存储后端
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
    page_size: usize,
    latency: Option<Duration>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            page_size: 1000,
            latency: None,
        }
    }

    /// 每页返回的最大条目数
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// 每次调用前等待
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// 直接创建存储桶，不记录调用
    pub async fn add_bucket(&self, bucket: &str) {
        self.state
            .lock()
            .await
            .buckets
            .entry(bucket.to_string())
            .or_default();
    }

    /// 直接写入存储桶和对象，不记录调用
    pub async fn seed<I, K, V>(&self, bucket: &str, objects: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        let mut state = self.state.lock().await;
        let bucket_state = state.buckets.entry(bucket.to_string()).or_default();
        for (key, data) in objects {
            bucket_state.objects.insert(
                key.into(),
                StoredObject {
                    data: data.into(),
                    content_type: "application/octet-stream".to_string(),
                    last_modified: Utc::now(),
                },
            );
        }
    }

    /// 在列举结果前部插入一个不对应真实对象的条目
    pub async fn inject_listing_entry(&self, bucket: &str, entry: ObjectEntry) {
        let mut state = self.state.lock().await;
        state
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .listing_artifacts
            .push(entry);
    }

    /// 让指定操作返回后端错误
    pub async fn fail_on(&self, operation: &'static str) {
        self.state.lock().await.failing_operations.insert(operation);
    }

    /// 批量删除时将该 key 报告为失败
    pub async fn reject_key(&self, key: &str, code: &str) {
        self.state
            .lock()
            .await
            .rejected_keys
            .insert(key.to_string(), code.to_string());
    }

    pub async fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().await.calls.clone()
    }

    /// 指定操作的调用记录
    pub async fn calls_of(&self, operation: &str) -> Vec<BackendCall> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.operation() == operation)
            .cloned()
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    pub async fn has_bucket(&self, bucket: &str) -> bool {
        self.state.lock().await.buckets.contains_key(bucket)
    }

    pub async fn object_keys(&self, bucket: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .buckets
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn content_type_of(&self, bucket: &str, key: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .map(|o| o.content_type.clone())
    }

    /// 记录调用并检查故障注入
    async fn enter(&self, call: BackendCall) -> Result<MutexGuard<'_, State>, StorageError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        let operation = call.operation();
        let (bucket, key) = call_location(&call);
        state.calls.push(call);

        if state.failing_operations.contains(operation) {
            return Err(StorageError::backend(
                "injected failure",
                operation,
                &bucket,
                key.as_deref(),
            ));
        }

        Ok(state)
    }

    fn store(
        state: &mut State,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let bucket_state = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::not_found(bucket, None))?;
        bucket_state.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }
}

fn call_location(call: &BackendCall) -> (String, Option<String>) {
    match call {
        BackendCall::CreateBucket(b) | BackendCall::BucketExists(b) | BackendCall::DeleteBucket(b) => {
            (b.clone(), None)
        }
        BackendCall::ListBucketsPage { prefix, .. } => (prefix.clone().unwrap_or_default(), None),
        BackendCall::ListObjectsPage { bucket, .. } | BackendCall::DeleteObjects { bucket, .. } => {
            (bucket.clone(), None)
        }
        BackendCall::GetObject { bucket, key }
        | BackendCall::PutObjectSimple { bucket, key, .. }
        | BackendCall::PutObjectMultipart { bucket, key, .. }
        | BackendCall::DeleteObject { bucket, key } => (bucket.clone(), Some(key.clone())),
    }
}

/// 按 cursor（上一页最后一个位置）切出一页
fn paginate<T: Clone>(items: &[T], cursor: Option<&str>, page_size: usize) -> Result<Page<T>, String> {
    let start = match cursor {
        Some(c) => c.parse::<usize>().map_err(|_| format!("invalid cursor: {}", c))?,
        None => 0,
    };
    let end = start.saturating_add(page_size).min(items.len());
    let page = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
    let next_cursor = (end < items.len()).then(|| end.to_string());
    Ok(Page {
        items: page,
        next_cursor,
    })
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut state = self.enter(BackendCall::CreateBucket(bucket.to_string())).await?;
        if state.buckets.contains_key(bucket) {
            return Err(StorageError::backend(
                "BucketAlreadyOwnedByYou",
                "create_bucket",
                bucket,
                None,
            ));
        }
        state.buckets.insert(bucket.to_string(), BucketState::default());
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        let state = self.enter(BackendCall::BucketExists(bucket.to_string())).await?;
        Ok(state.buckets.contains_key(bucket))
    }

    async fn list_buckets_page(
        &self,
        prefix: Option<&str>,
        cursor: Option<&str>,
    ) -> Result<Page<BucketEntry>, StorageError> {
        let state = self
            .enter(BackendCall::ListBucketsPage {
                prefix: prefix.map(str::to_string),
                cursor: cursor.map(str::to_string),
            })
            .await?;

        let names: Vec<BucketEntry> = state
            .buckets
            .keys()
            .filter(|name| prefix.map_or(true, |p| name.starts_with(p)))
            .map(|name| BucketEntry {
                name: name.clone(),
                creation_date: None,
            })
            .collect();

        paginate(&names, cursor, self.page_size)
            .map_err(|e| StorageError::backend(e, "list_buckets", prefix.unwrap_or(""), None))
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut state = self.enter(BackendCall::DeleteBucket(bucket.to_string())).await?;
        match state.buckets.get(bucket) {
            None => Err(StorageError::not_found(bucket, None)),
            Some(b) if !b.objects.is_empty() => Err(StorageError::backend(
                "BucketNotEmpty",
                "delete_bucket",
                bucket,
                None,
            )),
            Some(_) => {
                state.buckets.remove(bucket);
                Ok(())
            }
        }
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        cursor: Option<&str>,
    ) -> Result<Page<ObjectEntry>, StorageError> {
        let state = self
            .enter(BackendCall::ListObjectsPage {
                bucket: bucket.to_string(),
                prefix: prefix.map(str::to_string),
                cursor: cursor.map(str::to_string),
            })
            .await?;

        let bucket_state = state
            .buckets
            .get(bucket)
            .ok_or_else(|| StorageError::not_found(bucket, None))?;

        let matches = |key: &str| prefix.map_or(true, |p| key.starts_with(p));
        let entries: Vec<ObjectEntry> = bucket_state
            .listing_artifacts
            .iter()
            .filter(|e| e.key.as_deref().map_or(true, |k| matches(k)))
            .cloned()
            .chain(
                bucket_state
                    .objects
                    .iter()
                    .filter(|(key, _)| matches(key))
                    .map(|(key, obj)| ObjectEntry {
                        key: Some(key.clone()),
                        size: obj.data.len() as u64,
                        last_modified: Some(obj.last_modified),
                        etag: None,
                    }),
            )
            .collect();

        paginate(&entries, cursor, self.page_size)
            .map_err(|e| StorageError::backend(e, "list_objects", bucket, prefix))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader, StorageError> {
        let state = self
            .enter(BackendCall::GetObject {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
            .await?;

        let data = state
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::not_found(bucket, Some(key)))?;

        Ok(Box::pin(Cursor::new(data)))
    }

    async fn put_object_simple(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let mut state = self
            .enter(BackendCall::PutObjectSimple {
                bucket: bucket.to_string(),
                key: key.to_string(),
                size: body.len() as u64,
                content_type: content_type.to_string(),
            })
            .await?;
        Self::store(&mut state, bucket, key, body, content_type)
    }

    async fn put_object_multipart(
        &self,
        bucket: &str,
        key: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        size: u64,
        part_size: u64,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let mut state = self
            .enter(BackendCall::PutObjectMultipart {
                bucket: bucket.to_string(),
                key: key.to_string(),
                size,
                part_size,
                content_type: content_type.to_string(),
            })
            .await?;

        let mut data = Vec::new();
        reader
            .take(size)
            .read_to_end(&mut data)
            .await
            .map_err(|e| StorageError::io("upload_part", e))?;

        Self::store(&mut state, bucket, key, Bytes::from(data), content_type)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let mut state = self
            .enter(BackendCall::DeleteObject {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
            .await?;

        let bucket_state = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::not_found(bucket, None))?;
        // 与 S3 一致：删除不存在的 key 也返回成功
        bucket_state.objects.remove(key);
        Ok(())
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutcome, StorageError> {
        let mut state = self
            .enter(BackendCall::DeleteObjects {
                bucket: bucket.to_string(),
                keys: keys.to_vec(),
            })
            .await?;

        if keys.is_empty() || keys.len() > MAX_DELETE_BATCH {
            return Err(StorageError::backend(
                format!("MalformedXML: {} keys", keys.len()),
                "delete_objects",
                bucket,
                None,
            ));
        }

        let rejected = state.rejected_keys.clone();
        let bucket_state = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::not_found(bucket, None))?;

        let mut outcome = BatchDeleteOutcome::default();
        for key in keys {
            match rejected.get(key) {
                Some(code) => outcome
                    .errors
                    .push(KeyFailure::new(key, Some(code.as_str()), Some("rejected"))),
                None => {
                    bucket_state.objects.remove(key);
                    outcome.deleted.push(key.clone());
                }
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bucket_lifecycle() {
        let backend = MemoryBackend::new();
        assert!(!backend.bucket_exists("b1").await.unwrap());
        backend.create_bucket("b1").await.unwrap();
        assert!(backend.bucket_exists("b1").await.unwrap());
        assert!(backend.create_bucket("b1").await.is_err());
        backend.delete_bucket("b1").await.unwrap();
        assert!(!backend.has_bucket("b1").await);
    }

    #[tokio::test]
    async fn test_delete_non_empty_bucket_fails() {
        let backend = MemoryBackend::new();
        backend.seed("b1", [("a", "1")]).await;
        assert!(backend.delete_bucket("b1").await.is_err());
        assert!(backend.has_bucket("b1").await);
    }

    #[tokio::test]
    async fn test_list_objects_pages() {
        let backend = MemoryBackend::new().with_page_size(2);
        backend
            .seed("b1", [("a", "1"), ("b", "2"), ("c", "3")])
            .await;

        let first = backend.list_objects_page("b1", None, None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        let cursor = first.next_cursor.unwrap();

        let second = backend
            .list_objects_page("b1", None, Some(&cursor))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].key.as_deref(), Some("c"));
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_list_objects_cursor_past_end() {
        let backend = MemoryBackend::new();
        backend.seed("b1", [("a", "1")]).await;

        let cursor = usize::MAX.to_string();
        let page = backend
            .list_objects_page("b1", None, Some(&cursor))
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());

        assert!(backend
            .list_objects_page("b1", None, Some("not-a-number"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let backend = MemoryBackend::new();
        backend.fail_on("create_bucket").await;
        let err = backend.create_bucket("b1").await.unwrap_err();
        assert!(matches!(err, StorageError::Backend { operation: "create_bucket", .. }));
        assert_eq!(backend.calls_of("create_bucket").await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_objects_reports_rejected_keys() {
        let backend = MemoryBackend::new();
        backend.seed("b1", [("a", "1"), ("b", "2")]).await;
        backend.reject_key("b", "AccessDenied").await;

        let outcome = backend
            .delete_objects("b1", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(outcome.deleted, vec!["a".to_string()]);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].code.as_deref(), Some("AccessDenied"));
        assert_eq!(backend.object_keys("b1").await, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let backend = MemoryBackend::new();
        backend.add_bucket("b1").await;
        let err = backend.get_object("b1", "missing").await.err().unwrap();
        assert!(err.is_not_found());
    }
}
