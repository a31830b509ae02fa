//! 存储桶生命周期管理
//!
//! 创建、存在性检查、列举和删除存储桶。删除时先分页列出全部对象，
//! 按不超过 1000 个 key 的窗口批量删除，最后删除空桶。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::backend::StorageBackend;
use crate::context::Context;
use crate::error::StorageError;
use crate::paging;
use crate::types::{TeardownOptions, MAX_DELETE_BATCH};

/// 删除存储桶的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// 删除前存储桶是否存在
    pub existed: bool,
    /// 批量删除的对象数
    pub deleted_objects: usize,
    /// 批量删除请求数
    pub batches: usize,
}

pub struct BucketManager {
    backend: Arc<dyn StorageBackend>,
    options: TeardownOptions,
}

impl BucketManager {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_options(backend, TeardownOptions::default())
    }

    pub fn with_options(backend: Arc<dyn StorageBackend>, options: TeardownOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &TeardownOptions {
        &self.options
    }

    pub async fn bucket_exists(&self, ctx: &Context, bucket: &str) -> Result<bool, StorageError> {
        ctx.run("bucket_exists", self.backend.bucket_exists(bucket))
            .await
    }

    /// 创建存储桶，已存在时返回 [`StorageError::AlreadyExists`]
    pub async fn create_bucket(&self, ctx: &Context, bucket: &str) -> Result<(), StorageError> {
        if self.bucket_exists(ctx, bucket).await? {
            return Err(StorageError::AlreadyExists {
                bucket: bucket.to_string(),
            });
        }

        ctx.run("create_bucket", self.backend.create_bucket(bucket))
            .await?;
        info!(bucket, "bucket created");
        Ok(())
    }

    /// 列出所有存储桶名，可按前缀过滤
    pub async fn list_buckets(
        &self,
        ctx: &Context,
        prefix: Option<&str>,
    ) -> Result<Vec<String>, StorageError> {
        let backend = &self.backend;
        let entries = paging::drain(ctx, "list_buckets", prefix.unwrap_or(""), |cursor| async move {
            backend.list_buckets_page(prefix, cursor.as_deref()).await
        })
        .await?;

        Ok(entries.into_iter().map(|entry| entry.name).collect())
    }

    /// 删除存储桶及其全部对象
    ///
    /// 存储桶不存在时直接返回，不发起删除请求。任一批次有 key 删除失败时
    /// 不再发起新的批次，等待已发出的批次完成后返回
    /// [`StorageError::PartialBatchFailure`]，其中包含这些批次的全部失败 key，
    /// 不再删除存储桶；此前批次已删除的对象不会恢复。
    /// 其他错误（后端错误、取消、超时）立即返回。
    #[instrument(skip(self, ctx))]
    pub async fn delete_bucket(
        &self,
        ctx: &Context,
        bucket: &str,
    ) -> Result<TeardownReport, StorageError> {
        if !self.bucket_exists(ctx, bucket).await? {
            info!("bucket does not exist, nothing to delete");
            return Ok(TeardownReport::default());
        }

        let backend = &self.backend;
        let entries = paging::drain(ctx, "list_objects", bucket, |cursor| async move {
            backend.list_objects_page(bucket, None, cursor.as_deref()).await
        })
        .await?;

        let listed = entries.len();
        let keys: Vec<String> = entries
            .iter()
            .filter_map(|entry| entry.usable_key())
            .map(str::to_string)
            .collect();
        if keys.len() < listed {
            warn!(skipped = listed - keys.len(), "skipping entries without key");
        }

        let windows = delete_windows(&keys, self.options.batch_size);
        info!(objects = keys.len(), batches = windows.len(), "deleting objects");

        let halted = AtomicBool::new(false);
        let mut results = futures::stream::iter(windows.iter().enumerate().map(|(index, window)| {
            let halted = &halted;
            async move {
                if halted.load(Ordering::SeqCst) {
                    return Ok::<_, StorageError>(None);
                }
                let result = self.delete_window(ctx, bucket, index, window).await;
                if result.is_err() {
                    halted.store(true, Ordering::SeqCst);
                }
                result.map(Some)
            }
        }))
        .buffer_unordered(self.options.concurrency.max(1));

        let mut deleted = 0usize;
        let mut failures = Vec::new();
        while let Some(result) = results.next().await {
            match result {
                Ok(Some(count)) => deleted += count,
                Ok(None) => {}
                Err(StorageError::PartialBatchFailure { failures: batch, .. }) => {
                    failures.extend(batch)
                }
                Err(e) => return Err(e),
            }
        }

        if !failures.is_empty() {
            return Err(StorageError::PartialBatchFailure {
                bucket: bucket.to_string(),
                failures,
            });
        }

        ctx.run("delete_bucket", self.backend.delete_bucket(bucket))
            .await?;

        let report = TeardownReport {
            existed: true,
            deleted_objects: deleted,
            batches: windows.len(),
        };
        info!(deleted = report.deleted_objects, "bucket deleted");
        Ok(report)
    }

    async fn delete_window(
        &self,
        ctx: &Context,
        bucket: &str,
        index: usize,
        keys: &[String],
    ) -> Result<usize, StorageError> {
        let outcome = ctx
            .run("delete_objects", self.backend.delete_objects(bucket, keys))
            .await?;

        if !outcome.errors.is_empty() {
            for failure in &outcome.errors {
                warn!(bucket, batch = index, %failure, "object delete failed");
            }
            return Err(StorageError::PartialBatchFailure {
                bucket: bucket.to_string(),
                failures: outcome.errors,
            });
        }

        debug!(bucket, batch = index, keys = keys.len(), "batch deleted");
        Ok(keys.len())
    }
}

/// 按窗口大小切分 key，窗口大小限制在 1..=1000，不产生空窗口
pub fn delete_windows(keys: &[String], batch_size: usize) -> Vec<&[String]> {
    keys.chunks(batch_size.clamp(1, MAX_DELETE_BATCH)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, MemoryBackend};
    use crate::types::ObjectEntry;
    use std::time::Duration;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("obj-{:05}", i)).collect()
    }

    async fn seeded(bucket: &str, n: usize) -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend
            .seed(bucket, keys(n).into_iter().map(|k| (k, "x")))
            .await;
        backend
    }

    async fn window_sizes(backend: &MemoryBackend) -> Vec<usize> {
        backend
            .calls_of("delete_objects")
            .await
            .into_iter()
            .map(|call| match call {
                BackendCall::DeleteObjects { keys, .. } => keys.len(),
                other => panic!("unexpected call {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_delete_windows() {
        let sizes = |n: usize| -> Vec<usize> {
            delete_windows(&keys(n), MAX_DELETE_BATCH)
                .iter()
                .map(|w| w.len())
                .collect()
        };
        assert!(sizes(0).is_empty());
        assert_eq!(sizes(1), vec![1]);
        assert_eq!(sizes(999), vec![999]);
        assert_eq!(sizes(1000), vec![1000]);
        assert_eq!(sizes(1001), vec![1000, 1]);
        assert_eq!(sizes(2500), vec![1000, 1000, 500]);

        // 超出上限的窗口被截断
        assert_eq!(delete_windows(&keys(1500), 5000).len(), 2);
        assert_eq!(delete_windows(&keys(3), 0).len(), 3);
    }

    #[tokio::test]
    async fn test_create_bucket() {
        let backend = Arc::new(MemoryBackend::new());
        let manager = BucketManager::new(backend.clone());
        let ctx = Context::background();

        manager.create_bucket(&ctx, "b1").await.unwrap();
        assert!(manager.bucket_exists(&ctx, "b1").await.unwrap());

        let err = manager.create_bucket(&ctx, "b1").await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { ref bucket } if bucket == "b1"));
        assert_eq!(backend.calls_of("create_bucket").await.len(), 1);
    }

    #[tokio::test]
    async fn test_list_buckets_across_pages() {
        let backend = Arc::new(MemoryBackend::new().with_page_size(2));
        for name in ["logs-a", "logs-b", "logs-c", "data-a", "data-b"] {
            backend.add_bucket(name).await;
        }
        let manager = BucketManager::new(backend.clone());
        let ctx = Context::background();

        let all = manager.list_buckets(&ctx, None).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(backend.calls_of("list_buckets").await.len(), 3);

        let logs = manager.list_buckets(&ctx, Some("logs-")).await.unwrap();
        assert_eq!(logs, vec!["logs-a", "logs-b", "logs-c"]);
    }

    #[tokio::test]
    async fn test_delete_exactly_one_window() {
        let backend = Arc::new(seeded("b1", 1000).await);
        let manager = BucketManager::new(backend.clone());

        let report = manager
            .delete_bucket(&Context::background(), "b1")
            .await
            .unwrap();

        assert_eq!(window_sizes(&backend).await, vec![1000]);
        assert_eq!(report.deleted_objects, 1000);
        assert_eq!(report.batches, 1);
        assert!(!backend.has_bucket("b1").await);
    }

    #[tokio::test]
    async fn test_delete_spills_into_second_window() {
        let backend = Arc::new(seeded("b1", 1001).await.with_page_size(400));
        let manager = BucketManager::new(backend.clone());

        manager
            .delete_bucket(&Context::background(), "b1")
            .await
            .unwrap();

        assert_eq!(window_sizes(&backend).await, vec![1000, 1]);
        assert_eq!(backend.calls_of("list_objects").await.len(), 3);
        assert!(!backend.has_bucket("b1").await);
    }

    #[tokio::test]
    async fn test_delete_empty_bucket() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_bucket("empty").await;
        let manager = BucketManager::new(backend.clone());

        let report = manager
            .delete_bucket(&Context::background(), "empty")
            .await
            .unwrap();

        assert!(report.existed);
        assert!(window_sizes(&backend).await.is_empty());
        assert_eq!(backend.calls_of("delete_bucket").await.len(), 1);
        assert!(!backend.has_bucket("empty").await);
    }

    #[tokio::test]
    async fn test_delete_missing_bucket_is_noop() {
        let backend = Arc::new(MemoryBackend::new());
        let manager = BucketManager::new(backend.clone());

        let report = manager
            .delete_bucket(&Context::background(), "ghost")
            .await
            .unwrap();

        assert!(!report.existed);
        assert_eq!(
            backend.calls().await,
            vec![BackendCall::BucketExists("ghost".to_string())]
        );
    }

    #[tokio::test]
    async fn test_delete_skips_entries_without_key() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed("b1", [("a", "1"), ("valid", "2")]).await;
        backend.inject_listing_entry("b1", ObjectEntry::new("")).await;
        backend.inject_listing_entry("b1", ObjectEntry::default()).await;
        let manager = BucketManager::new(backend.clone());

        manager
            .delete_bucket(&Context::background(), "b1")
            .await
            .unwrap();

        let calls = backend.calls_of("delete_objects").await;
        assert_eq!(
            calls,
            vec![BackendCall::DeleteObjects {
                bucket: "b1".to_string(),
                keys: vec!["a".to_string(), "valid".to_string()],
            }]
        );
        assert!(!backend.has_bucket("b1").await);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_bucket() {
        let backend = Arc::new(seeded("b1", 3).await);
        backend.reject_key("obj-00001", "AccessDenied").await;
        let manager = BucketManager::new(backend.clone());

        let err = manager
            .delete_bucket(&Context::background(), "b1")
            .await
            .unwrap_err();

        match err {
            StorageError::PartialBatchFailure { bucket, failures } => {
                assert_eq!(bucket, "b1");
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].key, "obj-00001");
                assert_eq!(failures[0].code.as_deref(), Some("AccessDenied"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(backend.calls_of("delete_bucket").await.is_empty());
        assert_eq!(backend.object_keys("b1").await, vec!["obj-00001"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failures_from_concurrent_windows_are_merged() {
        let backend = Arc::new(
            seeded("b1", 6)
                .await
                .with_latency(Duration::from_millis(10)),
        );
        backend.reject_key("obj-00000", "AccessDenied").await;
        backend.reject_key("obj-00003", "InternalError").await;
        let manager = BucketManager::with_options(
            backend.clone(),
            TeardownOptions {
                batch_size: 2,
                concurrency: 3,
            },
        );

        let err = manager
            .delete_bucket(&Context::background(), "b1")
            .await
            .unwrap_err();

        match err {
            StorageError::PartialBatchFailure { failures, .. } => {
                let mut keys: Vec<String> = failures.into_iter().map(|f| f.key).collect();
                keys.sort();
                assert_eq!(keys, vec!["obj-00000", "obj-00003"]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(window_sizes(&backend).await, vec![2, 2, 2]);
        assert!(backend.calls_of("delete_bucket").await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_halts_sequential_windows() {
        let backend = Arc::new(seeded("b1", 6).await);
        backend.reject_key("obj-00000", "AccessDenied").await;
        let manager = BucketManager::with_options(
            backend.clone(),
            TeardownOptions {
                batch_size: 2,
                concurrency: 1,
            },
        );

        let err = manager
            .delete_bucket(&Context::background(), "b1")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::PartialBatchFailure { ref failures, .. } if failures.len() == 1));
        assert_eq!(window_sizes(&backend).await, vec![2]);
    }

    #[tokio::test]
    async fn test_listing_failure_stops_teardown() {
        let backend = Arc::new(seeded("b1", 3).await);
        backend.fail_on("list_objects").await;
        let manager = BucketManager::new(backend.clone());

        let err = manager
            .delete_bucket(&Context::background(), "b1")
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Backend { operation: "list_objects", .. }));
        assert!(backend.calls_of("delete_objects").await.is_empty());
        assert!(backend.calls_of("delete_bucket").await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_windows() {
        let backend = Arc::new(seeded("b1", 2500).await);
        let manager = BucketManager::with_options(
            backend.clone(),
            TeardownOptions {
                batch_size: 500,
                concurrency: 4,
            },
        );

        let report = manager
            .delete_bucket(&Context::background(), "b1")
            .await
            .unwrap();

        assert_eq!(report.batches, 5);
        assert_eq!(report.deleted_objects, 2500);
        let mut sizes = window_sizes(&backend).await;
        sizes.sort_unstable();
        assert_eq!(sizes, vec![500; 5]);
        assert!(!backend.has_bucket("b1").await);
    }

    #[tokio::test]
    async fn test_cancelled_context_issues_no_calls() {
        let backend = Arc::new(seeded("b1", 10).await);
        let manager = BucketManager::new(backend.clone());
        let ctx = Context::background();
        ctx.cancel();

        let err = manager.delete_bucket(&ctx, "b1").await.unwrap_err();
        assert!(matches!(err, StorageError::Cancelled { operation: "bucket_exists" }));
        assert!(backend.calls().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_during_teardown() {
        let backend = Arc::new(
            seeded("b1", 10)
                .await
                .with_latency(Duration::from_millis(40)),
        );
        let manager = BucketManager::new(backend.clone());
        let ctx = Context::with_timeout(Duration::from_millis(100));

        let err = manager.delete_bucket(&ctx, "b1").await.unwrap_err();
        assert!(matches!(err, StorageError::DeadlineExceeded { .. }));
        assert!(backend.has_bucket("b1").await);
    }
}
