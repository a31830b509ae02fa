use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backend::{AwsS3Backend, StorageBackend};
use crate::bucket::BucketManager;
use crate::config::SimpleS3Config;
use crate::context::Context;
use crate::error::StorageError;
use crate::object::ObjectCoordinator;
use crate::types::{TeardownOptions, TransferOptions};

/// 存储桶和对象操作的统一入口
///
/// # 示例
/// ```no_run
/// use simple_s3::{SimpleS3, SimpleS3Config};
///
/// # async fn run() -> Result<(), simple_s3::StorageError> {
/// let client = SimpleS3::connect(SimpleS3Config::default()).await?;
/// let ctx = client.context();
/// client.buckets().create_bucket(&ctx, "my-bucket").await?;
/// let keys = client.objects().list_objects(&ctx, "my-bucket", None).await?;
/// # Ok(())
/// # }
/// ```
pub struct SimpleS3 {
    buckets: BucketManager,
    objects: ObjectCoordinator,
    operation_timeout: Option<Duration>,
}

impl SimpleS3 {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_options(backend, TransferOptions::default(), TeardownOptions::default())
    }

    pub fn with_options(
        backend: Arc<dyn StorageBackend>,
        transfer: TransferOptions,
        teardown: TeardownOptions,
    ) -> Self {
        Self {
            buckets: BucketManager::with_options(backend.clone(), teardown),
            objects: ObjectCoordinator::with_options(backend, transfer),
            operation_timeout: None,
        }
    }

    /// 每个 [`context`](Self::context) 使用的超时时间
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// 按配置创建 S3 后端
    pub async fn connect(config: SimpleS3Config) -> Result<Self, StorageError> {
        config.check()?;
        let backend = AwsS3Backend::new(config.backend).await?;
        Ok(Self::with_options(Arc::new(backend), config.transfer, config.teardown)
            .with_operation_timeout(config.operation_timeout))
    }

    pub fn buckets(&self) -> &BucketManager {
        &self.buckets
    }

    pub fn objects(&self) -> &ObjectCoordinator {
        &self.objects
    }

    /// 新的调用上下文，配置了超时时从现在开始计时
    pub fn context(&self) -> Context {
        self.context_with(CancellationToken::new())
    }

    /// 使用外部取消令牌的调用上下文
    pub fn context_with(&self, cancel: CancellationToken) -> Context {
        let ctx = Context::with_cancellation(cancel);
        match self.operation_timeout {
            Some(timeout) => ctx.deadline_in(timeout),
            None => ctx,
        }
    }
}
