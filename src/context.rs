//! 调用上下文
//!
//! 每个远程调用都在一个 [`Context`] 下执行：取消令牌触发时立即返回
//! [`StorageError::Cancelled`]，截止时间到达时返回 [`StorageError::DeadlineExceeded`]。
//! 已经完成的远程副作用不会回滚。

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;

#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// 无截止时间、不会被外部取消的上下文
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline_in(timeout)
    }

    /// 使用外部取消令牌
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// 设置截止时间，已有更早的截止时间时保留较早者
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    pub fn deadline_in(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// 派生子上下文，父上下文取消时子上下文一并取消
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 在发起远程调用前检查上下文状态
    pub fn check(&self, operation: &'static str) -> Result<(), StorageError> {
        if self.cancel.is_cancelled() {
            return Err(StorageError::Cancelled { operation });
        }
        if matches!(self.deadline, Some(deadline) if Instant::now() >= deadline) {
            return Err(StorageError::DeadlineExceeded { operation });
        }
        Ok(())
    }

    /// 在上下文中执行 future，取消或超时时放弃等待
    pub async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        self.check(operation)?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StorageError::Cancelled { operation }),
            _ = deadline => Err(StorageError::DeadlineExceeded { operation }),
            result = fut => result,
        }
    }
}
