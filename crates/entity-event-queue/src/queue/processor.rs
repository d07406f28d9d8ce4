use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;

use super::batch::QueuedBatch;

/// 批次处理失败原因分类
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    /// 服务暂不可用 - 等待外部重启队列
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    /// 连接断开 - 等待重连后恢复
    #[error("Connection error: {0}")]
    Connection(String),
    /// 其他错误 - 记录日志，不自动重试
    #[error("{0}")]
    Other(String),
}

impl ProcessError {
    /// 是否是瞬时错误（网络类）
    pub fn is_transient(&self) -> bool {
        matches!(self, ProcessError::ServiceUnavailable(_) | ProcessError::Connection(_))
    }
}

/// 批次处理回调，把批次应用到本地存储
///
/// 同一时间只会有一个批次在处理中。
#[async_trait]
pub trait BatchProcessor: Send + Sync + 'static {
    async fn process(&self, batch: QueuedBatch) -> Result<(), ProcessError>;
}

/// 用闭包实现的处理回调
pub struct FnProcessor<F>(F);

pub fn processor_fn<F, Fut>(f: F) -> FnProcessor<F>
where
    F: Fn(QueuedBatch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessError>> + Send + 'static,
{
    FnProcessor(f)
}

#[async_trait]
impl<F, Fut> BatchProcessor for FnProcessor<F>
where
    F: Fn(QueuedBatch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessError>> + Send + 'static,
{
    async fn process(&self, batch: QueuedBatch) -> Result<(), ProcessError> {
        (self.0)(batch).await
    }
}
