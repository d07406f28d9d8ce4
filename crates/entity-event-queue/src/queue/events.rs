//! 队列事件 - 通过 broadcast 通道通知上层（会话/连接管理器）

use super::processor::ProcessError;

/// 队列生命周期事件
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// 批次处理成功并出队
    BatchProcessed {
        batch_id: String,
        group_id: String,
        event_count: usize,
    },
    /// 瞬时错误，处理暂停，批次留在队首等待 resume()
    ProcessingSuspended {
        batch_id: String,
        error: ProcessError,
    },
    /// 非瞬时错误，处理停止，批次留在队首
    ProcessingFailed {
        batch_id: String,
        error: ProcessError,
    },
    /// 合并时发现一致性错误，需要 clear() 后重新同步
    Halted {
        reason: String,
    },
    /// 队列被清空
    Cleared {
        dropped_batches: usize,
    },
}

impl QueueEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            QueueEvent::BatchProcessed { .. } => "batch_processed",
            QueueEvent::ProcessingSuspended { .. } => "processing_suspended",
            QueueEvent::ProcessingFailed { .. } => "processing_failed",
            QueueEvent::Halted { .. } => "halted",
            QueueEvent::Cleared { .. } => "cleared",
        }
    }
}
