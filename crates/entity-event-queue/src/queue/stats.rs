use serde::{Deserialize, Serialize};

/// 事件队列统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventQueueStats {
    /// 调用 add 的批次数
    pub batches_added: u64,

    /// 被完全合并掉的批次数
    pub batches_optimized_away: u64,

    /// 合并时未追加到新批次的事件数
    ///
    /// 既包括直接丢弃的事件，也包括并入更早批次的事件
    /// （例如 UPDATE 之后的 MOVE，其 DELETE 会替换到旧批次中）。
    pub events_merged: u64,

    /// 处理成功的批次数
    pub batches_processed: u64,

    /// 瞬时错误次数
    pub transient_failures: u64,

    /// 非瞬时错误次数
    pub processing_failures: u64,

    /// 当前待处理批次数
    pub pending_batches: usize,

    /// 当前待处理事件数
    pub pending_events: usize,

    /// 是否有批次正在处理
    pub processing: bool,
}

impl EventQueueStats {
    /// 合并掉的批次占比
    pub fn optimization_rate(&self) -> f64 {
        if self.batches_added == 0 {
            0.0
        } else {
            self.batches_optimized_away as f64 / self.batches_added as f64
        }
    }

    /// 计算成功率
    pub fn success_rate(&self) -> f64 {
        let attempts = self.batches_processed + self.transient_failures + self.processing_failures;
        if attempts == 0 {
            0.0
        } else {
            self.batches_processed as f64 / attempts as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_handle_empty_stats() {
        let stats = EventQueueStats::default();
        assert_eq!(stats.optimization_rate(), 0.0);
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[test]
    fn rates_are_ratios() {
        let stats = EventQueueStats {
            batches_added: 4,
            batches_optimized_away: 1,
            batches_processed: 3,
            transient_failures: 1,
            ..Default::default()
        };
        assert_eq!(stats.optimization_rate(), 0.25);
        assert_eq!(stats.success_rate(), 0.75);
    }
}
