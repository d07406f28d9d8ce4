use thiserror::Error;

/// 事件队列错误
#[derive(Debug, Error)]
pub enum EventQueueError {
    /// 上游事件流违反顺序约定（例如 DELETE 之后出现 UPDATE）
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    /// 队列因一致性错误停止，需要 clear() 后重新同步
    #[error("Event queue halted: {0}")]
    Halted(String),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EventQueueError {
    /// 是否是一致性错误（需要全量重新同步）
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            EventQueueError::ConsistencyViolation(_) | EventQueueError::Halted(_)
        )
    }

    pub(crate) fn violation(message: impl Into<String>) -> Self {
        EventQueueError::ConsistencyViolation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, EventQueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_errors_are_classified() {
        let err = EventQueueError::violation("UPDATE not allowed after DELETE");
        assert!(err.is_consistency_violation());
        assert!(EventQueueError::Halted("x".to_string()).is_consistency_violation());
        assert!(!EventQueueError::Config("x".to_string()).is_consistency_violation());

        let err: EventQueueError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(!err.is_consistency_violation());
        assert!(err.to_string().starts_with("JSON error:"));
    }
}
