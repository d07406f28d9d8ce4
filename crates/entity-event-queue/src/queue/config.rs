use serde::{Deserialize, Serialize};

use crate::entity::{default_movable_types, TypeRef};
use crate::error::{EventQueueError, Result};

/// 事件队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventQueueConfig {
    /// 是否合并尚未处理的批次
    ///
    /// 关闭后批次按原样追加，用于需要严格顺序的场景
    pub optimization_enabled: bool,

    /// 支持 MOVE（DELETE + CREATE 推断）的实体类型
    pub movable_types: Vec<TypeRef>,

    /// 队列事件广播通道容量
    pub event_channel_capacity: usize,
}

impl Default for EventQueueConfig {
    fn default() -> Self {
        Self {
            optimization_enabled: true,
            movable_types: default_movable_types(),
            event_channel_capacity: 256,
        }
    }
}

impl EventQueueConfig {
    /// 严格顺序配置：不做任何合并
    pub fn without_optimization() -> Self {
        Self {
            optimization_enabled: false,
            ..Self::default()
        }
    }

    /// 从 JSON 加载配置，缺失字段使用默认值
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_channel_capacity == 0 {
            return Err(EventQueueError::Config(
                "event_channel_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = EventQueueConfig::from_json_str(r#"{"optimization_enabled": false}"#).unwrap();
        assert!(!config.optimization_enabled);
        assert_eq!(config.movable_types, default_movable_types());
        assert_eq!(config.event_channel_capacity, 256);
    }

    #[test]
    fn movable_types_can_be_overridden() {
        let json = r#"{"movable_types": [{"application": "tutanota", "type": "MailFolder"}]}"#;
        let config = EventQueueConfig::from_json_str(json).unwrap();
        assert!(config.optimization_enabled);
        assert_eq!(config.movable_types, vec![TypeRef::new("tutanota", "MailFolder")]);
    }

    #[test]
    fn zero_channel_capacity_is_rejected() {
        let err = EventQueueConfig::from_json_str(r#"{"event_channel_capacity": 0}"#).unwrap_err();
        assert!(matches!(err, EventQueueError::Config(_)));

        let err = EventQueueConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, EventQueueError::Json(_)));
    }
}
