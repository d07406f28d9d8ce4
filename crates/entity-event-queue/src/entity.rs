//! 实体变更事件与修改类型推断
//!
//! 服务器推送的事件只有 CREATE / UPDATE / DELETE 三种操作。
//! MOVE 不会直接出现，而是由同一批次内同一实例的 DELETE + CREATE 推断得出，
//! 且只适用于允许跨列表移动的实体类型。

use serde::{Deserialize, Serialize};

use crate::error::{EventQueueError, Result};

/// 事件操作类型（与服务器协议一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 实体类型引用（application + type）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    pub application: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl TypeRef {
    pub fn new(application: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            type_name: type_name.into(),
        }
    }

    /// 邮件，可在文件夹之间移动
    pub fn mail() -> Self {
        Self::new("tutanota", "Mail")
    }

    /// 客户信息，切换账户类型时会移动
    pub fn customer_info() -> Self {
        Self::new("sys", "CustomerInfo")
    }

    /// 事件是否属于该类型
    pub fn matches(&self, update: &EntityUpdate) -> bool {
        self.application == update.application && self.type_name == update.type_name
    }
}

/// 默认支持 MOVE 的实体类型
pub fn default_movable_types() -> Vec<TypeRef> {
    vec![TypeRef::mail(), TypeRef::customer_info()]
}

/// 单条实体变更事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityUpdate {
    pub application: String,
    #[serde(rename = "type")]
    pub type_name: String,
    /// 实例所在列表
    pub instance_list_id: String,
    /// 实例 ID（在所属列表/分组内唯一）
    pub instance_id: String,
    pub operation: OperationType,
}

impl EntityUpdate {
    pub fn new(
        type_ref: &TypeRef,
        instance_list_id: impl Into<String>,
        instance_id: impl Into<String>,
        operation: OperationType,
    ) -> Self {
        Self {
            application: type_ref.application.clone(),
            type_name: type_ref.type_name.clone(),
            instance_list_id: instance_list_id.into(),
            instance_id: instance_id.into(),
            operation,
        }
    }

    /// 该实体类型是否支持 MOVE
    pub fn is_movable(&self, movable_types: &[TypeRef]) -> bool {
        movable_types.iter().any(|type_ref| type_ref.matches(self))
    }
}

/// 推断出的实例修改类型，只在合并时按需计算，从不存储
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityModification {
    Create,
    Update,
    Move,
    Delete,
}

impl EntityModification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Move => "MOVE",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for EntityModification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 查找指定实例、指定操作的事件
pub fn get_event_of_type<'a>(
    events: &'a [EntityUpdate],
    operation: OperationType,
    instance_id: &str,
) -> Option<&'a EntityUpdate> {
    events
        .iter()
        .find(|event| event.operation == operation && event.instance_id == instance_id)
}

pub fn contains_event_of_type(
    events: &[EntityUpdate],
    operation: OperationType,
    instance_id: &str,
) -> bool {
    get_event_of_type(events, operation, instance_id).is_some()
}

/// 计算事件集合中某个实例的修改类型
///
/// 以集合中该实例的第一条事件为准：
/// - CREATE / DELETE 且类型可移动、集合中同时存在相反操作 → MOVE
/// - 否则按原操作返回
///
/// 集合中没有该实例的事件时返回一致性错误。
pub fn batch_mod(
    events: &[EntityUpdate],
    instance_id: &str,
    movable_types: &[TypeRef],
) -> Result<EntityModification> {
    let event = events
        .iter()
        .find(|event| event.instance_id == instance_id)
        .ok_or_else(|| {
            EventQueueError::violation(format!("Batch does not have events for {}", instance_id))
        })?;

    let modification = match event.operation {
        OperationType::Create => {
            if event.is_movable(movable_types)
                && contains_event_of_type(events, OperationType::Delete, instance_id)
            {
                EntityModification::Move
            } else {
                EntityModification::Create
            }
        }
        OperationType::Update => EntityModification::Update,
        OperationType::Delete => {
            if event.is_movable(movable_types)
                && contains_event_of_type(events, OperationType::Create, instance_id)
            {
                EntityModification::Move
            } else {
                EntityModification::Delete
            }
        }
    };

    Ok(modification)
}
