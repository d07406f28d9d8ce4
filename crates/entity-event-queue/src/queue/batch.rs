use serde::{Deserialize, Serialize};

use crate::entity::EntityUpdate;

/// 待处理批次
///
/// `key` 是队列内部分配的标识，用于判断「是否是同一个批次」
/// （处理中标记、最后操作索引）。批次顺序只由队列中的位置决定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedBatch {
    #[serde(skip)]
    pub(crate) key: u64,
    pub batch_id: String,
    pub group_id: String,
    pub events: Vec<EntityUpdate>,
}

impl QueuedBatch {
    pub fn new(
        batch_id: impl Into<String>,
        group_id: impl Into<String>,
        events: Vec<EntityUpdate>,
    ) -> Self {
        Self {
            key: 0,
            batch_id: batch_id.into(),
            group_id: group_id.into(),
            events,
        }
    }

    pub(crate) fn with_key(key: u64, batch_id: String, group_id: String) -> Self {
        Self {
            key,
            batch_id,
            group_id,
            events: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// 批次中是否有该实例的事件
    pub fn mentions(&self, instance_id: &str) -> bool {
        self.events.iter().any(|event| event.instance_id == instance_id)
    }

    /// 用新事件替换该实例的全部事件，新事件放在原第一条事件的位置
    pub(crate) fn replace(&mut self, update: EntityUpdate) {
        let position = self
            .events
            .iter()
            .position(|event| event.instance_id == update.instance_id);
        self.events.retain(|event| event.instance_id != update.instance_id);
        match position {
            Some(index) => self.events.insert(index, update),
            None => self.events.push(update),
        }
    }

    /// 移除该实例的全部事件，返回移除数量
    pub(crate) fn remove_instance(&mut self, instance_id: &str) -> usize {
        let before = self.events.len();
        self.events.retain(|event| event.instance_id != instance_id);
        before - self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{OperationType, TypeRef};

    fn mail(list: &str, id: &str, operation: OperationType) -> EntityUpdate {
        EntityUpdate::new(&TypeRef::mail(), list, id, operation)
    }

    #[test]
    fn replace_keeps_position() {
        let mut batch = QueuedBatch::new(
            "b1",
            "g1",
            vec![
                mail("inbox", "a", OperationType::Create),
                mail("inbox", "x", OperationType::Delete),
                mail("archive", "x", OperationType::Create),
                mail("inbox", "b", OperationType::Create),
            ],
        );

        batch.replace(mail("trash", "x", OperationType::Create));

        let ids: Vec<_> = batch
            .events
            .iter()
            .map(|e| (e.instance_id.as_str(), e.instance_list_id.as_str()))
            .collect();
        assert_eq!(ids, vec![("a", "inbox"), ("x", "trash"), ("b", "inbox")]);
    }

    #[test]
    fn remove_instance_reports_count() {
        let mut batch = QueuedBatch::new(
            "b1",
            "g1",
            vec![
                mail("inbox", "x", OperationType::Delete),
                mail("archive", "x", OperationType::Create),
            ],
        );

        assert_eq!(batch.remove_instance("y"), 0);
        assert_eq!(batch.remove_instance("x"), 2);
        assert!(batch.is_empty());
        assert!(!batch.mentions("x"));
    }
}
