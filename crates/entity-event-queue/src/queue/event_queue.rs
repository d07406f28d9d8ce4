use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::entity::{
    batch_mod, contains_event_of_type, get_event_of_type, EntityModification, EntityUpdate,
    OperationType, TypeRef,
};
use crate::error::{EventQueueError, Result};

use super::batch::QueuedBatch;
use super::config::EventQueueConfig;
use super::events::QueueEvent;
use super::processor::{BatchProcessor, ProcessError};
use super::stats::EventQueueStats;

#[derive(Debug, Default)]
struct Counters {
    batches_added: u64,
    batches_optimized_away: u64,
    events_merged: u64,
    batches_processed: u64,
    transient_failures: u64,
    processing_failures: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    /// 待处理批次，最早的在前
    pending: VecDeque<QueuedBatch>,

    /// 实例 ID -> 持有该实例最新未处理事件的批次 key
    last_operation_for_entity: HashMap<String, u64>,

    /// 正在处理的批次 key，处理中的批次不可再修改
    processing: Option<u64>,

    paused: bool,

    /// 处理循环任务是否存活
    loop_running: bool,

    /// 一致性错误原因，clear() 前拒绝新批次
    halted: Option<String>,

    next_key: u64,
    counters: Counters,
}

impl QueueState {
    fn allocate_key(&mut self) -> u64 {
        self.next_key += 1;
        self.next_key
    }

    fn position_of(&self, key: u64) -> Option<usize> {
        self.pending.iter().position(|batch| batch.key == key)
    }

    /// 查找可以合并的目标批次位置
    ///
    /// 没有记录、记录指向处理中的批次、或分组不同时不合并。
    fn merge_target(&self, instance_id: &str, group_id: &str) -> Option<usize> {
        let key = *self.last_operation_for_entity.get(instance_id)?;
        if self.processing == Some(key) {
            return None;
        }
        let index = self.position_of(key)?;
        if self.pending[index].group_id != group_id {
            return None;
        }
        Some(index)
    }

    fn optimizing_add_events(
        &mut self,
        new_batch: &mut QueuedBatch,
        new_events: &[EntityUpdate],
        movable_types: &[TypeRef],
    ) -> Result<()> {
        for new_event in new_events {
            let instance_id = new_event.instance_id.as_str();

            let Some(target) = self.merge_target(instance_id, &new_batch.group_id) else {
                new_batch.events.push(new_event.clone());
                continue;
            };

            let new_mod = batch_mod(new_events, instance_id, movable_types)?;
            let last_mod = batch_mod(&self.pending[target].events, instance_id, movable_types)?;

            match (new_mod, last_mod) {
                (
                    EntityModification::Update,
                    EntityModification::Create | EntityModification::Update,
                ) => {
                    // 之前的事件还未处理，处理时会直接下载最新版本
                    debug!("Dropping UPDATE for {} after pending {}", instance_id, last_mod);
                }
                (EntityModification::Update, EntityModification::Move) => {
                    // MOVE 不修改实体内容，两者都需要
                    new_batch.events.push(new_event.clone());
                }
                (EntityModification::Update, EntityModification::Delete) => {
                    return Err(EventQueueError::violation("UPDATE not allowed after DELETE"));
                }
                (EntityModification::Move, _) if new_event.operation == OperationType::Delete => {
                    // 只处理 MOVE 的 CREATE 部分
                }
                (EntityModification::Move, EntityModification::Create) => {
                    self.pending[target].replace(new_event.clone());
                }
                (EntityModification::Move, EntityModification::Update) => {
                    // 实例已不在原位置，UPDATE 无法下载，改为原位置 DELETE + 新位置 CREATE
                    let delete = get_event_of_type(new_events, OperationType::Delete, instance_id)
                        .cloned()
                        .ok_or_else(|| move_without_delete(instance_id))?;
                    self.pending[target].replace(delete);
                    new_batch.events.push(new_event.clone());
                }
                (EntityModification::Move, EntityModification::Move) => {
                    // 合并为从最初位置到最终位置的一次移动
                    let batch = &mut self.pending[target];
                    let old_delete =
                        get_event_of_type(&batch.events, OperationType::Delete, instance_id)
                            .cloned()
                            .ok_or_else(|| move_without_delete(instance_id))?;
                    batch.replace(new_event.clone());
                    batch.events.insert(0, old_delete);
                }
                (EntityModification::Move, EntityModification::Delete) => {
                    return Err(EventQueueError::violation("MOVE not allowed after DELETE"));
                }
                (EntityModification::Delete, _) => {
                    self.absorb_delete(new_batch, new_event);
                }
                (
                    EntityModification::Create,
                    EntityModification::Delete | EntityModification::Create,
                ) => {
                    // 可能是自定义 ID 的实例被重新创建
                    new_batch.events.push(new_event.clone());
                }
                (new_mod, last_mod) => {
                    return Err(EventQueueError::violation(format!(
                        "Impossible modification combination {} {} {}",
                        last_mod,
                        new_mod,
                        serde_json::to_string(new_event).unwrap_or_default()
                    )));
                }
            }
        }

        Ok(())
    }

    /// DELETE 吸收之前未处理的 MOVE 以及该实例的其他全部事件
    fn absorb_delete(&mut self, new_batch: &mut QueuedBatch, new_event: &EntityUpdate) {
        let instance_id = new_event.instance_id.as_str();
        let processing = self.processing;

        let first_move = self.pending.iter().position(|batch| {
            Some(batch.key) != processing
                && contains_event_of_type(&batch.events, OperationType::Delete, instance_id)
        });

        match first_move {
            Some(index) => {
                // 实例最终会被删除，不需要在新位置创建，只保留 MOVE 的 DELETE
                let batch = &mut self.pending[index];
                if let Some(position) = batch.events.iter().position(|event| {
                    event.instance_id == instance_id && event.operation == OperationType::Create
                }) {
                    batch.events.remove(position);
                }
                let key = batch.key;
                self.last_operation_for_entity.insert(instance_id.to_string(), key);
                debug!("DELETE for {} absorbed into batch {}", instance_id, batch.batch_id);
            }
            None => new_batch.events.push(new_event.clone()),
        }

        self.remove_events_for_instance(instance_id, first_move.map_or(0, |index| index + 1));
    }

    /// 从 start 开始的未处理批次中移除该实例的事件，并丢弃因此变空的批次
    fn remove_events_for_instance(&mut self, instance_id: &str, start: usize) {
        let processing = self.processing;
        let mut position = 0usize;

        self.pending.retain_mut(|batch| {
            let index = position;
            position += 1;
            if index < start || Some(batch.key) == processing {
                return true;
            }
            batch.remove_instance(instance_id);
            !batch.is_empty()
        });

        let stale = match self.last_operation_for_entity.get(instance_id) {
            Some(&key) => !self
                .pending
                .iter()
                .any(|batch| batch.key == key && batch.mentions(instance_id)),
            None => false,
        };
        if stale {
            self.last_operation_for_entity.remove(instance_id);
        }
    }
}

fn move_without_delete(instance_id: &str) -> EventQueueError {
    EventQueueError::violation(format!("MOVE without DELETE for {}", instance_id))
}

struct Inner {
    config: EventQueueConfig,
    processor: Arc<dyn BatchProcessor>,
    state: Mutex<QueueState>,
    events: broadcast::Sender<QueueEvent>,
    /// 处理循环是否在运行
    running: watch::Sender<bool>,
}

impl Inner {
    async fn process_event_batches(self: Arc<Self>) {
        while let Some(batch) = self.next_batch() {
            let key = batch.key;
            let batch_id = batch.batch_id.clone();

            let outcome = AssertUnwindSafe(self.processor.process(batch))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(ProcessError::Other("batch processor panicked".to_string()))
                });

            if !self.finish_batch(key, &batch_id, outcome) {
                break;
            }
        }
    }

    /// 取出队首批次并标记为处理中；没有可处理的批次时结束循环
    fn next_batch(&self) -> Option<QueuedBatch> {
        let mut state = self.state.lock();
        let next = if state.paused || state.halted.is_some() {
            None
        } else {
            state.pending.front().cloned()
        };

        match next {
            Some(batch) => {
                state.processing = Some(batch.key);
                debug!("Processing batch {} ({} events)", batch.batch_id, batch.events.len());
                Some(batch)
            }
            None => {
                state.loop_running = false;
                self.running.send_replace(false);
                None
            }
        }
    }

    /// 处理结果回写，返回循环是否继续
    fn finish_batch(
        &self,
        key: u64,
        batch_id: &str,
        outcome: std::result::Result<(), ProcessError>,
    ) -> bool {
        let mut state = self.state.lock();

        if state.processing != Some(key) {
            // 处理期间队列被清空
            debug!("Batch {} was cleared while processing, discarding outcome", batch_id);
            return true;
        }
        state.processing = None;

        match outcome {
            Ok(()) => {
                let finished = match state.position_of(key) {
                    Some(index) => state.pending.remove(index),
                    None => None,
                };
                if let Some(batch) = finished {
                    // 处理完的批次不再参与合并
                    for event in &batch.events {
                        if state.last_operation_for_entity.get(&event.instance_id) == Some(&key) {
                            state.last_operation_for_entity.remove(&event.instance_id);
                        }
                    }
                    state.counters.batches_processed += 1;
                    debug!("Batch {} processed", batch_id);
                    let _ = self.events.send(QueueEvent::BatchProcessed {
                        batch_id: batch.batch_id,
                        group_id: batch.group_id,
                        event_count: batch.events.len(),
                    });
                }
                true
            }
            Err(error) => {
                state.loop_running = false;
                self.running.send_replace(false);

                if error.is_transient() {
                    state.counters.transient_failures += 1;
                    warn!("Event queue suspended at batch {}: {}", batch_id, error);
                    let _ = self.events.send(QueueEvent::ProcessingSuspended {
                        batch_id: batch_id.to_string(),
                        error,
                    });
                } else {
                    state.counters.processing_failures += 1;
                    error!("Uncaught event queue error at batch {}: {}", batch_id, error);
                    let _ = self.events.send(QueueEvent::ProcessingFailed {
                        batch_id: batch_id.to_string(),
                        error,
                    });
                }
                false
            }
        }
    }
}

/// 实体事件队列
///
/// 按到达顺序保存批次，在批次开始处理前合并同一实例的事件，
/// 并串行调用处理回调。可以廉价克隆，所有克隆共享同一个队列。
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("EventQueue")
            .field("pending", &state.pending.len())
            .field("processing", &state.processing.is_some())
            .field("paused", &state.paused)
            .field("halted", &state.halted)
            .finish()
    }
}

impl EventQueue {
    /// 创建事件队列
    ///
    /// 处理循环 spawn 在当前 tokio 运行时上，需要在运行时内调用
    /// `add` / `resume` / `start` 才会开始处理，见 [`EventQueue::start`]。
    pub fn new(config: EventQueueConfig, processor: impl BatchProcessor) -> Self {
        Self::with_processor(config, Arc::new(processor))
    }

    pub fn with_processor(config: EventQueueConfig, processor: Arc<dyn BatchProcessor>) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let (running, _) = watch::channel(false);
        debug!(
            "Event queue {} created (optimization_enabled={})",
            crate::version::version_string(),
            config.optimization_enabled
        );

        Self {
            inner: Arc::new(Inner {
                config,
                processor,
                state: Mutex::new(QueueState::default()),
                events,
                running,
            }),
        }
    }

    /// 按顺序添加多个批次，遇到一致性错误时停止
    pub fn add_batches(&self, batches: &[QueuedBatch]) -> Result<()> {
        for batch in batches {
            self.add(&batch.batch_id, &batch.group_id, &batch.events)?;
        }
        Ok(())
    }

    /// 添加一个批次
    ///
    /// 返回批次是否被加入队列（`false` 表示事件已全部合并到之前的批次中）。
    /// 未暂停时会启动处理循环。在 tokio 运行时之外调用时批次照常入队并返回
    /// `Ok`，但不会被处理，直到在运行时内再次调用 `add` / `resume` / `start`。
    #[instrument(skip(self, events), fields(event_count = events.len()))]
    pub fn add(&self, batch_id: &str, group_id: &str, events: &[EntityUpdate]) -> Result<bool> {
        let added = {
            let mut state = self.inner.state.lock();
            if let Some(reason) = &state.halted {
                return Err(EventQueueError::Halted(reason.clone()));
            }

            let key = state.allocate_key();
            let mut new_batch =
                QueuedBatch::with_key(key, batch_id.to_string(), group_id.to_string());

            if self.inner.config.optimization_enabled {
                let movable_types = &self.inner.config.movable_types;
                let merged = state.optimizing_add_events(&mut new_batch, events, movable_types);
                if let Err(err) = merged {
                    error!("Event queue halted while adding batch {}: {}", batch_id, err);
                    state.halted = Some(err.to_string());
                    let _ = self.inner.events.send(QueueEvent::Halted {
                        reason: err.to_string(),
                    });
                    return Err(err);
                }
            } else {
                new_batch.events.extend_from_slice(events);
            }

            state.counters.batches_added += 1;
            state.counters.events_merged += events.len().saturating_sub(new_batch.len()) as u64;

            if new_batch.is_empty() {
                state.counters.batches_optimized_away += 1;
                debug!("Batch {} optimized away", batch_id);
                false
            } else {
                for event in &new_batch.events {
                    state.last_operation_for_entity.insert(event.instance_id.clone(), key);
                }
                state.pending.push_back(new_batch);
                true
            }
        };

        self.start();
        Ok(added)
    }

    /// 启动处理循环（已有批次在处理或循环已在运行时不做任何事）
    ///
    /// 当前线程不在 tokio 运行时内时只记录 warn 日志，批次留在队列中。
    pub fn start(&self) {
        let mut state = self.inner.state.lock();
        if state.processing.is_some() || state.loop_running {
            return;
        }
        if state.paused || state.halted.is_some() || state.pending.is_empty() {
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Cannot start event queue outside of a tokio runtime: {}", e);
                return;
            }
        };

        state.loop_running = true;
        self.inner.running.send_replace(true);
        handle.spawn(Arc::clone(&self.inner).process_event_batches());
    }

    /// 暂停：不再取新批次，处理中的批次允许完成
    pub fn pause(&self) {
        self.inner.state.lock().paused = true;
        info!("Event queue paused");
    }

    /// 恢复并重新启动处理循环
    pub fn resume(&self) {
        self.inner.state.lock().paused = false;
        info!("Event queue resumed");
        self.start();
    }

    /// 清空全部待处理批次和合并状态（全量重新同步时使用）
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let dropped_batches = {
            let mut state = self.inner.state.lock();
            let dropped = state.pending.len();
            state.pending.clear();
            state.last_operation_for_entity.clear();
            state.processing = None;
            state.halted = None;
            dropped
        };

        info!("Event queue cleared, dropped {} batches", dropped_batches);
        let _ = self.inner.events.send(QueueEvent::Cleared { dropped_batches });
    }

    /// 订阅队列事件
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// 等待处理循环停止（队列处理完、暂停、或因错误停止）
    pub async fn wait_idle(&self) {
        let mut running = self.inner.running.subscribe();
        let _ = running.wait_for(|running| !*running).await;
    }

    /// 待处理批次快照，最早的在前（包括处理中的批次）
    pub fn pending_batches(&self) -> Vec<QueuedBatch> {
        self.inner.state.lock().pending.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().pending.is_empty()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.state.lock().processing.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    pub fn is_halted(&self) -> bool {
        self.inner.state.lock().halted.is_some()
    }

    /// 持有该实例最新未处理事件的批次 ID
    pub fn last_operation_batch(&self, instance_id: &str) -> Option<String> {
        let state = self.inner.state.lock();
        let key = *state.last_operation_for_entity.get(instance_id)?;
        state
            .pending
            .iter()
            .find(|batch| batch.key == key)
            .map(|batch| batch.batch_id.clone())
    }

    /// 获取队列统计
    pub fn stats(&self) -> EventQueueStats {
        let state = self.inner.state.lock();
        let counters = &state.counters;

        EventQueueStats {
            batches_added: counters.batches_added,
            batches_optimized_away: counters.batches_optimized_away,
            events_merged: counters.events_merged,
            batches_processed: counters.batches_processed,
            transient_failures: counters.transient_failures,
            processing_failures: counters.processing_failures,
            pending_batches: state.pending.len(),
            pending_events: state.pending.iter().map(QueuedBatch::len).sum(),
            processing: state.processing.is_some(),
        }
    }
}
