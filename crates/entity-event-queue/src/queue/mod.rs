//! 实体事件队列
//!
//! 职责：
//! - 按到达顺序保存待处理批次
//! - 合并尚未处理的批次中同一实例的事件
//! - 串行调用处理回调，把批次应用到本地存储

pub mod batch;
pub mod config;
pub mod event_queue;
pub mod events;
pub mod processor;
pub mod stats;

pub use batch::QueuedBatch;
pub use config::EventQueueConfig;
pub use event_queue::EventQueue;
pub use events::QueueEvent;
pub use processor::{processor_fn, BatchProcessor, FnProcessor, ProcessError};
pub use stats::EventQueueStats;
