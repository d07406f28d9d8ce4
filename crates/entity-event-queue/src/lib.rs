//! Entity Event Queue - 实体变更事件队列
//!
//! 接收同步流推送的实体变更批次（CREATE / UPDATE / DELETE，以及推断出的 MOVE），
//! 在批次被处理前合并同一实例的冗余或矛盾事件，并通过注入的异步回调
//! 按顺序把批次应用到本地存储。
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use entity_event_queue::{EventQueue, EventQueueConfig, ProcessError, processor_fn};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let queue = EventQueue::new(
//!         EventQueueConfig::default(),
//!         processor_fn(|batch| async move {
//!             println!("应用批次: {} ({} 条事件)", batch.batch_id, batch.events.len());
//!             Ok::<(), ProcessError>(())
//!         }),
//!     );
//!
//!     queue.add("batch-1", "mailbox-1", &[])?;
//!     queue.wait_idle().await;
//!     Ok(())
//! }
//! ```

pub mod entity;
pub mod error;
pub mod queue;
pub mod version;

pub use entity::{batch_mod, EntityModification, EntityUpdate, OperationType, TypeRef};
pub use error::{EventQueueError, Result};
pub use queue::{
    processor_fn, BatchProcessor, EventQueue, EventQueueConfig, EventQueueStats, FnProcessor,
    ProcessError, QueueEvent, QueuedBatch,
};
