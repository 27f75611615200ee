// 核心数据结构和类型定义

pub mod types;
pub mod state;
pub mod error;
pub mod config;
pub mod queue;

pub use types::*;
pub use state::*;
pub use error::*;
pub use config::*;
pub use queue::{bounded_queue, Popped, PushError, QueueConsumer, QueueProducer, TryPopped};
