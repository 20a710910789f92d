//! Batched delivery: the persisted event queue and the timer that drains it.

pub mod queue;
pub mod scheduler;

pub use queue::{BatchQueue, QueueLimits};
pub use scheduler::{FlushScheduler, FlushTarget, SchedulerState};
