//! 调度器模块

pub mod async_scheduler;
pub mod schedule;

pub use async_scheduler::AsyncScheduler;
pub use schedule::{ExecutionSchedule, LoopControl, SelectControl};
