//! 执行器模块
//!
//! 每种计划节点对应一个执行器；工厂按计划 DAG 组装调度表。

pub mod base;
pub mod data;
pub mod factory;
pub mod logic;
pub mod storage_access;

pub use base::{BaseExecutor, Executor, ExecutorStats};
pub use factory::ExecutorFactory;
