//! 查询处理模块
//!
//! 计划图（planner）经优化器（optimizer）改写后，由工厂
//! （executor）映射为执行器调度表，交异步调度器（scheduler）
//! 驱动执行，结果写入执行上下文（context）。

pub mod context;
pub mod executor;
pub mod optimizer;
pub mod planner;
pub mod scheduler;

pub use context::{ExecutionContext, IndexCatalog, IndexSchema, QueryContext};
pub use optimizer::Optimizer;
pub use planner::{ExecutionPlan, PlanNode, PlanNodeKind};
pub use scheduler::AsyncScheduler;
