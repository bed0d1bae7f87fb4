//! 规划器模块
//!
//! 解析与语义校验属于外部协作方；本 crate 只定义它们产出的
//! 计划图模型（plan/）。

pub mod plan;

pub use plan::{ExecutionPlan, PlanNode, PlanNodeKind};
