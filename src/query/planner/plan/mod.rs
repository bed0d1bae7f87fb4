//! 计划图模型

pub mod execution_plan;
pub mod node;
pub mod node_config;

pub use execution_plan::ExecutionPlan;
pub use node::{NodeArity, PlanNode, PlanNodeKind};
pub use node_config::*;
