//! 查询优化器
//!
//! 贪心规则改写引擎：计划镜像为组图，规则按注册顺序反复应用至
//! 不动点，再物化回计划 DAG。没有代价模型，替代式规则直接生效。

pub mod context;
pub mod engine;
pub mod group;
pub mod pattern;
pub mod rule;
pub mod rules;

pub use context::{OptContext, OptimizationStats};
pub use engine::{Optimizer, RuleSet};
pub use group::{GroupId, GroupState, OptGroup, OptGroupNode};
pub use pattern::{MatchedResult, Pattern};
pub use rule::{OptRule, TransformResult};
