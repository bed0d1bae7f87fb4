//! 优化组与组节点
//!
//! 组是等价计划片段的容器，组节点是组内的一个候选：
//! 计划节点配置 + 指向依赖组的边。组图中的依赖边以 GroupId
//! 表达，计划节点自身携带的 deps 接线在组图里不具权威性，
//! 物化时按依赖组重建。

use std::sync::Arc;

use crate::query::planner::plan::PlanNode;

pub type GroupId = usize;

/// 组的探索状态：每轮 pass 开始时全部重置为 Unexplored。
/// Exploring 兼作递归防环哨兵。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Unexplored,
    Exploring,
    Stable,
}

/// 组内候选节点
#[derive(Debug, Clone)]
pub struct OptGroupNode {
    pub node_id: i64,
    pub plan_node: Arc<PlanNode>,
    pub dep_groups: Vec<GroupId>,
    /// 控制流子图根：Loop 为 [body]，Select 为 [then, else]
    pub body_groups: Vec<GroupId>,
}

impl OptGroupNode {
    pub fn new(plan_node: Arc<PlanNode>, dep_groups: Vec<GroupId>) -> Self {
        Self {
            node_id: plan_node.id(),
            plan_node,
            dep_groups,
            body_groups: Vec::new(),
        }
    }

    pub fn with_bodies(mut self, body_groups: Vec<GroupId>) -> Self {
        self.body_groups = body_groups;
        self
    }

    pub fn name(&self) -> &'static str {
        self.plan_node.name()
    }
}

/// 优化组
#[derive(Debug)]
pub struct OptGroup {
    pub id: GroupId,
    pub nodes: Vec<OptGroupNode>,
    pub state: GroupState,
    pub root_group: bool,
}

impl OptGroup {
    pub fn new(id: GroupId, nodes: Vec<OptGroupNode>) -> Self {
        Self {
            id,
            nodes,
            state: GroupState::Unexplored,
            root_group: false,
        }
    }

    pub fn find_node(&self, node_id: i64) -> Option<&OptGroupNode> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }
}
