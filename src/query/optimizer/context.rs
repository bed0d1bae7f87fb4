//! 优化上下文
//!
//! 持有组竞技场与计划节点到组的备忘映射。同一个计划节点（按 id）
//! 只镜像为一个组，菱形共享在组图中保持为共享边，物化时
//! 再按组备忘恢复为共享 Arc。

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::error::{DBResult, OptimizerError};
use crate::query::context::{IndexCatalog, QueryContext};
use crate::query::optimizer::group::{GroupId, GroupState, OptGroup, OptGroupNode};
use crate::query::optimizer::rule::TransformResult;
use crate::query::planner::plan::node_config::{LoopNode, SelectNode};
use crate::query::planner::plan::{PlanNode, PlanNodeKind};
use crate::utils::IdGenerator;

/// 一次优化运行的计数
#[derive(Debug, Default, Clone, Copy)]
pub struct OptimizationStats {
    pub passes: usize,
    pub rules_applied: usize,
}

pub struct OptContext {
    id_gen: Arc<IdGenerator>,
    index_catalog: Arc<IndexCatalog>,
    groups: HashMap<GroupId, OptGroup>,
    next_group_id: GroupId,
    /// 计划节点 id -> 组 id，保证菱形上游只转换一次
    node_group_memo: HashMap<i64, GroupId>,
    pub changed: bool,
    pub stats: OptimizationStats,
}

impl OptContext {
    pub fn new(qctx: &QueryContext) -> Self {
        Self {
            id_gen: qctx.id_gen.clone(),
            index_catalog: qctx.index_catalog.clone(),
            groups: HashMap::new(),
            next_group_id: 0,
            node_group_memo: HashMap::new(),
            changed: false,
            stats: OptimizationStats::default(),
        }
    }

    pub fn id_gen(&self) -> &IdGenerator {
        &self.id_gen
    }

    pub fn index_catalog(&self) -> &IndexCatalog {
        &self.index_catalog
    }

    pub fn add_group(&mut self, nodes: Vec<OptGroupNode>) -> GroupId {
        let id = self.next_group_id;
        self.next_group_id += 1;
        self.groups.insert(id, OptGroup::new(id, nodes));
        id
    }

    pub fn group(&self, id: GroupId) -> DBResult<&OptGroup> {
        self.groups
            .get(&id)
            .ok_or_else(|| OptimizerError::GroupNotFound(id).into())
    }

    pub fn group_mut(&mut self, id: GroupId) -> DBResult<&mut OptGroup> {
        self.groups
            .get_mut(&id)
            .ok_or_else(|| OptimizerError::GroupNotFound(id).into())
    }

    pub fn group_node(&self, group_id: GroupId, node_id: i64) -> DBResult<&OptGroupNode> {
        self.group(group_id)?.find_node(node_id).ok_or_else(|| {
            OptimizerError::PlanConversion(format!(
                "node {} no longer present in group {}",
                node_id, group_id
            ))
            .into()
        })
    }

    /// 组内首个候选的输出列名；过滤下推时用来填充新节点的列集
    pub fn group_col_names(&self, id: GroupId) -> DBResult<Vec<String>> {
        let group = self.group(id)?;
        Ok(group
            .nodes
            .first()
            .map(|n| n.plan_node.col_names().to_vec())
            .unwrap_or_default())
    }

    /// 组的全部子组（依赖组 + 控制流子图根），供遍历递归
    pub fn child_groups(&self, id: GroupId) -> DBResult<Vec<GroupId>> {
        let group = self.group(id)?;
        let mut out = Vec::new();
        for node in &group.nodes {
            for g in node.dep_groups.iter().chain(node.body_groups.iter()) {
                if !out.contains(g) {
                    out.push(*g);
                }
            }
        }
        Ok(out)
    }

    pub fn reset_states(&mut self) {
        for group in self.groups.values_mut() {
            group.state = GroupState::Unexplored;
        }
    }

    /// 计划 DAG -> 组图，按节点 id 备忘
    pub fn convert_plan(&mut self, node: &Arc<PlanNode>) -> DBResult<GroupId> {
        if let Some(gid) = self.node_group_memo.get(&node.id()) {
            return Ok(*gid);
        }

        let mut dep_groups = Vec::with_capacity(node.dependencies().len());
        for dep in node.dependencies() {
            dep_groups.push(self.convert_plan(dep)?);
        }

        let body_groups = match node.kind() {
            PlanNodeKind::Loop(l) => vec![self.convert_plan(&l.body)?],
            PlanNodeKind::Select(s) => vec![
                self.convert_plan(&s.then_plan)?,
                self.convert_plan(&s.else_plan)?,
            ],
            _ => Vec::new(),
        };

        let gnode = OptGroupNode::new(node.clone(), dep_groups).with_bodies(body_groups);
        let gid = self.add_group(vec![gnode]);
        self.node_group_memo.insert(node.id(), gid);
        Ok(gid)
    }

    /// 规则变换落地：按 erase 标志清理候选并追加新候选。
    /// 变换后组不允许为空，空组无法物化。
    pub fn apply_transform(
        &mut self,
        group_id: GroupId,
        curr_node_id: i64,
        result: TransformResult,
    ) -> DBResult<()> {
        let group = self.group_mut(group_id)?;
        if result.erase_all {
            group.nodes.clear();
        } else if result.erase_curr {
            group.nodes.retain(|n| n.node_id != curr_node_id);
        }
        group.nodes.extend(result.new_group_nodes);
        if group.nodes.is_empty() {
            return Err(OptimizerError::PlanConversion(format!(
                "transform left group {} without alternatives",
                group_id
            ))
            .into());
        }
        Ok(())
    }

    /// 组图 -> 计划 DAG，取每组首个候选；共享组物化为共享 Arc
    pub fn materialize(&self, root: GroupId) -> DBResult<Arc<PlanNode>> {
        let mut memo = HashMap::new();
        self.materialize_group(root, &mut memo)
    }

    fn materialize_group(
        &self,
        id: GroupId,
        memo: &mut HashMap<GroupId, Arc<PlanNode>>,
    ) -> DBResult<Arc<PlanNode>> {
        if let Some(node) = memo.get(&id) {
            return Ok(node.clone());
        }

        let group = self.group(id)?;
        let gnode = group.nodes.first().ok_or_else(|| {
            OptimizerError::PlanConversion(format!("group {} has no alternatives", id))
        })?;

        let mut deps = Vec::with_capacity(gnode.dep_groups.len());
        for dep in &gnode.dep_groups {
            deps.push(self.materialize_group(*dep, memo)?);
        }

        let kind = match gnode.plan_node.kind() {
            PlanNodeKind::Loop(l) => {
                let body_gid = gnode.body_groups.first().copied().ok_or_else(|| {
                    OptimizerError::PlanConversion("loop without body group".to_string())
                })?;
                PlanNodeKind::Loop(LoopNode {
                    body: self.materialize_group(body_gid, memo)?,
                    condition: l.condition.clone(),
                })
            }
            PlanNodeKind::Select(s) => {
                if gnode.body_groups.len() != 2 {
                    return Err(OptimizerError::PlanConversion(
                        "select without both branch groups".to_string(),
                    )
                    .into());
                }
                PlanNodeKind::Select(SelectNode {
                    condition: s.condition.clone(),
                    then_plan: self.materialize_group(gnode.body_groups[0], memo)?,
                    else_plan: self.materialize_group(gnode.body_groups[1], memo)?,
                })
            }
            other => other.clone(),
        };

        let node = Arc::new(gnode.plan_node.with_kind(kind).with_deps(deps)?);
        memo.insert(id, node.clone());
        Ok(node)
    }
}
