//! 规则模式匹配
//!
//! 模式是以节点种类名为标签的小树，匹配从某个组的候选节点出发，
//! 沿依赖组逐层下探。组内取第一个命中的候选。

use crate::core::error::{DBResult, OptimizerError};
use crate::query::optimizer::context::OptContext;
use crate::query::optimizer::group::{GroupId, OptGroupNode};

#[derive(Debug, Clone)]
pub struct Pattern {
    kinds: Vec<&'static str>,
    deps: Vec<Pattern>,
}

impl Pattern {
    pub fn of(kind: &'static str) -> Self {
        Self {
            kinds: vec![kind],
            deps: Vec::new(),
        }
    }

    pub fn any_of(kinds: &[&'static str]) -> Self {
        Self {
            kinds: kinds.to_vec(),
            deps: Vec::new(),
        }
    }

    pub fn with_dep(mut self, dep: Pattern) -> Self {
        self.deps.push(dep);
        self
    }

    pub fn match_group(
        &self,
        ctx: &OptContext,
        group_id: GroupId,
    ) -> DBResult<Option<MatchedResult>> {
        let group = ctx.group(group_id)?;
        for node in &group.nodes {
            if let Some(matched) = self.match_node(ctx, group_id, node)? {
                return Ok(Some(matched));
            }
        }
        Ok(None)
    }

    fn match_node(
        &self,
        ctx: &OptContext,
        group_id: GroupId,
        node: &OptGroupNode,
    ) -> DBResult<Option<MatchedResult>> {
        if !self.kinds.contains(&node.name()) {
            return Ok(None);
        }
        if self.deps.len() > node.dep_groups.len() {
            return Ok(None);
        }

        let mut deps = Vec::with_capacity(self.deps.len());
        for (dep_pattern, dep_group) in self.deps.iter().zip(node.dep_groups.iter()) {
            match dep_pattern.match_group(ctx, *dep_group)? {
                Some(m) => deps.push(m),
                None => return Ok(None),
            }
        }

        Ok(Some(MatchedResult {
            group_id,
            node_id: node.node_id,
            deps,
        }))
    }
}

/// 命中结果：组/节点坐标树，规则经坐标回查上下文取配置
#[derive(Debug, Clone)]
pub struct MatchedResult {
    pub group_id: GroupId,
    pub node_id: i64,
    pub deps: Vec<MatchedResult>,
}

impl MatchedResult {
    pub fn node<'a>(&self, ctx: &'a OptContext) -> DBResult<&'a OptGroupNode> {
        ctx.group_node(self.group_id, self.node_id)
    }

    pub fn dep(&self, idx: usize) -> DBResult<&MatchedResult> {
        self.deps.get(idx).ok_or_else(|| {
            OptimizerError::PlanConversion(format!("matched result has no dependency {}", idx))
                .into()
        })
    }
}
