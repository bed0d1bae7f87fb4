//! 行数上限下推到邻居扩展
//!
//! Limit -> Project -> GetNeighbors 时把 offset + count 折算为
//! 扫描侧行数上限，存储端提前截断。扫描上已有更紧的上限则不动。
//! Limit 节点保留：下推只是提示，最终截断语义仍在 Limit。

use std::sync::Arc;

use crate::core::error::DBResult;
use crate::query::optimizer::context::OptContext;
use crate::query::optimizer::group::OptGroupNode;
use crate::query::optimizer::pattern::{MatchedResult, Pattern};
use crate::query::optimizer::rule::{rule_failed, OptRule, TransformResult};
use crate::query::planner::plan::PlanNodeKind;

pub struct PushLimitDownProjectRule;

impl OptRule for PushLimitDownProjectRule {
    fn name(&self) -> &'static str {
        "PushLimitDownProjectRule"
    }

    fn pattern(&self) -> Pattern {
        Pattern::of("Limit")
            .with_dep(Pattern::of("Project").with_dep(Pattern::of("GetNeighbors")))
    }

    fn match_rule(&self, ctx: &OptContext, matched: &MatchedResult) -> DBResult<bool> {
        let limit_plan = matched.node(ctx)?.plan_node.clone();
        let limit = limit_plan
            .as_limit()
            .ok_or_else(|| rule_failed(self.name(), "matched node is not a limit"))?;
        if limit.offset < 0 || limit.count < 0 {
            return Ok(false);
        }
        let threshold = limit.offset + limit.count;

        let gn_plan = matched.dep(0)?.dep(0)?.node(ctx)?.plan_node.clone();
        let gn = gn_plan
            .as_get_neighbors()
            .ok_or_else(|| rule_failed(self.name(), "matched leaf is not a neighbor expansion"))?;
        Ok(match gn.limit {
            None => true,
            Some(existing) => existing > threshold,
        })
    }

    fn transform(
        &self,
        ctx: &mut OptContext,
        matched: &MatchedResult,
    ) -> DBResult<TransformResult> {
        let limit_plan = matched.node(ctx)?.plan_node.clone();
        let project_node = matched.dep(0)?.node(ctx)?;
        let project_plan = project_node.plan_node.clone();
        let gn_node = matched.dep(0)?.dep(0)?.node(ctx)?;
        let gn_plan = gn_node.plan_node.clone();
        let gn_deps = gn_node.dep_groups.clone();

        let limit = limit_plan
            .as_limit()
            .ok_or_else(|| rule_failed(self.name(), "matched node is not a limit"))?;
        let threshold = limit.offset + limit.count;

        let mut gn_cfg = gn_plan
            .as_get_neighbors()
            .ok_or_else(|| rule_failed(self.name(), "matched leaf is not a neighbor expansion"))?
            .clone();
        gn_cfg.limit = Some(threshold);

        let new_gn = gn_plan
            .clone_config(ctx.id_gen())
            .with_kind(PlanNodeKind::GetNeighbors(gn_cfg));
        let gn_gid = ctx.add_group(vec![OptGroupNode::new(Arc::new(new_gn), gn_deps)]);

        let new_project = project_plan.clone_config(ctx.id_gen());
        let project_gid = ctx.add_group(vec![OptGroupNode::new(Arc::new(new_project), vec![gn_gid])]);

        let new_limit = limit_plan.clone_config(ctx.id_gen());
        Ok(TransformResult::substitute(OptGroupNode::new(
            Arc::new(new_limit),
            vec![project_gid],
        )))
    }
}
