//! 相邻过滤折叠
//!
//! Filter(a) -> Filter(b) 折叠为 Filter(a AND b)，直接挂到下层过滤的
//! 依赖组上。过滤链每次缩短一个节点，多级链在后续 pass 继续折叠。

use std::sync::Arc;

use crate::core::error::DBResult;
use crate::core::expression::Expression;
use crate::query::optimizer::context::OptContext;
use crate::query::optimizer::group::OptGroupNode;
use crate::query::optimizer::pattern::{MatchedResult, Pattern};
use crate::query::optimizer::rule::{rule_failed, OptRule, TransformResult};
use crate::query::planner::plan::node_config::FilterNode;
use crate::query::planner::plan::PlanNodeKind;

pub struct CombineFilterRule;

impl OptRule for CombineFilterRule {
    fn name(&self) -> &'static str {
        "CombineFilterRule"
    }

    fn pattern(&self) -> Pattern {
        Pattern::of("Filter").with_dep(Pattern::of("Filter"))
    }

    fn transform(
        &self,
        ctx: &mut OptContext,
        matched: &MatchedResult,
    ) -> DBResult<TransformResult> {
        let upper = matched.node(ctx)?;
        let upper_plan = upper.plan_node.clone();

        let lower = matched.dep(0)?.node(ctx)?;
        let lower_plan = lower.plan_node.clone();
        let lower_deps = lower.dep_groups.clone();

        let upper_cond = upper_plan
            .as_filter()
            .ok_or_else(|| rule_failed(self.name(), "matched node is not a filter"))?
            .condition
            .clone();
        let lower_cond = lower_plan
            .as_filter()
            .ok_or_else(|| rule_failed(self.name(), "matched dependency is not a filter"))?
            .condition
            .clone();

        let combined = upper_plan
            .clone_config(ctx.id_gen())
            .with_kind(PlanNodeKind::Filter(FilterNode {
                condition: Expression::and(upper_cond, lower_cond),
            }));

        Ok(TransformResult::substitute(OptGroupNode::new(
            Arc::new(combined),
            lower_deps,
        )))
    }
}
