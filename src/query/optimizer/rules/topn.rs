//! Limit + Sort 合并为 TopN
//!
//! 无偏移的 Limit 紧跟 Sort 时改写为单个 TopN 节点，
//! 排序与截断在一个执行器内完成。

use std::sync::Arc;

use crate::core::error::DBResult;
use crate::query::optimizer::context::OptContext;
use crate::query::optimizer::group::OptGroupNode;
use crate::query::optimizer::pattern::{MatchedResult, Pattern};
use crate::query::optimizer::rule::{rule_failed, OptRule, TransformResult};
use crate::query::planner::plan::node_config::TopNNode;
use crate::query::planner::plan::{PlanNode, PlanNodeKind};

pub struct TopNRule;

impl OptRule for TopNRule {
    fn name(&self) -> &'static str {
        "TopNRule"
    }

    fn pattern(&self) -> Pattern {
        Pattern::of("Limit").with_dep(Pattern::of("Sort"))
    }

    fn match_rule(&self, ctx: &OptContext, matched: &MatchedResult) -> DBResult<bool> {
        let limit_plan = matched.node(ctx)?.plan_node.clone();
        let limit = limit_plan
            .as_limit()
            .ok_or_else(|| rule_failed(self.name(), "matched node is not a limit"))?;
        Ok(limit.offset == 0)
    }

    fn transform(
        &self,
        ctx: &mut OptContext,
        matched: &MatchedResult,
    ) -> DBResult<TransformResult> {
        let limit_plan = matched.node(ctx)?.plan_node.clone();
        let sort_node = matched.dep(0)?.node(ctx)?;
        let sort_plan = sort_node.plan_node.clone();
        let sort_deps = sort_node.dep_groups.clone();

        let limit = limit_plan
            .as_limit()
            .ok_or_else(|| rule_failed(self.name(), "matched node is not a limit"))?;
        let sort = sort_plan
            .as_sort()
            .ok_or_else(|| rule_failed(self.name(), "matched dependency is not a sort"))?;

        let mut topn = PlanNode::detached(
            ctx.id_gen(),
            PlanNodeKind::TopN(TopNNode {
                factors: sort.factors.clone(),
                offset: limit.offset,
                count: limit.count,
            }),
        );
        topn.set_col_names(limit_plan.col_names().to_vec());

        Ok(TransformResult::substitute(OptGroupNode::new(
            Arc::new(topn),
            sort_deps,
        )))
    }
}
