//! 过滤下推穿过聚合
//!
//! 仅当过滤条件只引用分组键时可下推：分组键在聚合前后值不变。
//! 引用聚合结果列（HAVING 语义）的条件必须留在聚合之上。

use std::sync::Arc;

use crate::core::error::DBResult;
use crate::query::optimizer::context::OptContext;
use crate::query::optimizer::group::OptGroupNode;
use crate::query::optimizer::pattern::{MatchedResult, Pattern};
use crate::query::optimizer::rule::{rule_failed, OptRule, TransformResult};

pub struct PushFilterDownAggregateRule;

impl OptRule for PushFilterDownAggregateRule {
    fn name(&self) -> &'static str {
        "PushFilterDownAggregateRule"
    }

    fn pattern(&self) -> Pattern {
        Pattern::of("Filter").with_dep(Pattern::of("Aggregate"))
    }

    fn match_rule(&self, ctx: &OptContext, matched: &MatchedResult) -> DBResult<bool> {
        let filter_plan = matched.node(ctx)?.plan_node.clone();
        let cond = &filter_plan
            .as_filter()
            .ok_or_else(|| rule_failed(self.name(), "matched node is not a filter"))?
            .condition;
        if cond.contains_aggregate() {
            return Ok(false);
        }

        let agg_plan = matched.dep(0)?.node(ctx)?.plan_node.clone();
        let agg = agg_plan
            .as_aggregate()
            .ok_or_else(|| rule_failed(self.name(), "matched dependency is not an aggregate"))?;

        let referenced = cond.referenced_columns();
        Ok(referenced.iter().all(|c| agg.group_keys.contains(c)))
    }

    fn transform(
        &self,
        ctx: &mut OptContext,
        matched: &MatchedResult,
    ) -> DBResult<TransformResult> {
        let filter_plan = matched.node(ctx)?.plan_node.clone();
        let agg_node = matched.dep(0)?.node(ctx)?;
        let agg_plan = agg_node.plan_node.clone();
        let agg_deps = agg_node.dep_groups.clone();

        let input_cols = agg_deps
            .first()
            .map(|g| ctx.group_col_names(*g))
            .transpose()?
            .unwrap_or_default();

        let mut new_filter = filter_plan.clone_config(ctx.id_gen());
        new_filter.set_col_names(input_cols);
        let filter_gid = ctx.add_group(vec![OptGroupNode::new(Arc::new(new_filter), agg_deps)]);

        let new_agg = agg_plan.clone_config(ctx.id_gen());
        Ok(TransformResult::substitute(OptGroupNode::new(
            Arc::new(new_agg),
            vec![filter_gid],
        )))
    }
}
