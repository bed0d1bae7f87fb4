//! 过滤下推穿过内连接
//!
//! 按合取项的列归属拆分：只引用左输入列的下推到左侧，只引用右
//! 输入列的下推到右侧，跨两侧的残余留在连接之上。列归属以依赖组
//! 的输出列名判定，同名列左侧优先。

use std::sync::Arc;

use crate::core::error::DBResult;
use crate::core::expression::Expression;
use crate::query::optimizer::context::OptContext;
use crate::query::optimizer::group::{GroupId, OptGroupNode};
use crate::query::optimizer::pattern::{MatchedResult, Pattern};
use crate::query::optimizer::rule::{rule_failed, OptRule, TransformResult};
use crate::query::planner::plan::node_config::FilterNode;
use crate::query::planner::plan::{PlanNode, PlanNodeKind};

pub struct PushFilterDownInnerJoinRule;

struct SplitConjuncts {
    left: Vec<Expression>,
    right: Vec<Expression>,
    remainder: Vec<Expression>,
}

fn split_by_side(cond: &Expression, left_cols: &[String], right_cols: &[String]) -> SplitConjuncts {
    let mut split = SplitConjuncts {
        left: Vec::new(),
        right: Vec::new(),
        remainder: Vec::new(),
    };
    for conjunct in cond.split_conjuncts() {
        if conjunct.contains_aggregate() {
            split.remainder.push(conjunct);
            continue;
        }
        let cols = conjunct.referenced_columns();
        if cols.iter().all(|c| left_cols.contains(c)) {
            split.left.push(conjunct);
        } else if cols.iter().all(|c| right_cols.contains(c)) {
            split.right.push(conjunct);
        } else {
            split.remainder.push(conjunct);
        }
    }
    split
}

impl PushFilterDownInnerJoinRule {
    /// 在 side 组之上插入过滤组，返回新的依赖组 id
    fn push_side(
        &self,
        ctx: &mut OptContext,
        template: &PlanNode,
        side_group: GroupId,
        conjuncts: Vec<Expression>,
    ) -> DBResult<GroupId> {
        let Some(condition) = Expression::fold_conjuncts(conjuncts) else {
            return Ok(side_group);
        };
        let side_cols = ctx.group_col_names(side_group)?;
        let mut filter = template
            .clone_config(ctx.id_gen())
            .with_kind(PlanNodeKind::Filter(FilterNode { condition }));
        filter.set_col_names(side_cols);
        Ok(ctx.add_group(vec![OptGroupNode::new(Arc::new(filter), vec![side_group])]))
    }
}

impl OptRule for PushFilterDownInnerJoinRule {
    fn name(&self) -> &'static str {
        "PushFilterDownInnerJoinRule"
    }

    fn pattern(&self) -> Pattern {
        Pattern::of("Filter").with_dep(Pattern::of("InnerJoin"))
    }

    fn match_rule(&self, ctx: &OptContext, matched: &MatchedResult) -> DBResult<bool> {
        let filter_plan = matched.node(ctx)?.plan_node.clone();
        let cond = &filter_plan
            .as_filter()
            .ok_or_else(|| rule_failed(self.name(), "matched node is not a filter"))?
            .condition;

        let join_node = matched.dep(0)?.node(ctx)?;
        if join_node.dep_groups.len() != 2 {
            return Ok(false);
        }
        let left_cols = ctx.group_col_names(join_node.dep_groups[0])?;
        let right_cols = ctx.group_col_names(join_node.dep_groups[1])?;

        let split = split_by_side(cond, &left_cols, &right_cols);
        Ok(!split.left.is_empty() || !split.right.is_empty())
    }

    fn transform(
        &self,
        ctx: &mut OptContext,
        matched: &MatchedResult,
    ) -> DBResult<TransformResult> {
        let filter_plan = matched.node(ctx)?.plan_node.clone();
        let join_node = matched.dep(0)?.node(ctx)?;
        let join_plan = join_node.plan_node.clone();
        let (left_gid, right_gid) = (join_node.dep_groups[0], join_node.dep_groups[1]);

        let cond = filter_plan
            .as_filter()
            .ok_or_else(|| rule_failed(self.name(), "matched node is not a filter"))?
            .condition
            .clone();

        let left_cols = ctx.group_col_names(left_gid)?;
        let right_cols = ctx.group_col_names(right_gid)?;
        let split = split_by_side(&cond, &left_cols, &right_cols);

        let new_left = self.push_side(ctx, &filter_plan, left_gid, split.left)?;
        let new_right = self.push_side(ctx, &filter_plan, right_gid, split.right)?;

        let new_join = join_plan.clone_config(ctx.id_gen());
        let join_gnode = OptGroupNode::new(Arc::new(new_join), vec![new_left, new_right]);

        match Expression::fold_conjuncts(split.remainder) {
            None => Ok(TransformResult::substitute(join_gnode)),
            Some(remainder) => {
                let join_gid = ctx.add_group(vec![join_gnode]);
                let top = filter_plan
                    .clone_config(ctx.id_gen())
                    .with_kind(PlanNodeKind::Filter(FilterNode {
                        condition: remainder,
                    }));
                Ok(TransformResult::substitute(OptGroupNode::new(
                    Arc::new(top),
                    vec![join_gid],
                )))
            }
        }
    }
}
