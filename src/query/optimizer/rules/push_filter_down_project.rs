//! 过滤下推穿过投影
//!
//! Filter -> Project 改写为 Project -> Filter，过滤条件中的列引用
//! 按投影映射（输出别名 -> 输入表达式）改写。条件含聚合、或引用了
//! 聚合产出的投影列、或引用列无映射时不下推。

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::error::DBResult;
use crate::core::expression::Expression;
use crate::query::optimizer::context::OptContext;
use crate::query::optimizer::group::OptGroupNode;
use crate::query::optimizer::pattern::{MatchedResult, Pattern};
use crate::query::optimizer::rule::{rule_failed, OptRule, TransformResult};
use crate::query::planner::plan::node_config::{FilterNode, ProjectNode};
use crate::query::planner::plan::PlanNodeKind;

pub struct PushFilterDownProjectRule;

fn projection_mapping(project: &ProjectNode) -> HashMap<String, Expression> {
    project
        .columns
        .iter()
        .filter(|c| !c.expression.contains_aggregate())
        .map(|c| (c.alias.clone(), c.expression.clone()))
        .collect()
}

impl OptRule for PushFilterDownProjectRule {
    fn name(&self) -> &'static str {
        "PushFilterDownProjectRule"
    }

    fn pattern(&self) -> Pattern {
        Pattern::of("Filter").with_dep(Pattern::of("Project"))
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

        let project_plan = matched.dep(0)?.node(ctx)?.plan_node.clone();
        let project = project_plan
            .as_project()
            .ok_or_else(|| rule_failed(self.name(), "matched dependency is not a project"))?;
        Ok(cond.rewrite_columns(&projection_mapping(project)).is_some())
    }

    fn transform(
        &self,
        ctx: &mut OptContext,
        matched: &MatchedResult,
    ) -> DBResult<TransformResult> {
        let filter_plan = matched.node(ctx)?.plan_node.clone();
        let project_node = matched.dep(0)?.node(ctx)?;
        let project_plan = project_node.plan_node.clone();
        let project_deps = project_node.dep_groups.clone();

        let cond = filter_plan
            .as_filter()
            .ok_or_else(|| rule_failed(self.name(), "matched node is not a filter"))?
            .condition
            .clone();
        let project = project_plan
            .as_project()
            .ok_or_else(|| rule_failed(self.name(), "matched dependency is not a project"))?;

        let rewritten = cond
            .rewrite_columns(&projection_mapping(project))
            .ok_or_else(|| rule_failed(self.name(), "filter references unmapped column"))?;

        let input_cols = project_deps
            .first()
            .map(|g| ctx.group_col_names(*g))
            .transpose()?
            .unwrap_or_default();

        let mut new_filter = filter_plan
            .clone_config(ctx.id_gen())
            .with_kind(PlanNodeKind::Filter(FilterNode {
                condition: rewritten,
            }));
        new_filter.set_col_names(input_cols);
        let filter_gid = ctx.add_group(vec![OptGroupNode::new(Arc::new(new_filter), project_deps)]);

        let new_project = project_plan.clone_config(ctx.id_gen());
        Ok(TransformResult::substitute(OptGroupNode::new(
            Arc::new(new_project),
            vec![filter_gid],
        )))
    }
}
