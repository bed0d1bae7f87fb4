//! 优化器引擎
//!
//! 计划 DAG 先 1:1 镜像为组图，按注册顺序对每个组反复应用规则，
//! 直至一整轮 pass 无任何规则命中（不动点），再从组图物化回计划。
//! 轮数受 max_iteration_rounds 限制，超限视为规则集合不收敛，报硬错误。

use std::sync::Arc;

use log::{debug, trace};

use crate::config::OptimizerConfig;
use crate::core::error::{DBResult, OptimizerError};
use crate::query::context::QueryContext;
use crate::query::optimizer::context::OptContext;
use crate::query::optimizer::group::{GroupId, GroupState};
use crate::query::optimizer::rule::OptRule;
use crate::query::optimizer::rules::{
    CombineFilterRule, IndexScanRule, PushFilterDownAggregateRule, PushFilterDownInnerJoinRule,
    PushFilterDownProjectRule, PushLimitDownProjectRule, TopNRule,
};
use crate::query::planner::plan::ExecutionPlan;

/// 命名规则组；组的注册顺序即应用顺序
pub struct RuleSet {
    name: &'static str,
    rules: Vec<Arc<dyn OptRule>>,
}

impl RuleSet {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rules: Vec::new(),
        }
    }

    pub fn add_rule(mut self, rule: Arc<dyn OptRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn rules(&self) -> &[Arc<dyn OptRule>] {
        &self.rules
    }
}

pub struct Optimizer {
    rule_sets: Vec<RuleSet>,
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            rule_sets: Vec::new(),
            config,
        }
    }

    /// 启动时显式注册全部规则；同组内先注册者先尝试
    pub fn with_default_rules(config: OptimizerConfig) -> Self {
        let rewrite = RuleSet::new("RewriteRules")
            .add_rule(Arc::new(CombineFilterRule))
            .add_rule(Arc::new(PushFilterDownProjectRule))
            .add_rule(Arc::new(PushFilterDownAggregateRule))
            .add_rule(Arc::new(PushFilterDownInnerJoinRule))
            .add_rule(Arc::new(TopNRule))
            .add_rule(Arc::new(PushLimitDownProjectRule));
        let access = RuleSet::new("IndexRules").add_rule(Arc::new(IndexScanRule));

        let mut optimizer = Self::new(config);
        optimizer.add_rule_set(rewrite);
        optimizer.add_rule_set(access);
        optimizer
    }

    pub fn add_rule_set(&mut self, rule_set: RuleSet) {
        self.rule_sets.push(rule_set);
    }

    pub fn optimize(&self, qctx: &QueryContext, plan: &ExecutionPlan) -> DBResult<ExecutionPlan> {
        let mut ctx = OptContext::new(qctx);
        let root = ctx.convert_plan(&plan.root)?;
        ctx.group_mut(root)?.root_group = true;

        let max_rounds = self.config.max_iteration_rounds.max(1);
        let mut rounds = 0usize;
        loop {
            ctx.changed = false;
            ctx.stats.passes += 1;
            ctx.reset_states();
            self.explore_group(&mut ctx, root)?;
            if !ctx.changed {
                break;
            }
            rounds += 1;
            if rounds >= max_rounds {
                return Err(OptimizerError::NoFixpoint(max_rounds).into());
            }
        }

        let new_root = ctx.materialize(root)?;
        debug!(
            "optimizer done: {} passes, {} rule applications",
            ctx.stats.passes, ctx.stats.rules_applied
        );
        Ok(ExecutionPlan::new(new_root))
    }

    fn explore_group(&self, ctx: &mut OptContext, group_id: GroupId) -> DBResult<()> {
        match ctx.group(group_id)?.state {
            GroupState::Exploring | GroupState::Stable => return Ok(()),
            GroupState::Unexplored => {}
        }
        ctx.group_mut(group_id)?.state = GroupState::Exploring;

        // 下推类规则先于依赖组，合并类规则在依赖组稳定后收尾
        self.apply_rules(ctx, group_id, false)?;

        let children = ctx.child_groups(group_id)?;
        for child in children {
            self.explore_group(ctx, child)?;
        }

        self.apply_rules(ctx, group_id, true)?;

        ctx.group_mut(group_id)?.state = GroupState::Stable;
        Ok(())
    }

    /// 每组每轮每条规则至多应用一次，剩余机会交给下一轮 pass；
    /// 不收敛的规则集合由轮数上限兜底
    fn apply_rules(&self, ctx: &mut OptContext, group_id: GroupId, deps_first: bool) -> DBResult<()> {
        for rule_set in &self.rule_sets {
            for rule in rule_set.rules() {
                if rule.deps_first() != deps_first {
                    continue;
                }
                let Some(matched) = rule.pattern().match_group(ctx, group_id)? else {
                    continue;
                };
                if !rule.match_rule(ctx, &matched)? {
                    continue;
                }
                let result = rule.transform(ctx, &matched)?;
                if result.is_noop() {
                    continue;
                }
                ctx.apply_transform(group_id, matched.node_id, result)?;
                ctx.changed = true;
                ctx.stats.rules_applied += 1;
                trace!(
                    "rule {}/{} fired on group {}",
                    rule_set.name(),
                    rule.name(),
                    group_id
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expression::{BinaryOp, Expression};
    use crate::query::planner::plan::node_config::*;
    use crate::query::planner::plan::{PlanNode, PlanNodeKind};

    fn plan_node(
        qctx: &QueryContext,
        kind: PlanNodeKind,
        deps: Vec<Arc<PlanNode>>,
        cols: &[&str],
    ) -> Arc<PlanNode> {
        let mut node = PlanNode::new(&qctx.id_gen, kind, deps).expect("plan node");
        node.set_col_names(cols.iter().map(|c| c.to_string()).collect());
        Arc::new(node)
    }

    fn filter(cond: Expression) -> PlanNodeKind {
        PlanNodeKind::Filter(FilterNode { condition: cond })
    }

    fn gt(col: &str, v: i64) -> Expression {
        Expression::binary(BinaryOp::Gt, Expression::column(col), Expression::literal(v))
    }

    #[test]
    fn test_optimize_merges_adjacent_filters() {
        let qctx = QueryContext::new();
        let start = plan_node(&qctx, PlanNodeKind::Start, vec![], &[]);
        let scan = plan_node(
            &qctx,
            PlanNodeKind::ScanVertices(ScanVerticesNode::default()),
            vec![start],
            &["age", "name"],
        );
        let f1 = plan_node(&qctx, filter(gt("age", 18)), vec![scan], &["age", "name"]);
        let f2 = plan_node(&qctx, filter(gt("age", 30)), vec![f1], &["age", "name"]);

        let optimizer = Optimizer::with_default_rules(OptimizerConfig::default());
        let optimized = optimizer
            .optimize(&qctx, &ExecutionPlan::new(f2))
            .expect("optimize");

        // 两个相邻过滤折叠为一个，条件为合取
        let root = &optimized.root;
        let cond = &root.as_filter().expect("filter root").condition;
        assert_eq!(cond.split_conjuncts().len(), 2);
        assert_eq!(root.dependencies()[0].name(), "ScanVertices");
    }

    #[test]
    fn test_optimize_is_idempotent() {
        let qctx = QueryContext::new();
        let start = plan_node(&qctx, PlanNodeKind::Start, vec![], &[]);
        let scan = plan_node(
            &qctx,
            PlanNodeKind::ScanVertices(ScanVerticesNode::default()),
            vec![start],
            &["age"],
        );
        let f1 = plan_node(&qctx, filter(gt("age", 18)), vec![scan], &["age"]);
        let sort = plan_node(
            &qctx,
            PlanNodeKind::Sort(SortNode {
                factors: vec![OrderFactor::desc("age")],
            }),
            vec![f1],
            &["age"],
        );
        let limit = plan_node(
            &qctx,
            PlanNodeKind::Limit(LimitNode {
                offset: 0,
                count: 10,
            }),
            vec![sort],
            &["age"],
        );

        let optimizer = Optimizer::with_default_rules(OptimizerConfig::default());
        let once = optimizer
            .optimize(&qctx, &ExecutionPlan::new(limit))
            .expect("first run");
        let twice = optimizer.optimize(&qctx, &once).expect("second run");

        assert_eq!(once.root.name(), "TopN");
        assert_eq!(twice.format_tree(), once.format_tree());
    }

    #[test]
    fn test_limit_over_sort_becomes_topn() {
        let qctx = QueryContext::new();
        let start = plan_node(&qctx, PlanNodeKind::Start, vec![], &[]);
        let scan = plan_node(
            &qctx,
            PlanNodeKind::ScanVertices(ScanVerticesNode::default()),
            vec![start],
            &["age"],
        );
        let sort = plan_node(
            &qctx,
            PlanNodeKind::Sort(SortNode {
                factors: vec![OrderFactor::asc("age")],
            }),
            vec![scan],
            &["age"],
        );
        let limit = plan_node(
            &qctx,
            PlanNodeKind::Limit(LimitNode {
                offset: 0,
                count: 5,
            }),
            vec![sort],
            &["age"],
        );

        let optimizer = Optimizer::with_default_rules(OptimizerConfig::default());
        let optimized = optimizer
            .optimize(&qctx, &ExecutionPlan::new(limit))
            .expect("optimize");

        let root = &optimized.root;
        match root.kind() {
            PlanNodeKind::TopN(t) => {
                assert_eq!(t.count, 5);
                assert_eq!(t.factors.len(), 1);
            }
            other => panic!("期望 TopN，实际是 {}", other.name()),
        }
        assert_eq!(root.dependencies()[0].name(), "ScanVertices");
    }

    #[test]
    fn test_runaway_rule_hits_round_guard() {
        // 永远命中且每次都产出新候选的规则：轮数上限必须兜底
        struct FlipFlopRule;

        impl OptRule for FlipFlopRule {
            fn name(&self) -> &'static str {
                "FlipFlopRule"
            }

            fn pattern(&self) -> crate::query::optimizer::pattern::Pattern {
                crate::query::optimizer::pattern::Pattern::of("Filter")
            }

            fn transform(
                &self,
                ctx: &mut OptContext,
                matched: &crate::query::optimizer::pattern::MatchedResult,
            ) -> DBResult<crate::query::optimizer::rule::TransformResult> {
                let node = matched.node(ctx)?;
                let plan = node.plan_node.clone();
                let deps = node.dep_groups.clone();
                let clone = plan.clone_config(ctx.id_gen());
                Ok(crate::query::optimizer::rule::TransformResult::substitute(
                    crate::query::optimizer::group::OptGroupNode::new(Arc::new(clone), deps),
                ))
            }
        }

        let qctx = QueryContext::new();
        let start = plan_node(&qctx, PlanNodeKind::Start, vec![], &[]);
        let f = plan_node(&qctx, filter(gt("age", 1)), vec![start], &["age"]);

        let config = OptimizerConfig {
            max_iteration_rounds: 4,
        };
        let mut optimizer = Optimizer::new(config);
        optimizer.add_rule_set(RuleSet::new("Broken").add_rule(Arc::new(FlipFlopRule)));

        let err = optimizer
            .optimize(&qctx, &ExecutionPlan::new(f))
            .unwrap_err();
        assert!(err.to_string().contains("fixpoint"));
    }

    #[test]
    fn test_diamond_sharing_survives_optimization() {
        let qctx = QueryContext::new();
        let start = plan_node(&qctx, PlanNodeKind::Start, vec![], &[]);
        let scan = plan_node(
            &qctx,
            PlanNodeKind::ScanVertices(ScanVerticesNode::default()),
            vec![start],
            &["v"],
        );
        let left = plan_node(&qctx, PlanNodeKind::Dedup, vec![scan.clone()], &["v"]);
        let right = plan_node(&qctx, PlanNodeKind::PassThrough, vec![scan], &["v"]);
        let union = plan_node(&qctx, PlanNodeKind::Union, vec![left, right], &["v"]);

        let optimizer = Optimizer::with_default_rules(OptimizerConfig::default());
        let optimized = optimizer
            .optimize(&qctx, &ExecutionPlan::new(union))
            .expect("optimize");

        // 菱形上游只物化一次：两条路径下到同一个 Arc
        let root = &optimized.root;
        let l = &root.dependencies()[0].dependencies()[0];
        let r = &root.dependencies()[1].dependencies()[0];
        assert!(Arc::ptr_eq(l, r));
    }
}
