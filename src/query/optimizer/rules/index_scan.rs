//! 索引选择
//!
//! Filter -> Tag/EdgeIndexFullScan 改写为单个 IndexScan 节点。
//! 过滤先按顶层 OR 拆为析取项，每个析取项独立分解为列上的
//! 关系谓词并独立选索引，产出一个 IndexQueryContext；任一析取项
//! 选不出可用索引则整体放弃改写。
//!
//! 选择优先级：等值前缀长度优先，其次是否命中一个范围列；
//! 首字段无谓词的索引不可用。整数域开区间规约为闭区间
//! （> 5 即 >= 6），缺失端用 i64 域边界补齐。
//!
//! 硬错误（而非放弃）：同层混合 AND/OR、同列等值矛盾、
//! 同列等值与范围并存。

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::core::error::{DBResult, OptimizerError};
use crate::core::expression::{compare_values, BinaryOp, Expression};
use crate::core::value::{DataType, Value};
use crate::query::context::{IndexField, IndexSchema};
use crate::query::optimizer::context::OptContext;
use crate::query::optimizer::group::OptGroupNode;
use crate::query::optimizer::pattern::{MatchedResult, Pattern};
use crate::query::optimizer::rule::{rule_failed, OptRule, TransformResult};
use crate::query::planner::plan::node_config::{
    ColumnHint, IndexQueryContext, IndexScanNode, RangeBound,
};
use crate::query::planner::plan::{PlanNode, PlanNodeKind};

pub struct IndexScanRule;

/// 列上的单个关系谓词（列 op 字面量，已归一化为列在左）
#[derive(Debug, Clone)]
struct RelItem {
    column: String,
    op: BinaryOp,
    value: Value,
    expr: Expression,
}

fn flip(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Lt => BinaryOp::Gt,
        BinaryOp::Le => BinaryOp::Ge,
        BinaryOp::Gt => BinaryOp::Lt,
        BinaryOp::Ge => BinaryOp::Le,
        other => other,
    }
}

/// 单个析取项拆解为关系项与索引不可覆盖的残余合取项
fn decompose(expr: &Expression) -> DBResult<(Vec<RelItem>, Vec<Expression>)> {
    let mut items = Vec::new();
    let mut residual = Vec::new();

    for conjunct in expr.split_conjuncts() {
        match &conjunct {
            Expression::Binary { op, left, right } => {
                if op.is_logical() {
                    // split_conjuncts 已展平 AND，此处只可能是嵌在 AND 下的 OR
                    return Err(OptimizerError::Unsupported(
                        "mixed AND/OR filter in index selection".to_string(),
                    )
                    .into());
                }
                if !op.is_relational() || *op == BinaryOp::Ne {
                    residual.push(conjunct.clone());
                    continue;
                }
                match (left.as_ref(), right.as_ref()) {
                    (Expression::Column(c), Expression::Literal(v)) => items.push(RelItem {
                        column: c.clone(),
                        op: *op,
                        value: v.clone(),
                        expr: conjunct.clone(),
                    }),
                    (Expression::Literal(v), Expression::Column(c)) => items.push(RelItem {
                        column: c.clone(),
                        op: flip(*op),
                        value: v.clone(),
                        expr: conjunct.clone(),
                    }),
                    _ => residual.push(conjunct.clone()),
                }
            }
            other => residual.push(other.clone()),
        }
    }

    Ok((items, residual))
}

/// 按列聚拢谓词；等值矛盾与等值/范围并存是语义错误
struct ColumnPredicates {
    eq: BTreeMap<String, (Value, Expression)>,
    ranges: BTreeMap<String, Vec<RelItem>>,
}

fn group_by_column(items: Vec<RelItem>) -> DBResult<ColumnPredicates> {
    let mut eq: BTreeMap<String, (Value, Expression)> = BTreeMap::new();
    let mut ranges: BTreeMap<String, Vec<RelItem>> = BTreeMap::new();

    for item in items {
        if item.op == BinaryOp::Eq {
            match eq.get(&item.column) {
                Some((existing, _)) if *existing != item.value => {
                    return Err(OptimizerError::Semantic(format!(
                        "contradictory equality predicates on column '{}'",
                        item.column
                    ))
                    .into());
                }
                Some(_) => {}
                None => {
                    eq.insert(item.column.clone(), (item.value, item.expr));
                }
            }
        } else {
            ranges.entry(item.column.clone()).or_default().push(item);
        }
    }

    for column in eq.keys() {
        if ranges.contains_key(column) {
            return Err(OptimizerError::Semantic(format!(
                "column '{}' has both equality and range predicates",
                column
            ))
            .into());
        }
    }

    Ok(ColumnPredicates { eq, ranges })
}

/// 索引评分：沿字段前缀消费等值谓词，随后至多消费一个范围列。
/// 首字段无谓词则不可用。
fn score_index(index: &IndexSchema, preds: &ColumnPredicates) -> Option<(usize, usize)> {
    let mut eq_count = 0usize;
    let mut range_count = 0usize;
    for field in &index.fields {
        if preds.eq.contains_key(&field.name) {
            eq_count += 1;
            continue;
        }
        if preds.ranges.contains_key(&field.name) {
            range_count = 1;
        }
        break;
    }
    if eq_count == 0 && range_count == 0 {
        None
    } else {
        Some((eq_count, range_count))
    }
}

/// 开区间规约：整数域 > v 即 >= v+1，< v 即 <= v-1
fn canonical_bound(value: &Value, op: BinaryOp) -> RangeBound {
    match (value, op) {
        (Value::Int(v), BinaryOp::Gt) => RangeBound {
            value: Value::Int(v.saturating_add(1)),
            inclusive: true,
        },
        (Value::Int(v), BinaryOp::Lt) => RangeBound {
            value: Value::Int(v.saturating_sub(1)),
            inclusive: true,
        },
        (_, BinaryOp::Gt) | (_, BinaryOp::Lt) => RangeBound {
            value: value.clone(),
            inclusive: false,
        },
        _ => RangeBound {
            value: value.clone(),
            inclusive: true,
        },
    }
}

fn tighter_lower(a: RangeBound, b: RangeBound) -> DBResult<RangeBound> {
    match compare_values(&a.value, &b.value)? {
        std::cmp::Ordering::Greater => Ok(a),
        std::cmp::Ordering::Less => Ok(b),
        std::cmp::Ordering::Equal => Ok(if !a.inclusive { a } else { b }),
    }
}

fn tighter_upper(a: RangeBound, b: RangeBound) -> DBResult<RangeBound> {
    match compare_values(&a.value, &b.value)? {
        std::cmp::Ordering::Less => Ok(a),
        std::cmp::Ordering::Greater => Ok(b),
        std::cmp::Ordering::Equal => Ok(if !a.inclusive { a } else { b }),
    }
}

/// 同列多个范围谓词合并为单个区间，取更紧的端点
fn range_hint(field: &IndexField, items: &[RelItem]) -> DBResult<ColumnHint> {
    let mut begin: Option<RangeBound> = None;
    let mut end: Option<RangeBound> = None;

    for item in items {
        let bound = canonical_bound(&item.value, item.op);
        match item.op {
            BinaryOp::Gt | BinaryOp::Ge => {
                begin = Some(match begin {
                    None => bound,
                    Some(existing) => tighter_lower(existing, bound)?,
                });
            }
            BinaryOp::Lt | BinaryOp::Le => {
                end = Some(match end {
                    None => bound,
                    Some(existing) => tighter_upper(existing, bound)?,
                });
            }
            _ => {}
        }
    }

    // 整数域缺失端补齐为域边界闭端点
    if field.data_type == DataType::Int {
        begin.get_or_insert(RangeBound {
            value: Value::Int(i64::MIN),
            inclusive: true,
        });
        end.get_or_insert(RangeBound {
            value: Value::Int(i64::MAX),
            inclusive: true,
        });
    }

    Ok(ColumnHint::Range {
        column: field.name.clone(),
        begin,
        end,
    })
}

fn build_hints(
    index: &IndexSchema,
    preds: &ColumnPredicates,
) -> DBResult<(Vec<ColumnHint>, HashSet<String>)> {
    let mut hints = Vec::new();
    let mut consumed = HashSet::new();

    for field in &index.fields {
        if let Some((value, _)) = preds.eq.get(&field.name) {
            hints.push(ColumnHint::Equal {
                column: field.name.clone(),
                value: value.clone(),
            });
            consumed.insert(field.name.clone());
            continue;
        }
        if let Some(items) = preds.ranges.get(&field.name) {
            hints.push(range_hint(field, items)?);
            consumed.insert(field.name.clone());
        }
        break;
    }

    Ok((hints, consumed))
}

/// 为一个析取项选索引并构建查询上下文；无可用索引返回 None
fn build_query_context(
    disjunct: &Expression,
    indexes: &[IndexSchema],
) -> DBResult<Option<IndexQueryContext>> {
    let (items, mut residual) = decompose(disjunct)?;
    let preds = group_by_column(items)?;

    let mut best: Option<(&IndexSchema, (usize, usize))> = None;
    for index in indexes {
        if let Some(score) = score_index(index, &preds) {
            let better = match best {
                None => true,
                Some((_, best_score)) => score > best_score,
            };
            if better {
                best = Some((index, score));
            }
        }
    }
    let Some((index, _)) = best else {
        return Ok(None);
    };

    let (hints, consumed) = build_hints(index, &preds)?;

    // 索引未消费的谓词回落为残余条件，扫描后逐行求值
    for (column, (_, expr)) in &preds.eq {
        if !consumed.contains(column) {
            residual.push(expr.clone());
        }
    }
    for (column, items) in &preds.ranges {
        if !consumed.contains(column) {
            residual.extend(items.iter().map(|i| i.expr.clone()));
        }
    }

    Ok(Some(IndexQueryContext {
        index_name: index.name.clone(),
        column_hints: hints,
        remainder: Expression::fold_conjuncts(residual),
    }))
}

impl OptRule for IndexScanRule {
    fn name(&self) -> &'static str {
        "IndexScanRule"
    }

    fn pattern(&self) -> Pattern {
        Pattern::of("Filter")
            .with_dep(Pattern::any_of(&["TagIndexFullScan", "EdgeIndexFullScan"]))
    }

    fn deps_first(&self) -> bool {
        true
    }

    fn match_rule(&self, ctx: &OptContext, matched: &MatchedResult) -> DBResult<bool> {
        let scan_plan = matched.dep(0)?.node(ctx)?.plan_node.clone();
        let Some(cfg) = scan_plan.as_index_full_scan() else {
            return Ok(false);
        };
        let is_edge = matches!(scan_plan.kind(), PlanNodeKind::EdgeIndexFullScan(_));
        Ok(!ctx
            .index_catalog()
            .indexes_for(&cfg.schema, is_edge)
            .is_empty())
    }

    fn transform(
        &self,
        ctx: &mut OptContext,
        matched: &MatchedResult,
    ) -> DBResult<TransformResult> {
        let filter_plan = matched.node(ctx)?.plan_node.clone();
        let scan_node = matched.dep(0)?.node(ctx)?;
        let scan_plan = scan_node.plan_node.clone();
        let scan_deps = scan_node.dep_groups.clone();

        let cond = filter_plan
            .as_filter()
            .ok_or_else(|| rule_failed(self.name(), "matched node is not a filter"))?
            .condition
            .clone();
        let cfg = scan_plan
            .as_index_full_scan()
            .ok_or_else(|| rule_failed(self.name(), "matched dependency is not an index scan"))?
            .clone();
        let is_edge = matches!(scan_plan.kind(), PlanNodeKind::EdgeIndexFullScan(_));

        let indexes = ctx.index_catalog().indexes_for(&cfg.schema, is_edge);
        if indexes.is_empty() {
            return Ok(TransformResult::unchanged());
        }

        let disjuncts = cond.split_disjuncts();
        let mut contexts = Vec::with_capacity(disjuncts.len());
        for disjunct in &disjuncts {
            match build_query_context(disjunct, &indexes)? {
                Some(qctx) => contexts.push(qctx),
                // 任一析取项无可用索引则整体放弃，过滤保留原位
                None => return Ok(TransformResult::unchanged()),
            }
        }

        let mut scan = PlanNode::detached(
            ctx.id_gen(),
            PlanNodeKind::IndexScan(IndexScanNode {
                schema: cfg.schema.clone(),
                is_edge,
                contexts,
                props: cfg.props.clone(),
                limit: None,
            }),
        );
        scan.set_col_names(filter_plan.col_names().to_vec());

        Ok(TransformResult::replace_all(OptGroupNode::new(
            Arc::new(scan),
            scan_deps,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfig;
    use crate::query::context::QueryContext;
    use crate::query::optimizer::engine::Optimizer;
    use crate::query::planner::plan::node_config::{FilterNode, IndexFullScanNode};
    use crate::query::planner::plan::ExecutionPlan;

    fn register_index(qctx: &QueryContext, name: &str, schema: &str, fields: &[(&str, DataType)]) {
        qctx.index_catalog.register(IndexSchema {
            name: name.to_string(),
            schema: schema.to_string(),
            is_edge: false,
            fields: fields
                .iter()
                .map(|(n, t)| IndexField {
                    name: n.to_string(),
                    data_type: *t,
                })
                .collect(),
        });
    }

    fn filter_over_scan(qctx: &QueryContext, schema: &str, cond: Expression) -> ExecutionPlan {
        let start =
            Arc::new(PlanNode::new(&qctx.id_gen, PlanNodeKind::Start, vec![]).expect("start"));
        let scan = Arc::new(
            PlanNode::new(
                &qctx.id_gen,
                PlanNodeKind::TagIndexFullScan(IndexFullScanNode {
                    schema: schema.to_string(),
                    props: vec!["age".to_string(), "name".to_string()],
                }),
                vec![start],
            )
            .expect("scan"),
        );
        let mut filter = PlanNode::new(
            &qctx.id_gen,
            PlanNodeKind::Filter(FilterNode { condition: cond }),
            vec![scan],
        )
        .expect("filter");
        filter.set_col_names(vec!["age".to_string(), "name".to_string()]);
        ExecutionPlan::new(Arc::new(filter))
    }

    fn col_op(col: &str, op: BinaryOp, v: i64) -> Expression {
        Expression::binary(op, Expression::column(col), Expression::literal(v))
    }

    fn optimize(qctx: &QueryContext, plan: ExecutionPlan) -> DBResult<ExecutionPlan> {
        Optimizer::with_default_rules(OptimizerConfig::default()).optimize(qctx, &plan)
    }

    fn index_scan_of(plan: &ExecutionPlan) -> IndexScanNode {
        match plan.root.kind() {
            PlanNodeKind::IndexScan(s) => s.clone(),
            other => panic!("期望 IndexScan，实际是 {}", other.name()),
        }
    }

    #[test]
    fn test_closed_range_bounds() {
        let qctx = QueryContext::new();
        register_index(&qctx, "idx_age", "person", &[("age", DataType::Int)]);
        let cond = Expression::and(
            col_op("age", BinaryOp::Ge, 5),
            col_op("age", BinaryOp::Le, 10),
        );
        let optimized = optimize(&qctx, filter_over_scan(&qctx, "person", cond)).expect("optimize");

        let scan = index_scan_of(&optimized);
        assert_eq!(scan.contexts.len(), 1);
        let hint = &scan.contexts[0].column_hints[0];
        match hint {
            ColumnHint::Range { begin, end, .. } => {
                assert_eq!(
                    begin.as_ref().map(|b| (&b.value, b.inclusive)),
                    Some((&Value::Int(5), true))
                );
                assert_eq!(
                    end.as_ref().map(|b| (&b.value, b.inclusive)),
                    Some((&Value::Int(10), true))
                );
            }
            other => panic!("期望范围提示，实际是 {:?}", other),
        }
        assert!(scan.contexts[0].remainder.is_none());
    }

    #[test]
    fn test_open_int_bounds_are_tightened() {
        let qctx = QueryContext::new();
        register_index(&qctx, "idx_age", "person", &[("age", DataType::Int)]);
        let cond = Expression::and(
            col_op("age", BinaryOp::Gt, 5),
            col_op("age", BinaryOp::Lt, 10),
        );
        let optimized = optimize(&qctx, filter_over_scan(&qctx, "person", cond)).expect("optimize");

        let scan = index_scan_of(&optimized);
        match &scan.contexts[0].column_hints[0] {
            ColumnHint::Range { begin, end, .. } => {
                // > 5 即 >= 6，< 10 即 <= 9
                assert_eq!(begin.as_ref().map(|b| &b.value), Some(&Value::Int(6)));
                assert_eq!(end.as_ref().map(|b| &b.value), Some(&Value::Int(9)));
            }
            other => panic!("期望范围提示，实际是 {:?}", other),
        }
    }

    #[test]
    fn test_half_open_range_filled_with_domain_bound() {
        let qctx = QueryContext::new();
        register_index(&qctx, "idx_age", "person", &[("age", DataType::Int)]);
        let cond = col_op("age", BinaryOp::Gt, 5);
        let optimized = optimize(&qctx, filter_over_scan(&qctx, "person", cond)).expect("optimize");

        let scan = index_scan_of(&optimized);
        match &scan.contexts[0].column_hints[0] {
            ColumnHint::Range { begin, end, .. } => {
                assert_eq!(begin.as_ref().map(|b| &b.value), Some(&Value::Int(6)));
                assert_eq!(end.as_ref().map(|b| &b.value), Some(&Value::Int(i64::MAX)));
            }
            other => panic!("期望范围提示，实际是 {:?}", other),
        }
    }

    #[test]
    fn test_contradictory_equality_is_semantic_error() {
        let qctx = QueryContext::new();
        register_index(&qctx, "idx_age", "person", &[("age", DataType::Int)]);
        let cond = Expression::and(
            col_op("age", BinaryOp::Eq, 1),
            col_op("age", BinaryOp::Eq, 2),
        );
        let err = optimize(&qctx, filter_over_scan(&qctx, "person", cond)).unwrap_err();
        assert!(err.to_string().contains("semantic error"));
    }

    #[test]
    fn test_equality_and_range_on_same_column_is_semantic_error() {
        let qctx = QueryContext::new();
        register_index(&qctx, "idx_age", "person", &[("age", DataType::Int)]);
        let cond = Expression::and(
            col_op("age", BinaryOp::Eq, 1),
            col_op("age", BinaryOp::Gt, 0),
        );
        let err = optimize(&qctx, filter_over_scan(&qctx, "person", cond)).unwrap_err();
        assert!(err.to_string().contains("semantic error"));
    }

    #[test]
    fn test_mixed_and_or_is_unsupported() {
        let qctx = QueryContext::new();
        register_index(&qctx, "idx_age", "person", &[("age", DataType::Int)]);
        // (age == 1 OR name == "x") AND age > 0：OR 嵌在 AND 之下
        let cond = Expression::and(
            Expression::or(
                col_op("age", BinaryOp::Eq, 1),
                Expression::binary(
                    BinaryOp::Eq,
                    Expression::column("name"),
                    Expression::literal("x"),
                ),
            ),
            col_op("age", BinaryOp::Gt, 0),
        );
        let err = optimize(&qctx, filter_over_scan(&qctx, "person", cond)).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn test_or_with_unindexed_disjunct_declines() {
        let qctx = QueryContext::new();
        register_index(&qctx, "idx_age", "person", &[("age", DataType::Int)]);
        // name 无索引：第二个析取项选不出索引，整体不改写
        let cond = Expression::or(
            col_op("age", BinaryOp::Eq, 1),
            Expression::binary(
                BinaryOp::Eq,
                Expression::column("name"),
                Expression::literal("bob"),
            ),
        );
        let optimized = optimize(&qctx, filter_over_scan(&qctx, "person", cond)).expect("optimize");
        assert!(optimized.root.is_filter());
        assert_eq!(optimized.root.dependencies()[0].name(), "TagIndexFullScan");
    }

    #[test]
    fn test_or_produces_one_context_per_disjunct() {
        let qctx = QueryContext::new();
        register_index(&qctx, "idx_age", "person", &[("age", DataType::Int)]);
        register_index(&qctx, "idx_name", "person", &[("name", DataType::String)]);
        let cond = Expression::or(
            col_op("age", BinaryOp::Eq, 1),
            Expression::binary(
                BinaryOp::Eq,
                Expression::column("name"),
                Expression::literal("bob"),
            ),
        );
        let optimized = optimize(&qctx, filter_over_scan(&qctx, "person", cond)).expect("optimize");

        let scan = index_scan_of(&optimized);
        assert_eq!(scan.contexts.len(), 2);
        assert_eq!(scan.contexts[0].index_name, "idx_age");
        assert_eq!(scan.contexts[1].index_name, "idx_name");
    }

    #[test]
    fn test_unconsumed_predicate_becomes_remainder() {
        let qctx = QueryContext::new();
        register_index(&qctx, "idx_age", "person", &[("age", DataType::Int)]);
        let cond = Expression::and(
            col_op("age", BinaryOp::Eq, 1),
            Expression::binary(
                BinaryOp::Eq,
                Expression::column("name"),
                Expression::literal("bob"),
            ),
        );
        let optimized = optimize(&qctx, filter_over_scan(&qctx, "person", cond)).expect("optimize");

        let scan = index_scan_of(&optimized);
        let qc = &scan.contexts[0];
        assert_eq!(qc.column_hints.len(), 1);
        let remainder = qc.remainder.as_ref().expect("remainder");
        assert!(remainder.referenced_columns().contains("name"));
    }

    #[test]
    fn test_longer_equality_prefix_wins() {
        let qctx = QueryContext::new();
        register_index(&qctx, "idx_age", "person", &[("age", DataType::Int)]);
        register_index(
            &qctx,
            "idx_age_name",
            "person",
            &[("age", DataType::Int), ("name", DataType::String)],
        );
        let cond = Expression::and(
            col_op("age", BinaryOp::Eq, 30),
            Expression::binary(
                BinaryOp::Eq,
                Expression::column("name"),
                Expression::literal("bob"),
            ),
        );
        let optimized = optimize(&qctx, filter_over_scan(&qctx, "person", cond)).expect("optimize");

        let scan = index_scan_of(&optimized);
        assert_eq!(scan.contexts[0].index_name, "idx_age_name");
        assert_eq!(scan.contexts[0].column_hints.len(), 2);
        assert!(scan.contexts[0].remainder.is_none());
    }

    #[test]
    fn test_first_field_unmatched_index_is_inadmissible() {
        let qctx = QueryContext::new();
        // 索引首字段是 name，过滤只约束 age
        register_index(
            &qctx,
            "idx_name_age",
            "person",
            &[("name", DataType::String), ("age", DataType::Int)],
        );
        let cond = col_op("age", BinaryOp::Eq, 1);
        let optimized = optimize(&qctx, filter_over_scan(&qctx, "person", cond)).expect("optimize");
        assert!(optimized.root.is_filter());
    }
}
