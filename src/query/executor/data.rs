//! 行集处理执行器
//!
//! 过滤、投影、排序、截断、聚合、去重、集合算子与哈希连接。
//! 输入的部分成功标记原样传染到输出。

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::core::error::{DBResult, ExpressionError, QueryError};
use crate::core::expression::{compare_values, AggFunc, Expression, RowContext};
use crate::core::value::{DataSet, Row, Value};
use crate::query::context::ExecutionContext;
use crate::query::executor::base::{merge_states, BaseExecutor, Executor, ExecutorStats};
use crate::query::executor::logic::delegate_base;
use crate::query::planner::plan::node_config::{
    AggItem, JoinNode, OrderDirection, OrderFactor, ProjectColumn,
};
use crate::query::planner::plan::PlanNode;
use crate::storage::ResultState;

pub struct FilterExecutor {
    base: BaseExecutor,
    condition: Expression,
}

impl FilterExecutor {
    pub fn new(node: &PlanNode, ctx: Arc<ExecutionContext>, condition: Expression) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            condition,
        }
    }
}

#[async_trait]
impl Executor for FilterExecutor {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let (input, state) = self.base.input_dataset(0)?;
        let mut out = DataSet::new(input.col_names.clone());
        for row in &input.rows {
            let ctx = RowContext {
                col_names: &input.col_names,
                row,
            };
            if self.condition.eval(&ctx)?.is_truthy() {
                out.push_row(row.clone());
            }
        }
        self.base.finish(Value::DataSet(out), state);
        Ok(())
    }
}

pub struct ProjectExecutor {
    base: BaseExecutor,
    columns: Vec<ProjectColumn>,
}

impl ProjectExecutor {
    pub fn new(node: &PlanNode, ctx: Arc<ExecutionContext>, columns: Vec<ProjectColumn>) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            columns,
        }
    }
}

#[async_trait]
impl Executor for ProjectExecutor {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let (input, state) = self.base.input_dataset(0)?;
        let col_names: Vec<String> = self.columns.iter().map(|c| c.alias.clone()).collect();
        let mut out = DataSet::new(col_names);
        for row in &input.rows {
            let ctx = RowContext {
                col_names: &input.col_names,
                row,
            };
            let mut projected = Row::with_capacity(self.columns.len());
            for column in &self.columns {
                projected.push(column.expression.eval(&ctx)?);
            }
            out.push_row(projected);
        }
        self.base.finish(Value::DataSet(out), state);
        Ok(())
    }
}

/// 排序因子解析为列下标后的逐因子比较；不可比的值视为相等
fn resolve_factors(factors: &[OrderFactor], ds: &DataSet) -> DBResult<Vec<(usize, OrderDirection)>> {
    factors
        .iter()
        .map(|f| {
            ds.column_index(&f.column)
                .map(|idx| (idx, f.direction))
                .ok_or_else(|| ExpressionError::UndefinedColumn(f.column.clone()).into())
        })
        .collect()
}

fn compare_rows(a: &Row, b: &Row, resolved: &[(usize, OrderDirection)]) -> Ordering {
    for (idx, direction) in resolved {
        let ord = compare_values(&a[*idx], &b[*idx]).unwrap_or(Ordering::Equal);
        let ord = match direction {
            OrderDirection::Asc => ord,
            OrderDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

pub struct SortExecutor {
    base: BaseExecutor,
    factors: Vec<OrderFactor>,
}

impl SortExecutor {
    pub fn new(node: &PlanNode, ctx: Arc<ExecutionContext>, factors: Vec<OrderFactor>) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            factors,
        }
    }
}

#[async_trait]
impl Executor for SortExecutor {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let (mut input, state) = self.base.input_dataset(0)?;
        let resolved = resolve_factors(&self.factors, &input)?;
        input.rows.sort_by(|a, b| compare_rows(a, b, &resolved));
        self.base.finish(Value::DataSet(input), state);
        Ok(())
    }
}

pub struct LimitExecutor {
    base: BaseExecutor,
    offset: i64,
    count: i64,
}

impl LimitExecutor {
    pub fn new(node: &PlanNode, ctx: Arc<ExecutionContext>, offset: i64, count: i64) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            offset,
            count,
        }
    }
}

#[async_trait]
impl Executor for LimitExecutor {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let (input, state) = self.base.input_dataset(0)?;
        let offset = self.offset.max(0) as usize;
        let count = self.count.max(0) as usize;
        let rows = input
            .rows
            .into_iter()
            .skip(offset)
            .take(count)
            .collect();
        let out = DataSet::with_rows(input.col_names, rows);
        self.base.finish(Value::DataSet(out), state);
        Ok(())
    }
}

/// 排序与截断合并；当前实现为整体排序后切片
pub struct TopNExecutor {
    base: BaseExecutor,
    factors: Vec<OrderFactor>,
    offset: i64,
    count: i64,
}

impl TopNExecutor {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        factors: Vec<OrderFactor>,
        offset: i64,
        count: i64,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            factors,
            offset,
            count,
        }
    }
}

#[async_trait]
impl Executor for TopNExecutor {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let (mut input, state) = self.base.input_dataset(0)?;
        let resolved = resolve_factors(&self.factors, &input)?;
        input.rows.sort_by(|a, b| compare_rows(a, b, &resolved));
        let offset = self.offset.max(0) as usize;
        let count = self.count.max(0) as usize;
        let rows: Vec<Row> = input.rows.into_iter().skip(offset).take(count).collect();
        let out = DataSet::with_rows(input.col_names, rows);
        self.base.finish(Value::DataSet(out), state);
        Ok(())
    }
}

/// 单个聚合函数的累加器
enum AggAcc {
    Count(u64),
    Sum(Option<Value>),
    Min(Option<Value>),
    Max(Option<Value>),
    Avg { sum: f64, count: u64 },
    Collect(Vec<Value>),
}

fn add_values(a: Value, b: &Value) -> DBResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_add(*y))),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(x as f64 + y)),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(x + *y as f64)),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x + y)),
        (a, b) => Err(ExpressionError::TypeMismatch(format!(
            "cannot sum {} and {}",
            a.type_name(),
            b.type_name()
        ))
        .into()),
    }
}

impl AggAcc {
    fn new(func: AggFunc) -> Self {
        match func {
            AggFunc::Count => AggAcc::Count(0),
            AggFunc::Sum => AggAcc::Sum(None),
            AggFunc::Min => AggAcc::Min(None),
            AggFunc::Max => AggAcc::Max(None),
            AggFunc::Avg => AggAcc::Avg { sum: 0.0, count: 0 },
            AggFunc::Collect => AggAcc::Collect(Vec::new()),
        }
    }

    /// NULL 不参与聚合
    fn feed(&mut self, value: Value) -> DBResult<()> {
        if value.is_null() {
            return Ok(());
        }
        match self {
            AggAcc::Count(n) => *n += 1,
            AggAcc::Sum(acc) => {
                *acc = Some(match acc.take() {
                    None => value,
                    Some(current) => add_values(current, &value)?,
                });
            }
            AggAcc::Min(acc) => {
                let replace = match acc {
                    None => true,
                    Some(current) => compare_values(&value, current)? == Ordering::Less,
                };
                if replace {
                    *acc = Some(value);
                }
            }
            AggAcc::Max(acc) => {
                let replace = match acc {
                    None => true,
                    Some(current) => compare_values(&value, current)? == Ordering::Greater,
                };
                if replace {
                    *acc = Some(value);
                }
            }
            AggAcc::Avg { sum, count } => {
                match &value {
                    Value::Int(i) => *sum += *i as f64,
                    Value::Float(f) => *sum += f,
                    other => {
                        return Err(ExpressionError::TypeMismatch(format!(
                            "cannot average {}",
                            other.type_name()
                        ))
                        .into())
                    }
                }
                *count += 1;
            }
            AggAcc::Collect(items) => items.push(value),
        }
        Ok(())
    }

    fn finalize(self) -> Value {
        match self {
            AggAcc::Count(n) => Value::Int(n as i64),
            AggAcc::Sum(acc) | AggAcc::Min(acc) | AggAcc::Max(acc) => {
                acc.unwrap_or(Value::Null)
            }
            AggAcc::Avg { sum, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::Float(sum / count as f64)
                }
            }
            AggAcc::Collect(items) => Value::List(items),
        }
    }
}

pub struct AggregateExecutor {
    base: BaseExecutor,
    group_keys: Vec<String>,
    agg_items: Vec<AggItem>,
}

impl AggregateExecutor {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        group_keys: Vec<String>,
        agg_items: Vec<AggItem>,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            group_keys,
            agg_items,
        }
    }
}

#[async_trait]
impl Executor for AggregateExecutor {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let (input, state) = self.base.input_dataset(0)?;

        let key_indices: Vec<usize> = self
            .group_keys
            .iter()
            .map(|k| {
                input
                    .column_index(k)
                    .ok_or_else(|| ExpressionError::UndefinedColumn(k.clone()))
            })
            .collect::<Result<_, _>>()?;

        // 分组保持首次出现顺序
        let mut group_order: Vec<Row> = Vec::new();
        let mut groups: HashMap<Row, (Vec<AggAcc>, Vec<HashSet<Value>>)> = HashMap::new();

        let mut feed_row = |key: Row, row: &Row, col_names: &[String]| -> DBResult<()> {
            let entry = groups.entry(key.clone()).or_insert_with(|| {
                group_order.push(key);
                (
                    self.agg_items.iter().map(|i| AggAcc::new(i.func)).collect(),
                    self.agg_items.iter().map(|_| HashSet::new()).collect(),
                )
            });
            let ctx = RowContext { col_names, row };
            for (idx, item) in self.agg_items.iter().enumerate() {
                let value = item.arg.eval(&ctx)?;
                if item.distinct && !value.is_null() && !entry.1[idx].insert(value.clone()) {
                    continue;
                }
                entry.0[idx].feed(value)?;
            }
            Ok(())
        };

        for row in &input.rows {
            let key: Row = key_indices.iter().map(|i| row[*i].clone()).collect();
            feed_row(key, row, &input.col_names)?;
        }

        // 无分组键时即使输入为空也产出一行全局聚合
        if self.group_keys.is_empty() && groups.is_empty() {
            groups.insert(
                Vec::new(),
                (
                    self.agg_items.iter().map(|i| AggAcc::new(i.func)).collect(),
                    self.agg_items.iter().map(|_| HashSet::new()).collect(),
                ),
            );
            group_order.push(Vec::new());
        }

        let mut col_names = self.group_keys.clone();
        col_names.extend(self.agg_items.iter().map(|i| i.alias.clone()));
        let mut out = DataSet::new(col_names);
        for key in group_order {
            let (accs, _) = groups.remove(&key).ok_or_else(|| {
                QueryError::Execution("aggregate group disappeared".to_string())
            })?;
            let mut row = key;
            row.extend(accs.into_iter().map(AggAcc::finalize));
            out.push_row(row);
        }

        self.base.finish(Value::DataSet(out), state);
        Ok(())
    }
}

/// 去重，保持首次出现顺序
pub struct DedupExecutor {
    base: BaseExecutor,
}

impl DedupExecutor {
    pub fn new(node: &PlanNode, ctx: Arc<ExecutionContext>) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
        }
    }
}

#[async_trait]
impl Executor for DedupExecutor {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let (input, state) = self.base.input_dataset(0)?;
        let mut seen: HashSet<Row> = HashSet::new();
        let mut out = DataSet::new(input.col_names.clone());
        for row in input.rows {
            if seen.insert(row.clone()) {
                out.push_row(row);
            }
        }
        self.base.finish(Value::DataSet(out), state);
        Ok(())
    }
}

/// N 路合并；所有输入列名必须完全一致
pub struct UnionExecutor {
    base: BaseExecutor,
}

impl UnionExecutor {
    pub fn new(node: &PlanNode, ctx: Arc<ExecutionContext>) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
        }
    }
}

#[async_trait]
impl Executor for UnionExecutor {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let mut states = Vec::new();
        let (first, state) = self.base.input_dataset(0)?;
        states.push(state);
        let mut out = first;

        for idx in 1..self.base.input_count() {
            let (next, state) = self.base.input_dataset(idx)?;
            states.push(state);
            if !out.same_columns(&next) {
                return Err(QueryError::DifferentColumns(format!(
                    "[{}] vs [{}]",
                    out.col_names.join(","),
                    next.col_names.join(",")
                ))
                .into());
            }
            out.rows.extend(next.rows);
        }

        self.base.finish(Value::DataSet(out), merge_states(states));
        Ok(())
    }
}

pub struct IntersectExecutor {
    base: BaseExecutor,
}

impl IntersectExecutor {
    pub fn new(node: &PlanNode, ctx: Arc<ExecutionContext>) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
        }
    }
}

#[async_trait]
impl Executor for IntersectExecutor {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let (left, ls) = self.base.input_dataset(0)?;
        let (right, rs) = self.base.input_dataset(1)?;
        let right_set: HashSet<Row> = right.rows.into_iter().collect();
        let mut emitted: HashSet<Row> = HashSet::new();
        let mut out = DataSet::new(left.col_names.clone());
        for row in left.rows {
            if right_set.contains(&row) && emitted.insert(row.clone()) {
                out.push_row(row);
            }
        }
        self.base
            .finish(Value::DataSet(out), merge_states([ls, rs]));
        Ok(())
    }
}

pub struct MinusExecutor {
    base: BaseExecutor,
}

impl MinusExecutor {
    pub fn new(node: &PlanNode, ctx: Arc<ExecutionContext>) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
        }
    }
}

#[async_trait]
impl Executor for MinusExecutor {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let (left, ls) = self.base.input_dataset(0)?;
        let (right, rs) = self.base.input_dataset(1)?;
        let right_set: HashSet<Row> = right.rows.into_iter().collect();
        let mut out = DataSet::new(left.col_names.clone());
        for row in left.rows {
            if !right_set.contains(&row) {
                out.push_row(row);
            }
        }
        self.base
            .finish(Value::DataSet(out), merge_states([ls, rs]));
        Ok(())
    }
}

/// 哈希连接：右输入按 probe_keys 建表，左输入按 hash_keys 探测
pub struct HashJoinExecutor {
    base: BaseExecutor,
    join: JoinNode,
    left_outer: bool,
}

impl HashJoinExecutor {
    pub fn inner(node: &PlanNode, ctx: Arc<ExecutionContext>, join: JoinNode) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            join,
            left_outer: false,
        }
    }

    pub fn left(node: &PlanNode, ctx: Arc<ExecutionContext>, join: JoinNode) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            join,
            left_outer: true,
        }
    }

    fn eval_keys(exprs: &[Expression], col_names: &[String], row: &Row) -> DBResult<Row> {
        let ctx = RowContext { col_names, row };
        exprs.iter().map(|e| e.eval(&ctx)).collect()
    }
}

#[async_trait]
impl Executor for HashJoinExecutor {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let (left, ls) = self.base.input_dataset(0)?;
        let (right, rs) = self.base.input_dataset(1)?;

        let mut table: HashMap<Row, Vec<usize>> = HashMap::new();
        for (idx, row) in right.rows.iter().enumerate() {
            let key = Self::eval_keys(&self.join.probe_keys, &right.col_names, row)?;
            table.entry(key).or_default().push(idx);
        }

        let mut col_names = left.col_names.clone();
        col_names.extend(right.col_names.iter().cloned());
        let mut out = DataSet::new(col_names);

        let right_width = right.col_names.len();
        for row in &left.rows {
            let key = Self::eval_keys(&self.join.hash_keys, &left.col_names, row)?;
            match table.get(&key) {
                Some(matches) => {
                    for idx in matches {
                        let mut joined = row.clone();
                        joined.extend(right.rows[*idx].iter().cloned());
                        out.push_row(joined);
                    }
                }
                None if self.left_outer => {
                    let mut joined = row.clone();
                    joined.extend(std::iter::repeat(Value::Null).take(right_width));
                    out.push_row(joined);
                }
                None => {}
            }
        }

        self.base
            .finish(Value::DataSet(out), merge_states([ls, rs]));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::context::ExecResult;
    use crate::query::planner::plan::PlanNodeKind;
    use crate::utils::IdGenerator;

    fn feed(ctx: &ExecutionContext, node: &PlanNode, data: DataSet) {
        ctx.set_result(
            node.output_var().to_string(),
            ExecResult::success(Value::DataSet(data)),
        );
    }

    #[tokio::test]
    async fn test_dedup_keeps_first_seen_order() {
        let id_gen = IdGenerator::new();
        let ctx = Arc::new(ExecutionContext::new());
        let start = Arc::new(
            PlanNode::new(&id_gen, PlanNodeKind::Start, vec![]).expect("start"),
        );
        let dedup = PlanNode::new(&id_gen, PlanNodeKind::Dedup, vec![start.clone()])
            .expect("dedup");

        feed(
            &ctx,
            &start,
            DataSet::with_rows(
                vec!["v".to_string()],
                vec![
                    vec![Value::Int(3)],
                    vec![Value::Int(1)],
                    vec![Value::Int(3)],
                    vec![Value::Int(2)],
                    vec![Value::Int(1)],
                ],
            ),
        );

        let mut exec = DedupExecutor::new(&dedup, ctx.clone());
        exec.execute().await.expect("execute");

        let result = ctx.get_result(dedup.output_var()).expect("result");
        match result.value {
            Value::DataSet(ds) => assert_eq!(
                ds.rows,
                vec![vec![Value::Int(3)], vec![Value::Int(1)], vec![Value::Int(2)]]
            ),
            other => panic!("期望行集，得到 {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_left_join_pads_unmatched_rows() {
        let id_gen = IdGenerator::new();
        let ctx = Arc::new(ExecutionContext::new());
        let left_in = Arc::new(
            PlanNode::new(&id_gen, PlanNodeKind::Start, vec![]).expect("start"),
        );
        let right_in = Arc::new(
            PlanNode::new(&id_gen, PlanNodeKind::Start, vec![]).expect("start"),
        );
        let join_cfg = JoinNode {
            hash_keys: vec![Expression::column("id")],
            probe_keys: vec![Expression::column("id")],
        };
        let join = PlanNode::new(
            &id_gen,
            PlanNodeKind::LeftJoin(join_cfg.clone()),
            vec![left_in.clone(), right_in.clone()],
        )
        .expect("join");

        feed(
            &ctx,
            &left_in,
            DataSet::with_rows(
                vec!["id".to_string()],
                vec![vec![Value::Int(1)], vec![Value::Int(2)]],
            ),
        );
        feed(
            &ctx,
            &right_in,
            DataSet::with_rows(
                vec!["id".to_string(), "name".to_string()],
                vec![vec![Value::Int(1), Value::from("alice")]],
            ),
        );

        let mut exec = HashJoinExecutor::left(&join, ctx.clone(), join_cfg);
        exec.execute().await.expect("execute");

        let result = ctx.get_result(join.output_var()).expect("result");
        match result.value {
            Value::DataSet(ds) => {
                assert_eq!(ds.rows.len(), 2);
                assert_eq!(ds.rows[0], vec![Value::Int(1), Value::Int(1), Value::from("alice")]);
                assert_eq!(ds.rows[1], vec![Value::Int(2), Value::Null, Value::Null]);
            }
            other => panic!("期望行集，得到 {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_aggregate_groups_in_first_seen_order() {
        let id_gen = IdGenerator::new();
        let ctx = Arc::new(ExecutionContext::new());
        let start = Arc::new(
            PlanNode::new(&id_gen, PlanNodeKind::Start, vec![]).expect("start"),
        );
        let agg_items = vec![AggItem {
            func: AggFunc::Sum,
            arg: Expression::column("n"),
            alias: "total".to_string(),
            distinct: false,
        }];
        let agg = PlanNode::new(
            &id_gen,
            PlanNodeKind::Aggregate(crate::query::planner::plan::node_config::AggregateNode {
                group_keys: vec!["k".to_string()],
                agg_items: agg_items.clone(),
            }),
            vec![start.clone()],
        )
        .expect("aggregate");

        feed(
            &ctx,
            &start,
            DataSet::with_rows(
                vec!["k".to_string(), "n".to_string()],
                vec![
                    vec![Value::from("b"), Value::Int(1)],
                    vec![Value::from("a"), Value::Int(2)],
                    vec![Value::from("b"), Value::Int(3)],
                ],
            ),
        );

        let mut exec =
            AggregateExecutor::new(&agg, ctx.clone(), vec!["k".to_string()], agg_items);
        exec.execute().await.expect("execute");

        let result = ctx.get_result(agg.output_var()).expect("result");
        match result.value {
            Value::DataSet(ds) => {
                assert_eq!(ds.col_names, vec!["k".to_string(), "total".to_string()]);
                assert_eq!(
                    ds.rows,
                    vec![
                        vec![Value::from("b"), Value::Int(4)],
                        vec![Value::from("a"), Value::Int(2)],
                    ]
                );
            }
            other => panic!("期望行集，得到 {}", other.type_name()),
        }
    }
}
