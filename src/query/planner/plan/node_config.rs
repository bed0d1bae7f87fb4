//! 计划节点的配置载荷
//!
//! 每种节点的专有配置与公共头部（id、输出变量、依赖）分离，
//! 便于优化器克隆配置而不携带依赖接线。

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::expression::{AggFunc, Expression};
use crate::core::value::{DataType, Edge, Value, Vertex};
use crate::query::planner::plan::node::PlanNode;

/// 投影列
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectColumn {
    pub expression: Expression,
    pub alias: String,
}

impl ProjectColumn {
    pub fn new(expression: Expression, alias: impl Into<String>) -> Self {
        Self {
            expression,
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// 排序因子
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFactor {
    pub column: String,
    pub direction: OrderDirection,
}

impl OrderFactor {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// 聚合项
#[derive(Debug, Clone, PartialEq)]
pub struct AggItem {
    pub func: AggFunc,
    pub arg: Expression,
    pub alias: String,
    pub distinct: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanVerticesNode {
    pub label: Option<String>,
    pub props: Vec<String>,
    pub filter: Option<Expression>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanEdgesNode {
    pub edge_type: Option<String>,
    pub props: Vec<String>,
    pub filter: Option<Expression>,
    pub limit: Option<i64>,
}

/// 索引全扫描：尚未选中具体索引前缀的占位扫描，
/// IndexScanRule 将其与上方的 Filter 合并改写为 IndexScan
#[derive(Debug, Clone, PartialEq)]
pub struct IndexFullScanNode {
    /// tag 名或 edge type 名
    pub schema: String,
    pub props: Vec<String>,
}

/// 范围端点；整数域上开区间被规约为闭区间（前驱/后继）
#[derive(Debug, Clone, PartialEq)]
pub struct RangeBound {
    pub value: Value,
    pub inclusive: bool,
}

/// 单列扫描提示
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnHint {
    Equal { column: String, value: Value },
    Range {
        column: String,
        begin: Option<RangeBound>,
        end: Option<RangeBound>,
    },
}

impl ColumnHint {
    pub fn column(&self) -> &str {
        match self {
            ColumnHint::Equal { column, .. } => column,
            ColumnHint::Range { column, .. } => column,
        }
    }
}

/// 一次索引查询的完整上下文；OR 过滤的每个析取项各产生一个
#[derive(Debug, Clone, PartialEq)]
pub struct IndexQueryContext {
    pub index_name: String,
    pub column_hints: Vec<ColumnHint>,
    /// 索引无法覆盖的残余条件，扫描后逐行求值
    pub remainder: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexScanNode {
    pub schema: String,
    pub is_edge: bool,
    pub contexts: Vec<IndexQueryContext>,
    pub props: Vec<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetVerticesNode {
    /// 顶点 ID 来源表达式（常为输入列引用）
    pub src: Option<Expression>,
    pub props: Vec<String>,
    pub limit: Option<i64>,
    pub dedup: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetEdgesNode {
    pub edge_type: Option<String>,
    pub props: Vec<String>,
    pub limit: Option<i64>,
}

/// 邻居扩展：核心的图遍历取数节点
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetNeighborsNode {
    pub src: Option<Expression>,
    pub edge_types: Vec<String>,
    pub props: Vec<String>,
    pub filter: Option<Expression>,
    /// 行数上限（offset + count 折算后的值），由 limit 下推规则填充
    pub limit: Option<i64>,
    pub dedup: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub condition: Expression,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectNode {
    pub columns: Vec<ProjectColumn>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SortNode {
    pub factors: Vec<OrderFactor>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitNode {
    pub offset: i64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopNNode {
    pub factors: Vec<OrderFactor>,
    pub offset: i64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateNode {
    pub group_keys: Vec<String>,
    pub agg_items: Vec<AggItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub hash_keys: Vec<Expression>,
    pub probe_keys: Vec<Expression>,
}

/// 循环：input 依赖执行一次，body 子 DAG 按条件反复调度。
/// body 不是图中的环边，而是独立子 DAG 的根引用。
#[derive(Debug, Clone)]
pub struct LoopNode {
    pub body: Arc<PlanNode>,
    pub condition: Expression,
}

/// 条件分支：input 完成后对条件求值，只调度 then/else 之一
#[derive(Debug, Clone)]
pub struct SelectNode {
    pub condition: Expression,
    pub then_plan: Arc<PlanNode>,
    pub else_plan: Arc<PlanNode>,
}

/// 读取上游循环体写入的变量，作为子 DAG 的数据入口
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentNode {
    pub var_name: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InsertVerticesNode {
    pub vertices: Vec<Vertex>,
    pub if_not_exists: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InsertEdgesNode {
    pub edges: Vec<Edge>,
    pub if_not_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateVertexNode {
    pub vid: Value,
    pub tag: String,
    pub set_items: Vec<(String, Expression)>,
    /// WHEN 条件
    pub condition: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEdgeNode {
    pub src: Value,
    pub dst: Value,
    pub edge_type: String,
    pub rank: i64,
    pub set_items: Vec<(String, Expression)>,
    pub condition: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteVerticesNode {
    pub vids: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteEdgesNode {
    pub edge_keys: Vec<(Value, Value, String, i64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTagIndexNode {
    pub index_name: String,
    pub tag_name: String,
    /// 字段名与类型；类型供优化器做整数域区间规约
    pub fields: Vec<(String, DataType)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropTagIndexNode {
    pub index_name: String,
}
