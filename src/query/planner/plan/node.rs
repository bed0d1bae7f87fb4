//! 计划节点定义
//!
//! PlanNode = 公共头部（id、输出变量、输出列名、依赖）+ PlanNodeKind 载荷。
//! 采用标签变体建模而非虚继承：执行器构造点和优化器模式匹配点
//! 对封闭枚举做穷尽匹配，由编译器保证没有遗漏的分支。
//!
//! 不变式：依赖关系构成以单一终端节点为根的 DAG；菱形共享通过
//! 共享 Arc 表达，同一节点在镜像执行器图中只实例化一次。
//! 节点一旦放入 OptGroup 即不可变；优化器只克隆配置再重新接线。

use std::fmt;
use std::sync::Arc;

use crate::core::error::{DBResult, PlanError};
use crate::query::planner::plan::node_config::*;
use crate::utils::IdGenerator;

/// 依赖元数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeArity {
    Zero,
    Single,
    Binary,
    /// 可变元数（至少两个输入），如 N 路 Union
    Multi,
}

/// 节点种类与专有配置
#[derive(Debug, Clone)]
pub enum PlanNodeKind {
    Start,
    ScanVertices(ScanVerticesNode),
    ScanEdges(ScanEdgesNode),
    TagIndexFullScan(IndexFullScanNode),
    EdgeIndexFullScan(IndexFullScanNode),
    IndexScan(IndexScanNode),
    GetVertices(GetVerticesNode),
    GetEdges(GetEdgesNode),
    GetNeighbors(GetNeighborsNode),
    Filter(FilterNode),
    Project(ProjectNode),
    Sort(SortNode),
    Limit(LimitNode),
    TopN(TopNNode),
    Aggregate(AggregateNode),
    Dedup,
    Union,
    Intersect,
    Minus,
    InnerJoin(JoinNode),
    LeftJoin(JoinNode),
    Loop(LoopNode),
    Select(SelectNode),
    PassThrough,
    Argument(ArgumentNode),
    InsertVertices(InsertVerticesNode),
    InsertEdges(InsertEdgesNode),
    UpdateVertex(UpdateVertexNode),
    UpdateEdge(UpdateEdgeNode),
    DeleteVertices(DeleteVerticesNode),
    DeleteEdges(DeleteEdgesNode),
    CreateTagIndex(CreateTagIndexNode),
    DropTagIndex(DropTagIndexNode),
}

impl PlanNodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            PlanNodeKind::Start => "Start",
            PlanNodeKind::ScanVertices(_) => "ScanVertices",
            PlanNodeKind::ScanEdges(_) => "ScanEdges",
            PlanNodeKind::TagIndexFullScan(_) => "TagIndexFullScan",
            PlanNodeKind::EdgeIndexFullScan(_) => "EdgeIndexFullScan",
            PlanNodeKind::IndexScan(_) => "IndexScan",
            PlanNodeKind::GetVertices(_) => "GetVertices",
            PlanNodeKind::GetEdges(_) => "GetEdges",
            PlanNodeKind::GetNeighbors(_) => "GetNeighbors",
            PlanNodeKind::Filter(_) => "Filter",
            PlanNodeKind::Project(_) => "Project",
            PlanNodeKind::Sort(_) => "Sort",
            PlanNodeKind::Limit(_) => "Limit",
            PlanNodeKind::TopN(_) => "TopN",
            PlanNodeKind::Aggregate(_) => "Aggregate",
            PlanNodeKind::Dedup => "Dedup",
            PlanNodeKind::Union => "Union",
            PlanNodeKind::Intersect => "Intersect",
            PlanNodeKind::Minus => "Minus",
            PlanNodeKind::InnerJoin(_) => "InnerJoin",
            PlanNodeKind::LeftJoin(_) => "LeftJoin",
            PlanNodeKind::Loop(_) => "Loop",
            PlanNodeKind::Select(_) => "Select",
            PlanNodeKind::PassThrough => "PassThrough",
            PlanNodeKind::Argument(_) => "Argument",
            PlanNodeKind::InsertVertices(_) => "InsertVertices",
            PlanNodeKind::InsertEdges(_) => "InsertEdges",
            PlanNodeKind::UpdateVertex(_) => "UpdateVertex",
            PlanNodeKind::UpdateEdge(_) => "UpdateEdge",
            PlanNodeKind::DeleteVertices(_) => "DeleteVertices",
            PlanNodeKind::DeleteEdges(_) => "DeleteEdges",
            PlanNodeKind::CreateTagIndex(_) => "CreateTagIndex",
            PlanNodeKind::DropTagIndex(_) => "DropTagIndex",
        }
    }

    pub fn arity(&self) -> NodeArity {
        match self {
            PlanNodeKind::Start
            | PlanNodeKind::Argument(_)
            | PlanNodeKind::CreateTagIndex(_)
            | PlanNodeKind::DropTagIndex(_) => NodeArity::Zero,

            PlanNodeKind::ScanVertices(_)
            | PlanNodeKind::ScanEdges(_)
            | PlanNodeKind::TagIndexFullScan(_)
            | PlanNodeKind::EdgeIndexFullScan(_)
            | PlanNodeKind::IndexScan(_)
            | PlanNodeKind::GetVertices(_)
            | PlanNodeKind::GetEdges(_)
            | PlanNodeKind::GetNeighbors(_)
            | PlanNodeKind::Filter(_)
            | PlanNodeKind::Project(_)
            | PlanNodeKind::Sort(_)
            | PlanNodeKind::Limit(_)
            | PlanNodeKind::TopN(_)
            | PlanNodeKind::Aggregate(_)
            | PlanNodeKind::Dedup
            | PlanNodeKind::Loop(_)
            | PlanNodeKind::Select(_)
            | PlanNodeKind::PassThrough
            | PlanNodeKind::InsertVertices(_)
            | PlanNodeKind::InsertEdges(_)
            | PlanNodeKind::UpdateVertex(_)
            | PlanNodeKind::UpdateEdge(_)
            | PlanNodeKind::DeleteVertices(_)
            | PlanNodeKind::DeleteEdges(_) => NodeArity::Single,

            PlanNodeKind::Intersect
            | PlanNodeKind::Minus
            | PlanNodeKind::InnerJoin(_)
            | PlanNodeKind::LeftJoin(_) => NodeArity::Binary,

            PlanNodeKind::Union => NodeArity::Multi,
        }
    }
}

/// 逻辑执行计划的节点
#[derive(Debug, Clone)]
pub struct PlanNode {
    id: i64,
    kind: PlanNodeKind,
    output_var: String,
    col_names: Vec<String>,
    deps: Vec<Arc<PlanNode>>,
}

impl PlanNode {
    /// 分配新节点；元数与种类不符返回 PlanError 而非 panic
    pub fn new(
        id_gen: &IdGenerator,
        kind: PlanNodeKind,
        deps: Vec<Arc<PlanNode>>,
    ) -> DBResult<Self> {
        Self::check_arity(&kind, deps.len())?;
        let id = id_gen.next_id();
        let output_var = format!("__{}_{}", kind.name(), id);
        Ok(Self {
            id,
            kind,
            output_var,
            col_names: Vec::new(),
            deps,
        })
    }

    fn check_arity(kind: &PlanNodeKind, actual: usize) -> DBResult<()> {
        let ok = match kind.arity() {
            NodeArity::Zero => actual == 0,
            NodeArity::Single => actual == 1,
            NodeArity::Binary => actual == 2,
            NodeArity::Multi => actual >= 2,
        };
        if ok {
            Ok(())
        } else {
            let expected = match kind.arity() {
                NodeArity::Zero => "0",
                NodeArity::Single => "1",
                NodeArity::Binary => "2",
                NodeArity::Multi => ">=2",
            };
            Err(PlanError::InvalidArity {
                kind: kind.name(),
                expected,
                actual,
            }
            .into())
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn kind(&self) -> &PlanNodeKind {
        &self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn output_var(&self) -> &str {
        &self.output_var
    }

    pub fn set_output_var(&mut self, name: impl Into<String>) {
        self.output_var = name.into();
    }

    pub fn col_names(&self) -> &[String] {
        &self.col_names
    }

    pub fn set_col_names(&mut self, col_names: Vec<String>) {
        self.col_names = col_names;
    }

    pub fn dependencies(&self) -> &[Arc<PlanNode>] {
        &self.deps
    }

    /// 生成未接线的新节点；依赖留待 with_deps 补上（届时校验元数）。
    /// 优化器规则合成新种类节点（如 Sort+Limit -> TopN）时使用。
    pub(crate) fn detached(id_gen: &IdGenerator, kind: PlanNodeKind) -> Self {
        let id = id_gen.next_id();
        let output_var = format!("__{}_{}", kind.name(), id);
        Self {
            id,
            kind,
            output_var,
            col_names: Vec::new(),
            deps: Vec::new(),
        }
    }

    /// 深拷贝配置（种类、列名）但不拷贝依赖接线；分配新 id 与输出变量。
    /// 优化器规则用它生成替代节点而不扰动原 DAG。
    pub fn clone_config(&self, id_gen: &IdGenerator) -> Self {
        let id = id_gen.next_id();
        Self {
            id,
            kind: self.kind.clone(),
            output_var: format!("__{}_{}", self.kind.name(), id),
            col_names: self.col_names.clone(),
            deps: Vec::new(),
        }
    }

    /// 保留 id/输出变量，替换依赖；优化器物化 group 时重新接线用
    pub fn with_deps(&self, deps: Vec<Arc<PlanNode>>) -> DBResult<Self> {
        Self::check_arity(&self.kind, deps.len())?;
        Ok(Self {
            id: self.id,
            kind: self.kind.clone(),
            output_var: self.output_var.clone(),
            col_names: self.col_names.clone(),
            deps,
        })
    }

    /// 替换载荷配置，保留头部；优化器规则内部使用
    pub fn with_kind(&self, kind: PlanNodeKind) -> Self {
        Self {
            id: self.id,
            kind,
            output_var: self.output_var.clone(),
            col_names: self.col_names.clone(),
            deps: self.deps.clone(),
        }
    }

    // kind 便捷判定与下转换，优化器规则的常用入口

    pub fn is_filter(&self) -> bool {
        matches!(self.kind, PlanNodeKind::Filter(_))
    }

    pub fn as_filter(&self) -> Option<&FilterNode> {
        match &self.kind {
            PlanNodeKind::Filter(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_project(&self) -> Option<&ProjectNode> {
        match &self.kind {
            PlanNodeKind::Project(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_sort(&self) -> Option<&SortNode> {
        match &self.kind {
            PlanNodeKind::Sort(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_limit(&self) -> Option<&LimitNode> {
        match &self.kind {
            PlanNodeKind::Limit(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_aggregate(&self) -> Option<&AggregateNode> {
        match &self.kind {
            PlanNodeKind::Aggregate(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_get_neighbors(&self) -> Option<&GetNeighborsNode> {
        match &self.kind {
            PlanNodeKind::GetNeighbors(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_index_full_scan(&self) -> Option<&IndexFullScanNode> {
        match &self.kind {
            PlanNodeKind::TagIndexFullScan(s) | PlanNodeKind::EdgeIndexFullScan(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_index_full_scan(&self) -> bool {
        matches!(
            self.kind,
            PlanNodeKind::TagIndexFullScan(_) | PlanNodeKind::EdgeIndexFullScan(_)
        )
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} -> {}", self.name(), self.id, self.output_var)
    }
}
