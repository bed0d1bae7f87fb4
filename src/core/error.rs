//! 统一错误处理
//!
//! 按阶段划分错误类型：
//! - 规划期（PlanError）：缺失变量、元数不匹配、非法别名
//! - 优化期（OptimizerError）：无可用索引、语义矛盾、不支持的过滤形状
//! - 执行期（QueryError）：逻辑错误、存储 RPC 错误
//!
//! 传播策略：所有错误通过 future 链原样上抛，调度器对任一失败立即
//! 短路整个查询（fail-fast），不做重试。优化器错误是硬失败，
//! 绝不回退去执行未优化的计划。

use thiserror::Error;

/// 统一的结果类型
pub type DBResult<T> = Result<T, DBError>;

/// 顶层错误类型
#[derive(Error, Debug, Clone)]
pub enum DBError {
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// 规划期错误
#[derive(Error, Debug, Clone)]
pub enum PlanError {
    #[error("invalid dependency arity for {kind}: expected {expected}, got {actual}")]
    InvalidArity {
        kind: &'static str,
        expected: &'static str,
        actual: usize,
    },

    #[error("variable '{0}' is already registered")]
    DuplicateVariable(String),

    #[error("variable '{0}' used before declaration")]
    UndeclaredVariable(String),

    #[error("variable '{0}' already has writer node {1}")]
    ConflictingWriter(String, i64),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

/// 优化期错误
///
/// 优化失败是硬错误：未改写的计划不会被静默执行。
#[derive(Error, Debug, Clone)]
pub enum OptimizerError {
    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("semantic error: {0}")]
    Semantic(String),

    #[error("rule '{rule}' failed: {message}")]
    RuleFailed { rule: String, message: String },

    #[error("group {0} not found")]
    GroupNotFound(usize),

    #[error("optimizer did not reach fixpoint within {0} rounds")]
    NoFixpoint(usize),

    #[error("plan conversion failed: {0}")]
    PlanConversion(String),
}

/// 执行期错误
#[derive(Error, Debug, Clone)]
pub enum QueryError {
    #[error("execution error: {0}")]
    Execution(String),

    #[error("executor {0} not found in schedule")]
    ExecutorNotFound(i64),

    #[error("cycle detected in execution schedule")]
    CycleDetected,

    #[error("different columns: {0}")]
    DifferentColumns(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// 存储协作方错误
///
/// 子码用于区分用户可见的失败语义：
/// WHEN/SET 子句引用非法 vs 目标顶点/边不存在。
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("invalid filter in WHEN clause")]
    InvalidFilter,

    #[error("invalid updater in SET clause")]
    InvalidUpdater,

    #[error("the target vertex does not exist: {0}")]
    VertexNotFound(String),

    #[error("the target edge does not exist: {0}")]
    EdgeNotFound(String),

    #[error("all partitions failed")]
    TotalFailure,

    #[error("rpc failure: {0}")]
    Rpc(String),
}

/// 表达式求值错误
#[derive(Error, Debug, Clone)]
pub enum ExpressionError {
    #[error("undefined column '{0}'")]
    UndefinedColumn(String),

    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("aggregate expression not allowed here: {0}")]
    MisplacedAggregate(String),
}

impl DBError {
    pub fn internal(message: impl Into<String>) -> Self {
        DBError::Internal(message.into())
    }
}

impl From<DBError> for QueryError {
    fn from(err: DBError) -> Self {
        match err {
            DBError::Query(q) => q,
            DBError::Storage(s) => QueryError::Storage(s.to_string()),
            other => QueryError::Execution(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let plan_err = PlanError::UndeclaredVariable("v".to_string());
        let db_err: DBError = plan_err.into();
        assert!(matches!(db_err, DBError::Plan(_)));
        assert!(db_err.to_string().contains("used before declaration"));
    }

    #[test]
    fn test_query_error_from_db_error() {
        let err: DBError = StorageError::VertexNotFound("101".to_string()).into();
        let q: QueryError = err.into();
        assert!(matches!(q, QueryError::Storage(_)));
    }
}
