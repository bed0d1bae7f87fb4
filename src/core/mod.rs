//! 核心类型模块：值、错误、表达式、符号表

pub mod error;
pub mod expression;
pub mod symbol;
pub mod value;

pub use error::{
    DBError, DBResult, ExpressionError, OptimizerError, PlanError, QueryError, StorageError,
};
pub use expression::{AggFunc, BinaryOp, EvalContext, Expression, RowContext, UnaryOp, VarContext};
pub use symbol::{SymbolTable, Variable};
pub use value::{DataSet, DataType, Edge, Row, Tag, Value, Vertex};
