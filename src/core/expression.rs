//! 表达式树与求值
//!
//! 表达式在三处被消费：
//! - 过滤/投影执行器按行求值（eval）
//! - 循环/分支执行器对条件变量求值（eval 读变量上下文）
//! - 优化器规则做结构分析与列名改写（本模块的 utils 部分）
//!
//! 对外部协作方而言求值是不透明的 `eval(row) -> Value`；
//! 这里只实现查询核心自身需要的最小运算集。

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::core::error::{DBResult, ExpressionError};
use crate::core::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    Collect,
}

/// 表达式树
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Literal(Value),
    /// 当前行中的列引用
    Column(String),
    /// 执行上下文中的命名变量（循环条件等标量）
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Aggregate {
        func: AggFunc,
        arg: Box<Expression>,
        distinct: bool,
    },
}

/// 求值时的行上下文：列按名取值，变量从执行上下文取值
pub trait EvalContext {
    fn column(&self, name: &str) -> Option<Value>;
    fn variable(&self, name: &str) -> Option<Value>;
}

/// 纯变量上下文（循环/分支条件求值用，无当前行）
pub struct VarContext<'a> {
    pub vars: &'a dyn Fn(&str) -> Option<Value>,
}

impl<'a> EvalContext for VarContext<'a> {
    fn column(&self, _name: &str) -> Option<Value> {
        None
    }

    fn variable(&self, name: &str) -> Option<Value> {
        (self.vars)(name)
    }
}

/// 基于列名列表和行切片的上下文
pub struct RowContext<'a> {
    pub col_names: &'a [String],
    pub row: &'a [Value],
}

impl<'a> EvalContext for RowContext<'a> {
    fn column(&self, name: &str) -> Option<Value> {
        self.col_names
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.row.get(i).cloned())
    }

    fn variable(&self, _name: &str) -> Option<Value> {
        None
    }
}

impl Expression {
    pub fn literal(v: impl Into<Value>) -> Self {
        Expression::Literal(v.into())
    }

    pub fn column(name: impl Into<String>) -> Self {
        Expression::Column(name.into())
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable(name.into())
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::And, left, right)
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::Or, left, right)
    }

    /// 按行求值
    pub fn eval(&self, ctx: &dyn EvalContext) -> DBResult<Value> {
        match self {
            Expression::Literal(v) => Ok(v.clone()),
            Expression::Column(name) => ctx
                .column(name)
                .ok_or_else(|| ExpressionError::UndefinedColumn(name.clone()).into()),
            Expression::Variable(name) => ctx
                .variable(name)
                .ok_or_else(|| ExpressionError::UndefinedVariable(name.clone()).into()),
            Expression::Unary { op, operand } => {
                let v = operand.eval(ctx)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
                    UnaryOp::Neg => match v {
                        Value::Int(i) => Ok(Value::Int(-i)),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        other => Err(ExpressionError::TypeMismatch(format!(
                            "cannot negate {}",
                            other.type_name()
                        ))
                        .into()),
                    },
                }
            }
            Expression::Binary { op, left, right } => {
                // AND/OR 短路求值
                if *op == BinaryOp::And {
                    let l = left.eval(ctx)?;
                    if !l.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                    let r = right.eval(ctx)?;
                    return Ok(Value::Bool(r.is_truthy()));
                }
                if *op == BinaryOp::Or {
                    let l = left.eval(ctx)?;
                    if l.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                    let r = right.eval(ctx)?;
                    return Ok(Value::Bool(r.is_truthy()));
                }

                let l = left.eval(ctx)?;
                let r = right.eval(ctx)?;
                eval_binary(*op, l, r)
            }
            Expression::Aggregate { func, .. } => Err(ExpressionError::MisplacedAggregate(
                format!("{:?} in row-level evaluation", func),
            )
            .into()),
        }
    }

    /// 是否包含聚合表达式
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expression::Aggregate { .. } => true,
            Expression::Unary { operand, .. } => operand.contains_aggregate(),
            Expression::Binary { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            _ => false,
        }
    }

    /// 收集表达式引用的全部列名
    pub fn collect_columns(&self, out: &mut HashSet<String>) {
        match self {
            Expression::Column(name) => {
                out.insert(name.clone());
            }
            Expression::Unary { operand, .. } => operand.collect_columns(out),
            Expression::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expression::Aggregate { arg, .. } => arg.collect_columns(out),
            _ => {}
        }
    }

    pub fn referenced_columns(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        self.collect_columns(&mut out);
        out
    }

    /// 顶层 AND 展开为合取项列表；非 AND 表达式返回单元素
    pub fn split_conjuncts(&self) -> Vec<Expression> {
        match self {
            Expression::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let mut items = left.split_conjuncts();
                items.extend(right.split_conjuncts());
                items
            }
            other => vec![other.clone()],
        }
    }

    /// 顶层 OR 展开为析取项列表
    pub fn split_disjuncts(&self) -> Vec<Expression> {
        match self {
            Expression::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                let mut items = left.split_disjuncts();
                items.extend(right.split_disjuncts());
                items
            }
            other => vec![other.clone()],
        }
    }

    /// 合取项列表折叠回 AND 表达式
    pub fn fold_conjuncts(mut items: Vec<Expression>) -> Option<Expression> {
        let first = if items.is_empty() {
            return None;
        } else {
            items.remove(0)
        };
        Some(items.into_iter().fold(first, Expression::and))
    }

    /// 将列引用按映射表改写；任一引用列无映射则返回 None（不可改写）。
    ///
    /// 过滤下推穿过投影时使用：映射为投影输出列名 -> 投影输入表达式。
    pub fn rewrite_columns(&self, mapping: &HashMap<String, Expression>) -> Option<Expression> {
        match self {
            Expression::Column(name) => mapping.get(name).cloned(),
            Expression::Literal(_) | Expression::Variable(_) => Some(self.clone()),
            Expression::Unary { op, operand } => Some(Expression::Unary {
                op: *op,
                operand: Box::new(operand.rewrite_columns(mapping)?),
            }),
            Expression::Binary { op, left, right } => Some(Expression::Binary {
                op: *op,
                left: Box::new(left.rewrite_columns(mapping)?),
                right: Box::new(right.rewrite_columns(mapping)?),
            }),
            Expression::Aggregate { .. } => None,
        }
    }
}

fn eval_binary(op: BinaryOp, l: Value, r: Value) -> DBResult<Value> {
    use BinaryOp::*;

    match op {
        Add | Sub | Mul | Div | Mod => eval_arithmetic(op, l, r),
        Eq => Ok(Value::Bool(values_equal(&l, &r))),
        Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        Lt | Le | Gt | Ge => {
            let ord = compare_values(&l, &r)?;
            let b = match op {
                Lt => ord == std::cmp::Ordering::Less,
                Le => ord != std::cmp::Ordering::Greater,
                Gt => ord == std::cmp::Ordering::Greater,
                Ge => ord != std::cmp::Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Value::Bool(b))
        }
        And | Or => unreachable!("logical ops are short-circuited in eval"),
    }
}

fn eval_arithmetic(op: BinaryOp, l: Value, r: Value) -> DBResult<Value> {
    use BinaryOp::*;

    match (l, r) {
        (Value::Int(a), Value::Int(b)) => match op {
            Add => Ok(Value::Int(a.wrapping_add(b))),
            Sub => Ok(Value::Int(a.wrapping_sub(b))),
            Mul => Ok(Value::Int(a.wrapping_mul(b))),
            Div => {
                if b == 0 {
                    Err(ExpressionError::DivisionByZero.into())
                } else {
                    Ok(Value::Int(a / b))
                }
            }
            Mod => {
                if b == 0 {
                    Err(ExpressionError::DivisionByZero.into())
                } else {
                    Ok(Value::Int(a % b))
                }
            }
            _ => unreachable!(),
        },
        (Value::Float(a), Value::Float(b)) => match op {
            Add => Ok(Value::Float(a + b)),
            Sub => Ok(Value::Float(a - b)),
            Mul => Ok(Value::Float(a * b)),
            Div => Ok(Value::Float(a / b)),
            Mod => Ok(Value::Float(a % b)),
            _ => unreachable!(),
        },
        (Value::Int(a), Value::Float(b)) => eval_arithmetic(op, Value::Float(a as f64), Value::Float(b)),
        (Value::Float(a), Value::Int(b)) => eval_arithmetic(op, Value::Float(a), Value::Float(b as f64)),
        (Value::String(a), Value::String(b)) if op == Add => Ok(Value::String(a + &b)),
        (l, r) => Err(ExpressionError::TypeMismatch(format!(
            "{} {} {}",
            l.type_name(),
            op,
            r.type_name()
        ))
        .into()),
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(a), Value::Float(b)) => (*a as f64) == *b,
        (Value::Float(a), Value::Int(b)) => *a == (*b as f64),
        _ => l == r,
    }
}

/// 值比较；类型不可比时返回类型错误
pub fn compare_values(l: &Value, r: &Value) -> DBResult<std::cmp::Ordering> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a
            .partial_cmp(b)
            .ok_or_else(|| ExpressionError::TypeMismatch("NaN comparison".to_string()).into()),
        (Value::Int(a), Value::Float(b)) => (*a as f64)
            .partial_cmp(b)
            .ok_or_else(|| ExpressionError::TypeMismatch("NaN comparison".to_string()).into()),
        (Value::Float(a), Value::Int(b)) => a
            .partial_cmp(&(*b as f64))
            .ok_or_else(|| ExpressionError::TypeMismatch("NaN comparison".to_string()).into()),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
        (l, r) => Err(ExpressionError::TypeMismatch(format!(
            "cannot compare {} with {}",
            l.type_name(),
            r.type_name()
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_ctx<'a>(cols: &'a [String], row: &'a [Value]) -> RowContext<'a> {
        RowContext {
            col_names: cols,
            row,
        }
    }

    #[test]
    fn test_eval_comparison() {
        let cols = vec!["age".to_string()];
        let row = vec![Value::Int(30)];
        let ctx = row_ctx(&cols, &row);

        let expr = Expression::binary(
            BinaryOp::Ge,
            Expression::column("age"),
            Expression::literal(18i64),
        );
        assert_eq!(expr.eval(&ctx).expect("eval"), Value::Bool(true));
    }

    #[test]
    fn test_eval_short_circuit_and() {
        let cols = vec!["x".to_string()];
        let row = vec![Value::Int(0)];
        let ctx = row_ctx(&cols, &row);

        // 右侧引用未知列，但左侧已为假，短路后不应报错
        let expr = Expression::and(
            Expression::column("x"),
            Expression::column("missing"),
        );
        assert_eq!(expr.eval(&ctx).expect("eval"), Value::Bool(false));
    }

    #[test]
    fn test_split_conjuncts() {
        let expr = Expression::and(
            Expression::and(
                Expression::binary(
                    BinaryOp::Gt,
                    Expression::column("a"),
                    Expression::literal(1i64),
                ),
                Expression::binary(
                    BinaryOp::Lt,
                    Expression::column("b"),
                    Expression::literal(2i64),
                ),
            ),
            Expression::binary(
                BinaryOp::Eq,
                Expression::column("c"),
                Expression::literal(3i64),
            ),
        );
        let items = expr.split_conjuncts();
        assert_eq!(items.len(), 3);

        let folded = Expression::fold_conjuncts(items).expect("fold");
        assert_eq!(folded.split_conjuncts().len(), 3);
    }

    #[test]
    fn test_rewrite_columns() {
        let mut mapping = HashMap::new();
        mapping.insert("alias".to_string(), Expression::column("orig"));

        let expr = Expression::binary(
            BinaryOp::Eq,
            Expression::column("alias"),
            Expression::literal(1i64),
        );
        let rewritten = expr.rewrite_columns(&mapping).expect("rewrite");
        assert!(rewritten.referenced_columns().contains("orig"));

        let unmapped = Expression::column("other");
        assert!(unmapped.rewrite_columns(&mapping).is_none());
    }

    #[test]
    fn test_contains_aggregate() {
        let agg = Expression::Aggregate {
            func: AggFunc::Count,
            arg: Box::new(Expression::column("a")),
            distinct: false,
        };
        let expr = Expression::binary(BinaryOp::Gt, agg, Expression::literal(1i64));
        assert!(expr.contains_aggregate());
        assert!(!Expression::column("a").contains_aggregate());
    }

    #[test]
    fn test_division_by_zero() {
        let cols: Vec<String> = vec![];
        let row: Vec<Value> = vec![];
        let ctx = row_ctx(&cols, &row);
        let expr = Expression::binary(
            BinaryOp::Div,
            Expression::literal(1i64),
            Expression::literal(0i64),
        );
        assert!(expr.eval(&ctx).is_err());
    }
}
