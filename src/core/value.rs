//! 值模型
//!
//! 执行期的统一值类型。行集（DataSet）是节点间传递的主要载体，
//! 标量值用于循环计数、分支条件等控制流变量。
//!
//! Float 以 to_bits 参与哈希与相等判断，使 Value 可以充当
//! 去重集合与哈希连接的键；NaN 与 NaN 在此语义下相等。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// 值的静态类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Null,
    Bool,
    Int,
    Float,
    String,
    List,
    Vertex,
    Edge,
    DataSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Vertex(Vertex),
    Edge(Edge),
    DataSet(DataSet),
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::List(items) => items.hash(state),
            Value::Vertex(v) => v.vid.hash(state),
            Value::Edge(e) => {
                e.src.hash(state);
                e.dst.hash(state);
                e.edge_type.hash(state);
                e.rank.hash(state);
            }
            Value::DataSet(d) => {
                d.col_names.hash(state);
                d.rows.hash(state);
            }
        }
    }
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Bool,
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::String(_) => DataType::String,
            Value::List(_) => DataType::List,
            Value::Vertex(_) => DataType::Vertex,
            Value::Edge(_) => DataType::Edge,
            Value::DataSet(_) => DataType::DataSet,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Vertex(_) => "vertex",
            Value::Edge(_) => "edge",
            Value::DataSet(_) => "dataset",
        }
    }

    /// 条件求值的真值语义：Null/false/0/空串为假
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Vertex(_) | Value::Edge(_) => true,
            Value::DataSet(d) => !d.rows.is_empty(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_dataset(&self) -> Option<&DataSet> {
        match self {
            Value::DataSet(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Vertex(v) => write!(f, "({})", v.vid),
            Value::Edge(e) => write!(f, "({})-[{}@{}]->({})", e.src, e.edge_type, e.rank, e.dst),
            Value::DataSet(d) => write!(f, "dataset[{} x {}]", d.col_names.len(), d.rows.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DataSet> for Value {
    fn from(v: DataSet) -> Self {
        Value::DataSet(v)
    }
}

pub type Row = Vec<Value>;

/// 行集：列名 + 行
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    pub col_names: Vec<String>,
    pub rows: Vec<Row>,
}

impl DataSet {
    pub fn new(col_names: Vec<String>) -> Self {
        Self {
            col_names,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(col_names: Vec<String>, rows: Vec<Row>) -> Self {
        Self { col_names, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.col_names.iter().position(|c| c == name)
    }

    /// 集合算子要求两侧列名完全一致（含顺序）
    pub fn same_columns(&self, other: &DataSet) -> bool {
        self.col_names == other.col_names
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// 顶点上的一个标签及其属性
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub props: HashMap<String, Value>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            props: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub vid: String,
    pub tags: Vec<Tag>,
}

impl Vertex {
    pub fn new(vid: impl Into<String>) -> Self {
        Self {
            vid: vid.into(),
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub src: String,
    pub dst: String,
    pub edge_type: String,
    pub rank: i64,
    pub props: HashMap<String, Value>,
}
