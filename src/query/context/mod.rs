//! 查询上下文
//!
//! QueryContext 贯穿一次查询的规划、优化与执行：
//! 符号表、变量值存储、节点 ID 生成器、索引目录与配置。

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::core::symbol::SymbolTable;
use crate::core::value::{DataType, Value};
use crate::storage::ResultState;
use crate::utils::IdGenerator;

/// 绑定到变量上的执行结果：值 + 完成状态。
/// 部分成功的存储响应以降级标记呈现，调用方必须检查 state。
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub value: Value,
    pub state: ResultState,
}

impl ExecResult {
    pub fn success(value: Value) -> Self {
        Self {
            value,
            state: ResultState::Success,
        }
    }

    pub fn with_state(value: Value, state: ResultState) -> Self {
        Self { value, state }
    }
}

/// 执行期变量值存储
///
/// 规划期 append-mostly，执行期每变量单写多读（符号表保证单写方），
/// 值本身无需细粒度锁，仅映射表用 RwLock 保护。
#[derive(Debug, Default)]
pub struct ExecutionContext {
    results: RwLock<HashMap<String, ExecResult>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_result(&self, name: impl Into<String>, result: ExecResult) {
        self.results.write().insert(name.into(), result);
    }

    pub fn set_value(&self, name: impl Into<String>, value: Value) {
        self.set_result(name, ExecResult::success(value));
    }

    pub fn get_result(&self, name: &str) -> Option<ExecResult> {
        self.results.read().get(name).cloned()
    }

    pub fn get_value(&self, name: &str) -> Option<Value> {
        self.results.read().get(name).map(|r| r.value.clone())
    }

    pub fn has_value(&self, name: &str) -> bool {
        self.results.read().contains_key(name)
    }

    pub fn clear(&self) {
        self.results.write().clear();
    }
}

/// 索引字段（顺序即索引前缀顺序）
#[derive(Debug, Clone, PartialEq)]
pub struct IndexField {
    pub name: String,
    pub data_type: DataType,
}

/// 索引模式
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSchema {
    pub name: String,
    /// 所属 tag 或 edge type
    pub schema: String,
    pub is_edge: bool,
    pub fields: Vec<IndexField>,
}

/// 索引目录：优化器选索引的只读元数据视图
#[derive(Debug, Default)]
pub struct IndexCatalog {
    indexes: RwLock<Vec<IndexSchema>>,
}

impl IndexCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, index: IndexSchema) {
        self.indexes.write().push(index);
    }

    pub fn indexes_for(&self, schema: &str, is_edge: bool) -> Vec<IndexSchema> {
        self.indexes
            .read()
            .iter()
            .filter(|i| i.schema == schema && i.is_edge == is_edge)
            .cloned()
            .collect()
    }

    pub fn remove(&self, index_name: &str) -> bool {
        let mut indexes = self.indexes.write();
        let before = indexes.len();
        indexes.retain(|i| i.name != index_name);
        indexes.len() != before
    }
}

/// 一次查询的共享上下文
#[derive(Debug)]
pub struct QueryContext {
    pub symbols: SymbolTable,
    pub values: Arc<ExecutionContext>,
    pub id_gen: Arc<IdGenerator>,
    pub index_catalog: Arc<IndexCatalog>,
    pub config: EngineConfig,
}

impl QueryContext {
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            values: Arc::new(ExecutionContext::new()),
            id_gen: IdGenerator::new(),
            index_catalog: Arc::new(IndexCatalog::new()),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::new()
        }
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::new()
    }
}
