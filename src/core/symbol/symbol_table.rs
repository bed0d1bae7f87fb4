//! 符号表实现
//!
//! 使用 RwLock<HashMap>：符号表是查询级别的数据结构，每个 QueryContext
//! 持有自己的符号表，不同查询之间不存在并发竞争，数据量小、生命周期短。
//!
//! 重复注册同名变量是错误（规划器必须先消歧后注册），
//! 静默覆盖会让已发出的旧引用悬空。

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::core::error::{DBResult, PlanError};
use crate::core::value::DataType;

/// 变量：单写多读的命名结果占位
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: Arc<str>,
    pub value_type: DataType,
    pub col_names: Vec<String>,
    /// 读取该变量的计划节点
    pub read_by: HashSet<i64>,
    /// 写入该变量的计划节点（每个执行瞬间至多一个）
    pub written_by: HashSet<i64>,
}

impl Variable {
    pub fn new(name: impl Into<Arc<str>>, value_type: DataType) -> Self {
        Self {
            name: name.into(),
            value_type,
            col_names: Vec::new(),
            read_by: HashSet::new(),
            written_by: HashSet::new(),
        }
    }

    pub fn with_col_names(mut self, col_names: Vec<String>) -> Self {
        self.col_names = col_names;
        self
    }
}

/// 符号表：变量名 -> 变量元信息
pub struct SymbolTable {
    symbols: Arc<RwLock<HashMap<String, Variable>>>,
}

impl Clone for SymbolTable {
    fn clone(&self) -> Self {
        let new_map = self.symbols.read().clone();
        Self {
            symbols: Arc::new(RwLock::new(new_map)),
        }
    }
}

impl std::fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolTable")
            .field("symbols", &self.symbols.read().len())
            .finish()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            symbols: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 注册新变量；重复名返回 DuplicateVariable 错误
    pub fn new_variable(&self, name: &str) -> DBResult<Variable> {
        let mut symbols = self.symbols.write();
        if symbols.contains_key(name) {
            return Err(PlanError::DuplicateVariable(name.to_string()).into());
        }

        let var = Variable::new(name, DataType::DataSet);
        symbols.insert(name.to_string(), var.clone());
        Ok(var)
    }

    /// 注册带列名的数据集变量
    pub fn new_dataset_variable(&self, name: &str, col_names: Vec<String>) -> DBResult<Variable> {
        let mut symbols = self.symbols.write();
        if symbols.contains_key(name) {
            return Err(PlanError::DuplicateVariable(name.to_string()).into());
        }

        let var = Variable::new(name, DataType::DataSet).with_col_names(col_names);
        symbols.insert(name.to_string(), var.clone());
        Ok(var)
    }

    /// 注册标量变量（循环条件布尔值等）
    pub fn new_scalar_variable(&self, name: &str, value_type: DataType) -> DBResult<Variable> {
        let mut symbols = self.symbols.write();
        if symbols.contains_key(name) {
            return Err(PlanError::DuplicateVariable(name.to_string()).into());
        }

        let var = Variable::new(name, value_type);
        symbols.insert(name.to_string(), var.clone());
        Ok(var)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.symbols.read().contains_key(name)
    }

    /// 查找变量；未声明返回 None，调用方必须把 None 当作使用先于声明处理
    pub fn find_var(&self, name: &str) -> Option<Variable> {
        self.symbols.read().get(name).cloned()
    }

    pub fn find_var_or_err(&self, name: &str) -> DBResult<Variable> {
        self.find_var(name)
            .ok_or_else(|| PlanError::UndeclaredVariable(name.to_string()).into())
    }

    pub fn size(&self) -> usize {
        self.symbols.read().len()
    }

    /// 记录读取方节点
    pub fn add_read_by(&self, var_name: &str, node_id: i64) -> bool {
        let mut symbols = self.symbols.write();
        if let Some(var) = symbols.get_mut(var_name) {
            var.read_by.insert(node_id);
            true
        } else {
            false
        }
    }

    /// 记录写入方节点；同一变量的第二个写入方是错误
    pub fn add_written_by(&self, var_name: &str, node_id: i64) -> DBResult<()> {
        let mut symbols = self.symbols.write();
        match symbols.get_mut(var_name) {
            Some(var) => {
                if let Some(&existing) = var.written_by.iter().next() {
                    if existing != node_id {
                        return Err(
                            PlanError::ConflictingWriter(var_name.to_string(), existing).into()
                        );
                    }
                }
                var.written_by.insert(node_id);
                Ok(())
            }
            None => Err(PlanError::UndeclaredVariable(var_name.to_string()).into()),
        }
    }

    pub fn delete_read_by(&self, var_name: &str, node_id: i64) -> bool {
        let mut symbols = self.symbols.write();
        if let Some(var) = symbols.get_mut(var_name) {
            var.read_by.remove(&node_id)
        } else {
            false
        }
    }

    /// 优化器改写节点时迁移读取方登记
    pub fn update_read_by(&self, old_var: &str, new_var: &str, node_id: i64) -> bool {
        let mut symbols = self.symbols.write();
        let mut changed = false;

        if let Some(var) = symbols.get_mut(old_var) {
            changed |= var.read_by.remove(&node_id);
        }
        if let Some(var) = symbols.get_mut(new_var) {
            changed |= var.read_by.insert(node_id);
        }
        changed
    }

    /// 优化器改写节点时迁移写入方登记
    pub fn update_written_by(&self, old_var: &str, new_var: &str, node_id: i64) -> bool {
        let mut symbols = self.symbols.write();
        let mut changed = false;

        if let Some(var) = symbols.get_mut(old_var) {
            changed |= var.written_by.remove(&node_id);
        }
        if let Some(var) = symbols.get_mut(new_var) {
            changed |= var.written_by.insert(node_id);
        }
        changed
    }

    pub fn describe(&self) -> String {
        let symbols = self.symbols.read();
        let mut result = String::from("SymbolTable {\n");
        for (name, var) in symbols.iter() {
            result.push_str(&format!(
                "  {}: type={:?}, readers={}, writers={}\n",
                name,
                var.value_type,
                var.read_by.len(),
                var.written_by.len()
            ));
        }
        result.push('}');
        result
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_variable_and_lookup() {
        let table = SymbolTable::new();

        let var = table.new_variable("v1").expect("创建变量失败");
        assert_eq!(var.name.as_ref(), "v1");
        assert!(table.has_variable("v1"));
        assert!(table.find_var("v1").is_some());
        assert!(table.find_var("missing").is_none());
    }

    #[test]
    fn test_duplicate_registration_is_error() {
        let table = SymbolTable::new();
        table.new_variable("v1").expect("创建变量失败");

        let err = table.new_variable("v1").unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_readers_and_writers() {
        let table = SymbolTable::new();
        table.new_variable("v1").expect("创建变量失败");

        assert!(table.add_read_by("v1", 1));
        table.add_written_by("v1", 2).expect("登记写入方失败");

        let var = table.find_var("v1").expect("获取变量失败");
        assert!(var.read_by.contains(&1));
        assert!(var.written_by.contains(&2));

        // 第二个写入方被拒绝
        assert!(table.add_written_by("v1", 3).is_err());
        // 同一写入方重复登记不报错
        table.add_written_by("v1", 2).expect("幂等登记失败");
    }

    #[test]
    fn test_update_written_by_moves_writer() {
        let table = SymbolTable::new();
        table.new_variable("old").expect("创建变量失败");
        table.new_variable("new").expect("创建变量失败");
        table.add_written_by("old", 5).expect("登记写入方失败");

        assert!(table.update_written_by("old", "new", 5));
        assert!(table.find_var("old").expect("查找失败").written_by.is_empty());
        assert!(table.find_var("new").expect("查找失败").written_by.contains(&5));
    }

    #[test]
    fn test_undeclared_writer_registration() {
        let table = SymbolTable::new();
        assert!(table.add_written_by("ghost", 1).is_err());
    }
}
