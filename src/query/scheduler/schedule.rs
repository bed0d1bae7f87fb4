//! 执行调度表
//!
//! 执行器图与计划 DAG 同构：节点 id 共用，依赖边与控制流边分开
//! 记录。循环体/分支子图以根 id 挂在控制表上，不混入外层依赖边；
//! 子图以 Start/Argument 为边界，不与外层共享节点。

use std::collections::{HashMap, HashSet};

use crate::core::error::{DBResult, QueryError};
use crate::query::executor::base::Executor;

#[derive(Debug, Clone)]
pub struct LoopControl {
    pub body_root: i64,
    /// 每轮迭代后需要重置承诺的节点集合（含子图根）
    pub body_members: HashSet<i64>,
}

#[derive(Debug, Clone)]
pub struct SelectControl {
    pub then_root: i64,
    pub else_root: i64,
}

pub struct ExecutionSchedule {
    pub executors: HashMap<i64, Box<dyn Executor>>,
    pub dependencies: HashMap<i64, Vec<i64>>,
    pub successors: HashMap<i64, Vec<i64>>,
    pub output_vars: HashMap<i64, String>,
    pub loops: HashMap<i64, LoopControl>,
    pub selects: HashMap<i64, SelectControl>,
    pub root_id: i64,
}

impl ExecutionSchedule {
    pub fn new(root_id: i64) -> Self {
        Self {
            executors: HashMap::new(),
            dependencies: HashMap::new(),
            successors: HashMap::new(),
            output_vars: HashMap::new(),
            loops: HashMap::new(),
            selects: HashMap::new(),
            root_id,
        }
    }

    pub fn add_executor(
        &mut self,
        id: i64,
        deps: Vec<i64>,
        output_var: String,
        executor: Box<dyn Executor>,
    ) {
        for dep in &deps {
            self.successors.entry(*dep).or_default().push(id);
        }
        self.dependencies.insert(id, deps);
        self.output_vars.insert(id, output_var);
        self.executors.insert(id, executor);
    }

    pub fn contains(&self, id: i64) -> bool {
        self.executors.contains_key(&id)
    }

    /// 从 start 出发沿依赖边与控制流边可达的全部节点
    pub fn reachable_from(&self, start: i64) -> HashSet<i64> {
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(deps) = self.dependencies.get(&id) {
                stack.extend(deps.iter().copied());
            }
            if let Some(lp) = self.loops.get(&id) {
                stack.push(lp.body_root);
            }
            if let Some(sel) = self.selects.get(&id) {
                stack.push(sel.then_root);
                stack.push(sel.else_root);
            }
        }
        seen
    }

    /// 依赖边成环即调度表非法
    pub fn validate(&self) -> DBResult<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }

        fn visit(
            id: i64,
            deps: &HashMap<i64, Vec<i64>>,
            marks: &mut HashMap<i64, Mark>,
        ) -> DBResult<()> {
            match marks.get(&id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::InProgress) => return Err(QueryError::CycleDetected.into()),
                None => {}
            }
            marks.insert(id, Mark::InProgress);
            if let Some(children) = deps.get(&id) {
                for child in children {
                    visit(*child, deps, marks)?;
                }
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for id in self.executors.keys() {
            visit(*id, &self.dependencies, &mut marks)?;
        }

        // 每条依赖边都必须指向已注册的执行器
        for (id, deps) in &self.dependencies {
            for dep in deps {
                if !self.executors.contains_key(dep) {
                    return Err(QueryError::Execution(format!(
                        "executor {} depends on unregistered executor {}",
                        id, dep
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }
}
