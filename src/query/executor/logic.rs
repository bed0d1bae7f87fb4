//! 控制流与数据接线执行器
//!
//! Loop/Select 执行器只负责对条件求值并写出布尔结果，
//! 子图的反复调度与分支选择由调度器完成。

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::error::{DBResult, QueryError};
use crate::core::expression::{Expression, VarContext};
use crate::core::value::{DataSet, Value};
use crate::query::context::ExecutionContext;
use crate::query::executor::base::{BaseExecutor, Executor, ExecutorStats};
use crate::query::planner::plan::PlanNode;
use crate::storage::ResultState;

macro_rules! delegate_base {
    () => {
        fn id(&self) -> i64 {
            self.base.id()
        }

        fn name(&self) -> &str {
            self.base.name()
        }

        fn stats(&self) -> &ExecutorStats {
            self.base.stats()
        }

        fn stats_mut(&mut self) -> &mut ExecutorStats {
            self.base.stats_mut()
        }
    };
}

pub(crate) use delegate_base;

/// 计划入口：绑定空行集，作为零依赖子图的起点
pub struct StartExecutor {
    base: BaseExecutor,
}

impl StartExecutor {
    pub fn new(node: &PlanNode, ctx: Arc<ExecutionContext>) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
        }
    }
}

#[async_trait]
impl Executor for StartExecutor {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        self.base
            .finish(Value::DataSet(DataSet::default()), ResultState::Success);
        Ok(())
    }
}

/// 原样转发输入
pub struct PassThroughExecutor {
    base: BaseExecutor,
}

impl PassThroughExecutor {
    pub fn new(node: &PlanNode, ctx: Arc<ExecutionContext>) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
        }
    }
}

#[async_trait]
impl Executor for PassThroughExecutor {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let input = self.base.input_result(0)?;
        self.base.finish(input.value, input.state);
        Ok(())
    }
}

/// 读取命名变量（循环体的数据入口）
pub struct ArgumentExecutor {
    base: BaseExecutor,
    var_name: String,
}

impl ArgumentExecutor {
    pub fn new(node: &PlanNode, ctx: Arc<ExecutionContext>, var_name: String) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            var_name,
        }
    }
}

#[async_trait]
impl Executor for ArgumentExecutor {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let result = self
            .base
            .context()
            .get_result(&self.var_name)
            .ok_or_else(|| {
                QueryError::Execution(format!("argument variable '{}' not bound", self.var_name))
            })?;
        self.base.finish(result.value, result.state);
        Ok(())
    }
}

/// 求循环条件；每轮迭代前被调度器重新执行一次
pub struct LoopExecutor {
    base: BaseExecutor,
    condition: Expression,
}

impl LoopExecutor {
    pub fn new(node: &PlanNode, ctx: Arc<ExecutionContext>, condition: Expression) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            condition,
        }
    }
}

#[async_trait]
impl Executor for LoopExecutor {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let ctx = self.base.context().clone();
        let lookup = move |name: &str| ctx.get_value(name);
        let cond = self.condition.eval(&VarContext { vars: &lookup })?;
        self.base
            .finish(Value::Bool(cond.is_truthy()), ResultState::Success);
        Ok(())
    }
}

/// 求分支条件；调度器按结果只调度 then/else 之一
pub struct SelectExecutor {
    base: BaseExecutor,
    condition: Expression,
}

impl SelectExecutor {
    pub fn new(node: &PlanNode, ctx: Arc<ExecutionContext>, condition: Expression) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            condition,
        }
    }
}

#[async_trait]
impl Executor for SelectExecutor {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let ctx = self.base.context().clone();
        let lookup = move |name: &str| ctx.get_value(name);
        let cond = self.condition.eval(&VarContext { vars: &lookup })?;
        self.base
            .finish(Value::Bool(cond.is_truthy()), ResultState::Success);
        Ok(())
    }
}
