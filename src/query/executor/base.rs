//! 执行器基础设施
//!
//! 执行器与计划节点一一对应，按输出变量交换数据：依赖的输出变量
//! 在构造时从计划节点解析为本执行器的输入变量，execute 从执行
//! 上下文读输入、算结果、写回自己的输出变量。
//!
//! 执行器不自己调度依赖，依赖就绪由调度器保证。

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::{DBResult, QueryError};
use crate::core::value::{DataSet, Value};
use crate::query::context::{ExecResult, ExecutionContext};
use crate::query::planner::plan::PlanNode;
use crate::storage::ResultState;

/// 执行统计；循环体内的执行器 exec_count 等于迭代次数
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecutorStats {
    pub exec_count: u64,
    pub rows_out: u64,
    pub total_time: Duration,
}

#[async_trait]
pub trait Executor: Send {
    fn id(&self) -> i64;

    fn name(&self) -> &str;

    async fn execute(&mut self) -> DBResult<()>;

    fn stats(&self) -> &ExecutorStats;

    fn stats_mut(&mut self) -> &mut ExecutorStats;
}

/// 公共头部：身份、输入/输出变量、统计
#[derive(Debug)]
pub struct BaseExecutor {
    id: i64,
    name: String,
    ctx: Arc<ExecutionContext>,
    input_vars: Vec<String>,
    output_var: String,
    stats: ExecutorStats,
}

impl BaseExecutor {
    pub fn new(node: &PlanNode, ctx: Arc<ExecutionContext>) -> Self {
        Self {
            id: node.id(),
            name: format!("{}Executor", node.name()),
            ctx,
            input_vars: node
                .dependencies()
                .iter()
                .map(|d| d.output_var().to_string())
                .collect(),
            output_var: node.output_var().to_string(),
            stats: ExecutorStats::default(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_var(&self) -> &str {
        &self.output_var
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.ctx
    }

    pub fn stats(&self) -> &ExecutorStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut ExecutorStats {
        &mut self.stats
    }

    /// 第 idx 个输入变量的值；调度器保证依赖已完成，缺失即调度缺陷
    pub fn input_result(&self, idx: usize) -> DBResult<ExecResult> {
        let var = self.input_vars.get(idx).ok_or_else(|| {
            QueryError::Execution(format!("{} has no input {}", self.name, idx))
        })?;
        self.ctx.get_result(var).ok_or_else(|| {
            QueryError::Execution(format!("input variable '{}' not bound for {}", var, self.name))
                .into()
        })
    }

    /// 输入解包为行集；部分成功状态随数据一起返回，由调用方传染到输出
    pub fn input_dataset(&self, idx: usize) -> DBResult<(DataSet, ResultState)> {
        let result = self.input_result(idx)?;
        match result.value {
            Value::DataSet(ds) => Ok((ds, result.state)),
            other => Err(QueryError::Execution(format!(
                "{} expects a dataset input, got {}",
                self.name,
                other.type_name()
            ))
            .into()),
        }
    }

    pub fn input_count(&self) -> usize {
        self.input_vars.len()
    }

    /// 结果落盘到输出变量
    pub fn finish(&mut self, value: Value, state: ResultState) {
        if let Value::DataSet(ds) = &value {
            self.stats.rows_out += ds.rows.len() as u64;
        }
        self.ctx
            .set_result(self.output_var.clone(), ExecResult::with_state(value, state));
    }
}

/// 多路输入的降级状态合并：任一部分成功则整体降级
pub fn merge_states(states: impl IntoIterator<Item = ResultState>) -> ResultState {
    for state in states {
        if state == ResultState::PartialSuccess {
            return ResultState::PartialSuccess;
        }
    }
    ResultState::Success
}
