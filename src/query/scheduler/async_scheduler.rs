//! 异步调度器
//!
//! 每个节点的执行包装为可克隆的共享 future：多个下游等同一个
//! 上游时共用一份承诺，节点至多执行一次。依赖用 try_join_all
//! 并发等待，任一失败立即短路整个查询。
//!
//! 控制流不走共享承诺的常规路径：
//! - Select 先求条件，只调度命中的分支，分支结果回绑到自身输出变量
//! - Loop 反复求条件并调度循环体，每轮迭代后清除体内节点的承诺，
//!   下一轮重新构建；体外节点的承诺不受影响

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{try_join_all, BoxFuture, Shared};
use futures::FutureExt;
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::core::error::{DBResult, QueryError};
use crate::query::context::{ExecResult, ExecutionContext};
use crate::query::executor::base::{Executor, ExecutorStats};
use crate::query::scheduler::schedule::{ExecutionSchedule, LoopControl, SelectControl};

type NodeFuture = Shared<BoxFuture<'static, Result<(), QueryError>>>;

pub struct AsyncScheduler {
    ctx: Arc<ExecutionContext>,
    executors: HashMap<i64, Arc<Mutex<Box<dyn Executor>>>>,
    dependencies: HashMap<i64, Vec<i64>>,
    output_vars: HashMap<i64, String>,
    loops: HashMap<i64, LoopControl>,
    selects: HashMap<i64, SelectControl>,
    root_id: i64,
    promises: DashMap<i64, NodeFuture>,
}

impl AsyncScheduler {
    pub fn new(schedule: ExecutionSchedule, ctx: Arc<ExecutionContext>) -> DBResult<Arc<Self>> {
        schedule.validate()?;
        let executors = schedule
            .executors
            .into_iter()
            .map(|(id, e)| (id, Arc::new(Mutex::new(e))))
            .collect();
        Ok(Arc::new(Self {
            ctx,
            executors,
            dependencies: schedule.dependencies,
            output_vars: schedule.output_vars,
            loops: schedule.loops,
            selects: schedule.selects,
            root_id: schedule.root_id,
            promises: DashMap::new(),
        }))
    }

    /// 从根节点驱动整个查询，返回根输出变量上的结果
    pub async fn run(self: &Arc<Self>) -> DBResult<ExecResult> {
        debug!("scheduling query from root executor {}", self.root_id);
        self.schedule_node(self.root_id).await?;

        let root_var = self
            .output_vars
            .get(&self.root_id)
            .ok_or(QueryError::ExecutorNotFound(self.root_id))?;
        self.ctx.get_result(root_var).ok_or_else(|| {
            QueryError::Execution(format!("root variable '{}' was never bound", root_var)).into()
        })
    }

    /// 测试与诊断入口：节点的执行统计快照
    pub async fn executor_stats(&self, id: i64) -> Option<ExecutorStats> {
        let executor = self.executors.get(&id)?;
        Some(*executor.lock().await.stats())
    }

    fn schedule_node(self: &Arc<Self>, id: i64) -> NodeFuture {
        match self.promises.entry(id) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let this = self.clone();
                let fut = async move { this.execute_node(id).await }.boxed().shared();
                entry.insert(fut.clone());
                fut
            }
        }
    }

    async fn execute_node(self: Arc<Self>, id: i64) -> Result<(), QueryError> {
        if let Some(deps) = self.dependencies.get(&id) {
            if !deps.is_empty() {
                let futures: Vec<NodeFuture> =
                    deps.iter().map(|d| self.schedule_node(*d)).collect();
                try_join_all(futures).await?;
            }
        }

        if let Some(select) = self.selects.get(&id).cloned() {
            return self.execute_select(id, select).await;
        }
        if let Some(lp) = self.loops.get(&id).cloned() {
            return self.execute_loop(id, lp).await;
        }
        self.run_executor(id).await
    }

    async fn execute_select(
        self: &Arc<Self>,
        id: i64,
        select: SelectControl,
    ) -> Result<(), QueryError> {
        // 条件由 Select 执行器算出并写到自身输出变量
        self.run_executor(id).await?;
        let condition = self.bool_output(id)?;
        let branch = if condition {
            select.then_root
        } else {
            select.else_root
        };
        trace!("select {} takes branch executor {}", id, branch);
        self.schedule_node(branch).await?;

        // 分支结果顶替条件值成为 Select 的输出
        let branch_var = self
            .output_vars
            .get(&branch)
            .ok_or(QueryError::ExecutorNotFound(branch))?;
        let result = self.ctx.get_result(branch_var).ok_or_else(|| {
            QueryError::Execution(format!("branch variable '{}' was never bound", branch_var))
        })?;
        let own_var = self
            .output_vars
            .get(&id)
            .ok_or(QueryError::ExecutorNotFound(id))?;
        self.ctx.set_result(own_var.clone(), result);
        Ok(())
    }

    async fn execute_loop(
        self: &Arc<Self>,
        id: i64,
        control: LoopControl,
    ) -> Result<(), QueryError> {
        let mut iterations = 0u64;
        loop {
            self.run_executor(id).await?;
            if !self.bool_output(id)? {
                break;
            }
            self.schedule_node(control.body_root).await?;
            iterations += 1;
            // 体内承诺清零，下一轮迭代重新执行整个子图
            for member in &control.body_members {
                self.promises.remove(member);
            }
        }
        trace!("loop {} finished after {} iterations", id, iterations);
        Ok(())
    }

    async fn run_executor(&self, id: i64) -> Result<(), QueryError> {
        let executor = self
            .executors
            .get(&id)
            .ok_or(QueryError::ExecutorNotFound(id))?;
        let started = Instant::now();
        let mut guard = executor.lock().await;
        guard.execute().await.map_err(QueryError::from)?;
        let stats = guard.stats_mut();
        stats.exec_count += 1;
        stats.total_time += started.elapsed();
        Ok(())
    }

    fn bool_output(&self, id: i64) -> Result<bool, QueryError> {
        let var = self
            .output_vars
            .get(&id)
            .ok_or(QueryError::ExecutorNotFound(id))?;
        let value = self.ctx.get_value(var).ok_or_else(|| {
            QueryError::Execution(format!("condition variable '{}' was never bound", var))
        })?;
        Ok(value.is_truthy())
    }
}
