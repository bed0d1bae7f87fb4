//! 执行器工厂
//!
//! 把优化后的计划 DAG 镜像为执行调度表。按节点 id 备忘，
//! 菱形共享的上游只实例化一个执行器；Loop/Select 的子图
//! 根与成员集合记入控制表，供调度器做迭代与分支调度。

use std::sync::Arc;

use crate::core::error::DBResult;
use crate::query::context::{ExecutionContext, IndexCatalog, QueryContext};
use crate::query::executor::base::Executor;
use crate::query::executor::data::*;
use crate::query::executor::logic::*;
use crate::query::executor::storage_access::*;
use crate::query::planner::plan::{ExecutionPlan, PlanNode, PlanNodeKind};
use crate::query::scheduler::schedule::{ExecutionSchedule, LoopControl, SelectControl};
use crate::storage::StorageClient;

pub struct ExecutorFactory<S: StorageClient> {
    client: Arc<S>,
    ctx: Arc<ExecutionContext>,
    catalog: Arc<IndexCatalog>,
    complete_required: bool,
}

impl<S: StorageClient> ExecutorFactory<S> {
    pub fn new(client: Arc<S>, qctx: &QueryContext) -> Self {
        Self {
            client,
            ctx: qctx.values.clone(),
            catalog: qctx.index_catalog.clone(),
            complete_required: qctx.config.scheduler.complete_required,
        }
    }

    pub fn build(&self, plan: &ExecutionPlan) -> DBResult<ExecutionSchedule> {
        let mut schedule = ExecutionSchedule::new(plan.root.id());
        self.build_node(&plan.root, &mut schedule)?;
        schedule.validate()?;
        Ok(schedule)
    }

    fn build_node(&self, node: &Arc<PlanNode>, schedule: &mut ExecutionSchedule) -> DBResult<()> {
        if schedule.contains(node.id()) {
            return Ok(());
        }

        for dep in node.dependencies() {
            self.build_node(dep, schedule)?;
        }

        match node.kind() {
            PlanNodeKind::Loop(l) => {
                self.build_node(&l.body, schedule)?;
                let body_members = schedule.reachable_from(l.body.id());
                schedule.loops.insert(
                    node.id(),
                    LoopControl {
                        body_root: l.body.id(),
                        body_members,
                    },
                );
            }
            PlanNodeKind::Select(s) => {
                self.build_node(&s.then_plan, schedule)?;
                self.build_node(&s.else_plan, schedule)?;
                schedule.selects.insert(
                    node.id(),
                    SelectControl {
                        then_root: s.then_plan.id(),
                        else_root: s.else_plan.id(),
                    },
                );
            }
            _ => {}
        }

        let executor = self.make_executor(node)?;
        schedule.add_executor(
            node.id(),
            node.dependencies().iter().map(|d| d.id()).collect(),
            node.output_var().to_string(),
            executor,
        );
        Ok(())
    }

    fn make_executor(&self, node: &Arc<PlanNode>) -> DBResult<Box<dyn Executor>> {
        let ctx = self.ctx.clone();
        let executor: Box<dyn Executor> = match node.kind() {
            PlanNodeKind::Start => Box::new(StartExecutor::new(node, ctx)),
            PlanNodeKind::PassThrough => Box::new(PassThroughExecutor::new(node, ctx)),
            PlanNodeKind::Argument(a) => {
                Box::new(ArgumentExecutor::new(node, ctx, a.var_name.clone()))
            }
            PlanNodeKind::Loop(l) => {
                Box::new(LoopExecutor::new(node, ctx, l.condition.clone()))
            }
            PlanNodeKind::Select(s) => {
                Box::new(SelectExecutor::new(node, ctx, s.condition.clone()))
            }

            PlanNodeKind::Filter(f) => {
                Box::new(FilterExecutor::new(node, ctx, f.condition.clone()))
            }
            PlanNodeKind::Project(p) => {
                Box::new(ProjectExecutor::new(node, ctx, p.columns.clone()))
            }
            PlanNodeKind::Sort(s) => Box::new(SortExecutor::new(node, ctx, s.factors.clone())),
            PlanNodeKind::Limit(l) => Box::new(LimitExecutor::new(node, ctx, l.offset, l.count)),
            PlanNodeKind::TopN(t) => Box::new(TopNExecutor::new(
                node,
                ctx,
                t.factors.clone(),
                t.offset,
                t.count,
            )),
            PlanNodeKind::Aggregate(a) => Box::new(AggregateExecutor::new(
                node,
                ctx,
                a.group_keys.clone(),
                a.agg_items.clone(),
            )),
            PlanNodeKind::Dedup => Box::new(DedupExecutor::new(node, ctx)),
            PlanNodeKind::Union => Box::new(UnionExecutor::new(node, ctx)),
            PlanNodeKind::Intersect => Box::new(IntersectExecutor::new(node, ctx)),
            PlanNodeKind::Minus => Box::new(MinusExecutor::new(node, ctx)),
            PlanNodeKind::InnerJoin(j) => Box::new(HashJoinExecutor::inner(node, ctx, j.clone())),
            PlanNodeKind::LeftJoin(j) => Box::new(HashJoinExecutor::left(node, ctx, j.clone())),

            PlanNodeKind::ScanVertices(cfg) => Box::new(ScanVerticesExecutor::new(
                node,
                ctx,
                self.client.clone(),
                cfg.clone(),
                self.complete_required,
            )),
            PlanNodeKind::ScanEdges(cfg) => Box::new(ScanEdgesExecutor::new(
                node,
                ctx,
                self.client.clone(),
                cfg.clone(),
                self.complete_required,
            )),
            PlanNodeKind::TagIndexFullScan(cfg) => Box::new(IndexFullScanExecutor::new(
                node,
                ctx,
                self.client.clone(),
                cfg.clone(),
                false,
                self.complete_required,
            )),
            PlanNodeKind::EdgeIndexFullScan(cfg) => Box::new(IndexFullScanExecutor::new(
                node,
                ctx,
                self.client.clone(),
                cfg.clone(),
                true,
                self.complete_required,
            )),
            PlanNodeKind::IndexScan(cfg) => Box::new(IndexScanExecutor::new(
                node,
                ctx,
                self.client.clone(),
                cfg.clone(),
                self.complete_required,
            )),
            PlanNodeKind::GetVertices(cfg) => Box::new(GetVerticesExecutor::new(
                node,
                ctx,
                self.client.clone(),
                cfg.clone(),
                self.complete_required,
            )),
            PlanNodeKind::GetEdges(cfg) => Box::new(GetEdgesExecutor::new(
                node,
                ctx,
                self.client.clone(),
                cfg.clone(),
                self.complete_required,
            )),
            PlanNodeKind::GetNeighbors(cfg) => Box::new(GetNeighborsExecutor::new(
                node,
                ctx,
                self.client.clone(),
                cfg.clone(),
                self.complete_required,
            )),

            PlanNodeKind::InsertVertices(cfg) => Box::new(InsertVerticesExecutor::new(
                node,
                ctx,
                self.client.clone(),
                cfg.clone(),
                self.complete_required,
            )),
            PlanNodeKind::InsertEdges(cfg) => Box::new(InsertEdgesExecutor::new(
                node,
                ctx,
                self.client.clone(),
                cfg.clone(),
                self.complete_required,
            )),
            PlanNodeKind::UpdateVertex(cfg) => Box::new(UpdateVertexExecutor::new(
                node,
                ctx,
                self.client.clone(),
                cfg.clone(),
                self.complete_required,
            )),
            PlanNodeKind::UpdateEdge(cfg) => Box::new(UpdateEdgeExecutor::new(
                node,
                ctx,
                self.client.clone(),
                cfg.clone(),
                self.complete_required,
            )),
            PlanNodeKind::DeleteVertices(cfg) => Box::new(DeleteVerticesExecutor::new(
                node,
                ctx,
                self.client.clone(),
                cfg.clone(),
                self.complete_required,
            )),
            PlanNodeKind::DeleteEdges(cfg) => Box::new(DeleteEdgesExecutor::new(
                node,
                ctx,
                self.client.clone(),
                cfg.clone(),
                self.complete_required,
            )),

            PlanNodeKind::CreateTagIndex(cfg) => Box::new(CreateTagIndexExecutor::new(
                node,
                ctx,
                self.client.clone(),
                self.catalog.clone(),
                cfg.clone(),
            )),
            PlanNodeKind::DropTagIndex(cfg) => Box::new(DropTagIndexExecutor::new(
                node,
                ctx,
                self.client.clone(),
                self.catalog.clone(),
                cfg.clone(),
            )),
        };
        Ok(executor)
    }
}
