//! 存储访问执行器
//!
//! 扫描、取数、索引扫描、写入与索引 DDL。每个存储响应按完成度
//! 契约归类：完全成功、部分成功（降级标记传染到输出变量）、
//! 或整体失败（分区子码映射为用户可见错误）。

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::core::error::DBResult;
use crate::core::expression::{Expression, RowContext};
use crate::core::value::{DataSet, Value};
use crate::query::context::{ExecutionContext, IndexCatalog, IndexField, IndexSchema};
use crate::query::executor::base::{BaseExecutor, Executor, ExecutorStats};
use crate::query::executor::logic::delegate_base;
use crate::query::planner::plan::node_config::*;
use crate::query::planner::plan::PlanNode;
use crate::storage::{
    GetNeighborsRequest, GetPropsRequest, IndexScanRequest, ScanRequest, StorageClient,
    UpdateRequest,
};

/// 输入行集上求取数键；表达式缺省时取第一列
fn collect_keys(
    input: &DataSet,
    src: &Option<Expression>,
    dedup: bool,
) -> DBResult<Vec<Value>> {
    let mut keys = Vec::with_capacity(input.rows.len());
    let mut seen = HashSet::new();
    for row in &input.rows {
        let value = match src {
            Some(expr) => {
                let ctx = RowContext {
                    col_names: &input.col_names,
                    row,
                };
                expr.eval(&ctx)?
            }
            None => row.first().cloned().unwrap_or(Value::Null),
        };
        if value.is_null() {
            continue;
        }
        if dedup && !seen.insert(value.clone()) {
            continue;
        }
        keys.push(value);
    }
    Ok(keys)
}

pub struct ScanVerticesExecutor<S: StorageClient> {
    base: BaseExecutor,
    client: Arc<S>,
    cfg: ScanVerticesNode,
    complete_required: bool,
}

impl<S: StorageClient> ScanVerticesExecutor<S> {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        client: Arc<S>,
        cfg: ScanVerticesNode,
        complete_required: bool,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            client,
            cfg,
            complete_required,
        }
    }
}

#[async_trait]
impl<S: StorageClient> Executor for ScanVerticesExecutor<S> {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let resp = self
            .client
            .scan_vertices(ScanRequest {
                schema: self.cfg.label.clone(),
                props: self.cfg.props.clone(),
                limit: self.cfg.limit,
            })
            .await?;
        let (mut data, state) = resp.classify(self.complete_required, self.base.output_var())?;

        if let Some(filter) = &self.cfg.filter {
            let col_names = data.col_names.clone();
            let mut rows = Vec::with_capacity(data.rows.len());
            for row in data.rows {
                let ctx = RowContext {
                    col_names: &col_names,
                    row: &row,
                };
                if filter.eval(&ctx)?.is_truthy() {
                    rows.push(row);
                }
            }
            data.rows = rows;
        }

        self.base.finish(Value::DataSet(data), state);
        Ok(())
    }
}

pub struct ScanEdgesExecutor<S: StorageClient> {
    base: BaseExecutor,
    client: Arc<S>,
    cfg: ScanEdgesNode,
    complete_required: bool,
}

impl<S: StorageClient> ScanEdgesExecutor<S> {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        client: Arc<S>,
        cfg: ScanEdgesNode,
        complete_required: bool,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            client,
            cfg,
            complete_required,
        }
    }
}

#[async_trait]
impl<S: StorageClient> Executor for ScanEdgesExecutor<S> {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let resp = self
            .client
            .scan_edges(ScanRequest {
                schema: self.cfg.edge_type.clone(),
                props: self.cfg.props.clone(),
                limit: self.cfg.limit,
            })
            .await?;
        let (data, state) = resp.classify(self.complete_required, self.base.output_var())?;
        self.base.finish(Value::DataSet(data), state);
        Ok(())
    }
}

pub struct IndexScanExecutor<S: StorageClient> {
    base: BaseExecutor,
    client: Arc<S>,
    cfg: IndexScanNode,
    complete_required: bool,
}

impl<S: StorageClient> IndexScanExecutor<S> {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        client: Arc<S>,
        cfg: IndexScanNode,
        complete_required: bool,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            client,
            cfg,
            complete_required,
        }
    }
}

#[async_trait]
impl<S: StorageClient> Executor for IndexScanExecutor<S> {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let resp = self
            .client
            .index_scan(IndexScanRequest {
                schema: self.cfg.schema.clone(),
                is_edge: self.cfg.is_edge,
                contexts: self.cfg.contexts.clone(),
                props: self.cfg.props.clone(),
                limit: self.cfg.limit,
            })
            .await?;
        let (data, state) = resp.classify(self.complete_required, &self.cfg.schema)?;
        self.base.finish(Value::DataSet(data), state);
        Ok(())
    }
}

/// 索引全扫描的兜底执行：优化器未命中索引规则时退化为全量扫描
pub struct IndexFullScanExecutor<S: StorageClient> {
    base: BaseExecutor,
    client: Arc<S>,
    cfg: IndexFullScanNode,
    is_edge: bool,
    complete_required: bool,
}

impl<S: StorageClient> IndexFullScanExecutor<S> {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        client: Arc<S>,
        cfg: IndexFullScanNode,
        is_edge: bool,
        complete_required: bool,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            client,
            cfg,
            is_edge,
            complete_required,
        }
    }
}

#[async_trait]
impl<S: StorageClient> Executor for IndexFullScanExecutor<S> {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let req = ScanRequest {
            schema: Some(self.cfg.schema.clone()),
            props: self.cfg.props.clone(),
            limit: None,
        };
        let resp = if self.is_edge {
            self.client.scan_edges(req).await?
        } else {
            self.client.scan_vertices(req).await?
        };
        let (data, state) = resp.classify(self.complete_required, &self.cfg.schema)?;
        self.base.finish(Value::DataSet(data), state);
        Ok(())
    }
}

pub struct GetVerticesExecutor<S: StorageClient> {
    base: BaseExecutor,
    client: Arc<S>,
    cfg: GetVerticesNode,
    complete_required: bool,
}

impl<S: StorageClient> GetVerticesExecutor<S> {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        client: Arc<S>,
        cfg: GetVerticesNode,
        complete_required: bool,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            client,
            cfg,
            complete_required,
        }
    }
}

#[async_trait]
impl<S: StorageClient> Executor for GetVerticesExecutor<S> {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let (input, _) = self.base.input_dataset(0)?;
        let ids = collect_keys(&input, &self.cfg.src, self.cfg.dedup)?;
        let resp = self
            .client
            .get_props(GetPropsRequest {
                ids,
                props: self.cfg.props.clone(),
            })
            .await?;
        let (data, state) = resp.classify(self.complete_required, self.base.output_var())?;
        self.base.finish(Value::DataSet(data), state);
        Ok(())
    }
}

pub struct GetEdgesExecutor<S: StorageClient> {
    base: BaseExecutor,
    client: Arc<S>,
    cfg: GetEdgesNode,
    complete_required: bool,
}

impl<S: StorageClient> GetEdgesExecutor<S> {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        client: Arc<S>,
        cfg: GetEdgesNode,
        complete_required: bool,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            client,
            cfg,
            complete_required,
        }
    }
}

#[async_trait]
impl<S: StorageClient> Executor for GetEdgesExecutor<S> {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let resp = self
            .client
            .scan_edges(ScanRequest {
                schema: self.cfg.edge_type.clone(),
                props: self.cfg.props.clone(),
                limit: self.cfg.limit,
            })
            .await?;
        let (data, state) = resp.classify(self.complete_required, self.base.output_var())?;
        self.base.finish(Value::DataSet(data), state);
        Ok(())
    }
}

/// 邻居扩展：图遍历的核心取数执行器
pub struct GetNeighborsExecutor<S: StorageClient> {
    base: BaseExecutor,
    client: Arc<S>,
    cfg: GetNeighborsNode,
    complete_required: bool,
}

impl<S: StorageClient> GetNeighborsExecutor<S> {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        client: Arc<S>,
        cfg: GetNeighborsNode,
        complete_required: bool,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            client,
            cfg,
            complete_required,
        }
    }
}

#[async_trait]
impl<S: StorageClient> Executor for GetNeighborsExecutor<S> {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let (input, _) = self.base.input_dataset(0)?;
        let src_ids = collect_keys(&input, &self.cfg.src, self.cfg.dedup)?;
        let resp = self
            .client
            .get_neighbors(GetNeighborsRequest {
                src_ids,
                edge_types: self.cfg.edge_types.clone(),
                props: self.cfg.props.clone(),
                limit: self.cfg.limit,
            })
            .await?;
        let (mut data, state) = resp.classify(self.complete_required, self.base.output_var())?;

        if let Some(filter) = &self.cfg.filter {
            let col_names = data.col_names.clone();
            let mut rows = Vec::with_capacity(data.rows.len());
            for row in data.rows {
                let ctx = RowContext {
                    col_names: &col_names,
                    row: &row,
                };
                if filter.eval(&ctx)?.is_truthy() {
                    rows.push(row);
                }
            }
            data.rows = rows;
        }

        self.base.finish(Value::DataSet(data), state);
        Ok(())
    }
}

pub struct InsertVerticesExecutor<S: StorageClient> {
    base: BaseExecutor,
    client: Arc<S>,
    cfg: InsertVerticesNode,
    complete_required: bool,
}

impl<S: StorageClient> InsertVerticesExecutor<S> {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        client: Arc<S>,
        cfg: InsertVerticesNode,
        complete_required: bool,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            client,
            cfg,
            complete_required,
        }
    }
}

#[async_trait]
impl<S: StorageClient> Executor for InsertVerticesExecutor<S> {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let resp = self
            .client
            .add_vertices(self.cfg.vertices.clone(), self.cfg.if_not_exists)
            .await?;
        let (inserted, state) = resp.classify(self.complete_required, self.base.output_var())?;
        self.base.finish(Value::Int(inserted), state);
        Ok(())
    }
}

pub struct InsertEdgesExecutor<S: StorageClient> {
    base: BaseExecutor,
    client: Arc<S>,
    cfg: InsertEdgesNode,
    complete_required: bool,
}

impl<S: StorageClient> InsertEdgesExecutor<S> {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        client: Arc<S>,
        cfg: InsertEdgesNode,
        complete_required: bool,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            client,
            cfg,
            complete_required,
        }
    }
}

#[async_trait]
impl<S: StorageClient> Executor for InsertEdgesExecutor<S> {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let resp = self
            .client
            .add_edges(self.cfg.edges.clone(), self.cfg.if_not_exists)
            .await?;
        let (inserted, state) = resp.classify(self.complete_required, self.base.output_var())?;
        self.base.finish(Value::Int(inserted), state);
        Ok(())
    }
}

/// SET 项求值为属性值；引用列是非法的（UPDATE 无行上下文）
fn eval_set_items(items: &[(String, Expression)]) -> DBResult<Vec<(String, Value)>> {
    let empty_cols: Vec<String> = Vec::new();
    let empty_row: Vec<Value> = Vec::new();
    let ctx = RowContext {
        col_names: &empty_cols,
        row: &empty_row,
    };
    items
        .iter()
        .map(|(name, expr)| Ok((name.clone(), expr.eval(&ctx)?)))
        .collect()
}

pub struct UpdateVertexExecutor<S: StorageClient> {
    base: BaseExecutor,
    client: Arc<S>,
    cfg: UpdateVertexNode,
    complete_required: bool,
}

impl<S: StorageClient> UpdateVertexExecutor<S> {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        client: Arc<S>,
        cfg: UpdateVertexNode,
        complete_required: bool,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            client,
            cfg,
            complete_required,
        }
    }
}

#[async_trait]
impl<S: StorageClient> Executor for UpdateVertexExecutor<S> {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let props = eval_set_items(&self.cfg.set_items)?;
        let target = self.cfg.vid.to_string();
        let resp = self
            .client
            .update_vertex(UpdateRequest {
                target: self.cfg.vid.clone(),
                schema: self.cfg.tag.clone(),
                props,
                has_condition: self.cfg.condition.is_some(),
            })
            .await?;
        let (_, state) = resp.classify(self.complete_required, &target)?;
        self.base.finish(Value::Null, state);
        Ok(())
    }
}

pub struct UpdateEdgeExecutor<S: StorageClient> {
    base: BaseExecutor,
    client: Arc<S>,
    cfg: UpdateEdgeNode,
    complete_required: bool,
}

impl<S: StorageClient> UpdateEdgeExecutor<S> {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        client: Arc<S>,
        cfg: UpdateEdgeNode,
        complete_required: bool,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            client,
            cfg,
            complete_required,
        }
    }
}

#[async_trait]
impl<S: StorageClient> Executor for UpdateEdgeExecutor<S> {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let props = eval_set_items(&self.cfg.set_items)?;
        let target = format!(
            "{}->{}@{}",
            self.cfg.src, self.cfg.dst, self.cfg.rank
        );
        let resp = self
            .client
            .update_edge(UpdateRequest {
                target: Value::String(target.clone()),
                schema: self.cfg.edge_type.clone(),
                props,
                has_condition: self.cfg.condition.is_some(),
            })
            .await?;
        let (_, state) = resp.classify(self.complete_required, &target)?;
        self.base.finish(Value::Null, state);
        Ok(())
    }
}

pub struct DeleteVerticesExecutor<S: StorageClient> {
    base: BaseExecutor,
    client: Arc<S>,
    cfg: DeleteVerticesNode,
    complete_required: bool,
}

impl<S: StorageClient> DeleteVerticesExecutor<S> {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        client: Arc<S>,
        cfg: DeleteVerticesNode,
        complete_required: bool,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            client,
            cfg,
            complete_required,
        }
    }
}

#[async_trait]
impl<S: StorageClient> Executor for DeleteVerticesExecutor<S> {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let resp = self.client.delete_vertices(self.cfg.vids.clone()).await?;
        let (deleted, state) = resp.classify(self.complete_required, self.base.output_var())?;
        self.base.finish(Value::Int(deleted), state);
        Ok(())
    }
}

pub struct DeleteEdgesExecutor<S: StorageClient> {
    base: BaseExecutor,
    client: Arc<S>,
    cfg: DeleteEdgesNode,
    complete_required: bool,
}

impl<S: StorageClient> DeleteEdgesExecutor<S> {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        client: Arc<S>,
        cfg: DeleteEdgesNode,
        complete_required: bool,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            client,
            cfg,
            complete_required,
        }
    }
}

#[async_trait]
impl<S: StorageClient> Executor for DeleteEdgesExecutor<S> {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        let resp = self.client.delete_edges(self.cfg.edge_keys.clone()).await?;
        let (deleted, state) = resp.classify(self.complete_required, self.base.output_var())?;
        self.base.finish(Value::Int(deleted), state);
        Ok(())
    }
}

/// 建索引：元数据侧成功后同步注册到本地索引目录，
/// 后续查询的优化器立即可见
pub struct CreateTagIndexExecutor<S: StorageClient> {
    base: BaseExecutor,
    client: Arc<S>,
    catalog: Arc<IndexCatalog>,
    cfg: CreateTagIndexNode,
}

impl<S: StorageClient> CreateTagIndexExecutor<S> {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        client: Arc<S>,
        catalog: Arc<IndexCatalog>,
        cfg: CreateTagIndexNode,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            client,
            catalog,
            cfg,
        }
    }
}

#[async_trait]
impl<S: StorageClient> Executor for CreateTagIndexExecutor<S> {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        self.client
            .create_tag_index(
                self.cfg.index_name.clone(),
                self.cfg.tag_name.clone(),
                self.cfg.fields.iter().map(|(n, _)| n.clone()).collect(),
            )
            .await?;
        self.catalog.register(IndexSchema {
            name: self.cfg.index_name.clone(),
            schema: self.cfg.tag_name.clone(),
            is_edge: false,
            fields: self
                .cfg
                .fields
                .iter()
                .map(|(name, data_type)| IndexField {
                    name: name.clone(),
                    data_type: *data_type,
                })
                .collect(),
        });
        self.base
            .finish(Value::Null, crate::storage::ResultState::Success);
        Ok(())
    }
}

pub struct DropTagIndexExecutor<S: StorageClient> {
    base: BaseExecutor,
    client: Arc<S>,
    catalog: Arc<IndexCatalog>,
    cfg: DropTagIndexNode,
}

impl<S: StorageClient> DropTagIndexExecutor<S> {
    pub fn new(
        node: &PlanNode,
        ctx: Arc<ExecutionContext>,
        client: Arc<S>,
        catalog: Arc<IndexCatalog>,
        cfg: DropTagIndexNode,
    ) -> Self {
        Self {
            base: BaseExecutor::new(node, ctx),
            client,
            catalog,
            cfg,
        }
    }
}

#[async_trait]
impl<S: StorageClient> Executor for DropTagIndexExecutor<S> {
    delegate_base!();

    async fn execute(&mut self) -> DBResult<()> {
        self.client
            .drop_tag_index(self.cfg.index_name.clone())
            .await?;
        self.catalog.remove(&self.cfg.index_name);
        self.base
            .finish(Value::Null, crate::storage::ResultState::Success);
        Ok(())
    }
}
