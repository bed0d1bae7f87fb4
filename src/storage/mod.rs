//! 存储协作方接口
//!
//! 查询核心只消费这里定义的异步契约，不关心 RPC 线协议与存储格式。
//! 每个响应携带完成度百分比与分区失败列表：
//! - completeness == 100：完全成功
//! - 0 < completeness < 100：部分成功，继续执行但结果标记降级
//! - completeness == 0 或调用方要求 complete_required：整体失败

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::{DBResult, StorageError};
use crate::core::value::{DataSet, Edge, Value, Vertex};
use crate::query::planner::plan::node_config::IndexQueryContext;

/// 分区失败子码，映射到不同的用户可见错误消息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageErrorCode {
    InvalidFilter,
    InvalidUpdater,
    VertexNotFound,
    EdgeNotFound,
    Unknown,
}

impl StorageErrorCode {
    pub fn to_error(self, target: &str) -> StorageError {
        match self {
            StorageErrorCode::InvalidFilter => StorageError::InvalidFilter,
            StorageErrorCode::InvalidUpdater => StorageError::InvalidUpdater,
            StorageErrorCode::VertexNotFound => StorageError::VertexNotFound(target.to_string()),
            StorageErrorCode::EdgeNotFound => StorageError::EdgeNotFound(target.to_string()),
            StorageErrorCode::Unknown => StorageError::Rpc(format!("unknown failure on {}", target)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartFailure {
    pub part_id: i32,
    pub code: StorageErrorCode,
}

/// 结果完成状态；部分成功以降级标记而非错误呈现给调用方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultState {
    Success,
    PartialSuccess,
}

/// 存储响应：数据 + 完成度 + 分区失败
#[derive(Debug, Clone)]
pub struct StorageResponse<T> {
    pub data: Option<T>,
    pub completeness: u8,
    pub failed_parts: Vec<PartFailure>,
}

impl<T> StorageResponse<T> {
    pub fn complete(data: T) -> Self {
        Self {
            data: Some(data),
            completeness: 100,
            failed_parts: Vec::new(),
        }
    }

    pub fn partial(data: T, completeness: u8, failed_parts: Vec<PartFailure>) -> Self {
        Self {
            data: Some(data),
            completeness,
            failed_parts,
        }
    }

    pub fn total_failure(failed_parts: Vec<PartFailure>) -> Self {
        Self {
            data: None,
            completeness: 0,
            failed_parts,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completeness == 100
    }

    /// 按完成度契约归类：返回数据与结果状态，或整体失败错误
    pub fn classify(self, complete_required: bool, target: &str) -> DBResult<(T, ResultState)> {
        if self.completeness == 100 {
            let data = self
                .data
                .ok_or_else(|| StorageError::Rpc(format!("empty response for {}", target)))?;
            return Ok((data, ResultState::Success));
        }

        if self.completeness == 0 || complete_required {
            let err = self
                .failed_parts
                .first()
                .map(|p| p.code.to_error(target))
                .unwrap_or(StorageError::TotalFailure);
            return Err(err.into());
        }

        let data = self
            .data
            .ok_or_else(|| StorageError::Rpc(format!("partial response without data for {}", target)))?;
        Ok((data, ResultState::PartialSuccess))
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetPropsRequest {
    pub ids: Vec<Value>,
    pub props: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GetNeighborsRequest {
    pub src_ids: Vec<Value>,
    pub edge_types: Vec<String>,
    pub props: Vec<String>,
    /// 行数上限，优化器下推后为 offset + count
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub schema: Option<String>,
    pub props: Vec<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct IndexScanRequest {
    pub schema: String,
    pub is_edge: bool,
    pub contexts: Vec<IndexQueryContext>,
    pub props: Vec<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct UpdateRequest {
    /// 顶点 vid 或边的 (src, dst, type, rank) 序列化键
    pub target: Value,
    pub schema: String,
    pub props: Vec<(String, Value)>,
    /// WHEN 条件是否存在（合法性由存储侧校验）
    pub has_condition: bool,
}

/// 存储/元数据服务的异步客户端契约
#[async_trait]
pub trait StorageClient: Send + Sync + 'static {
    async fn get_props(&self, req: GetPropsRequest) -> DBResult<StorageResponse<DataSet>>;

    async fn get_neighbors(&self, req: GetNeighborsRequest) -> DBResult<StorageResponse<DataSet>>;

    async fn scan_vertices(&self, req: ScanRequest) -> DBResult<StorageResponse<DataSet>>;

    async fn scan_edges(&self, req: ScanRequest) -> DBResult<StorageResponse<DataSet>>;

    async fn index_scan(&self, req: IndexScanRequest) -> DBResult<StorageResponse<DataSet>>;

    async fn add_vertices(
        &self,
        vertices: Vec<Vertex>,
        if_not_exists: bool,
    ) -> DBResult<StorageResponse<i64>>;

    async fn add_edges(
        &self,
        edges: Vec<Edge>,
        if_not_exists: bool,
    ) -> DBResult<StorageResponse<i64>>;

    async fn update_vertex(&self, req: UpdateRequest) -> DBResult<StorageResponse<()>>;

    async fn update_edge(&self, req: UpdateRequest) -> DBResult<StorageResponse<()>>;

    async fn delete_vertices(&self, vids: Vec<Value>) -> DBResult<StorageResponse<i64>>;

    async fn delete_edges(
        &self,
        edge_keys: Vec<(Value, Value, String, i64)>,
    ) -> DBResult<StorageResponse<i64>>;

    /// 元数据侧：建索引（无分区语义，直接成败）
    async fn create_tag_index(
        &self,
        index_name: String,
        tag_name: String,
        fields: Vec<String>,
    ) -> DBResult<()>;

    async fn drop_tag_index(&self, index_name: String) -> DBResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_complete() {
        let resp = StorageResponse::complete(DataSet::new(vec!["a".into()]));
        let (_, state) = resp.classify(false, "v1").expect("classify");
        assert_eq!(state, ResultState::Success);
    }

    #[test]
    fn test_classify_partial_is_degraded_not_error() {
        let resp = StorageResponse::partial(
            DataSet::new(vec!["a".into()]),
            60,
            vec![PartFailure {
                part_id: 3,
                code: StorageErrorCode::Unknown,
            }],
        );
        let (_, state) = resp.classify(false, "v1").expect("classify");
        assert_eq!(state, ResultState::PartialSuccess);
    }

    #[test]
    fn test_classify_partial_with_complete_required() {
        let resp: StorageResponse<DataSet> = StorageResponse::partial(
            DataSet::default(),
            60,
            vec![PartFailure {
                part_id: 1,
                code: StorageErrorCode::VertexNotFound,
            }],
        );
        let err = resp.classify(true, "v42").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_classify_total_failure() {
        let resp: StorageResponse<DataSet> = StorageResponse::total_failure(vec![PartFailure {
            part_id: 1,
            code: StorageErrorCode::InvalidUpdater,
        }]);
        let err = resp.classify(false, "e1").unwrap_err();
        assert!(err.to_string().contains("SET clause"));
    }
}
