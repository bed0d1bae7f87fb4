//! 集成测试共享的模拟存储客户端

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use graphquery::core::error::DBResult;
use graphquery::core::value::{DataSet, Edge, Value, Vertex};
use graphquery::storage::{
    GetNeighborsRequest, GetPropsRequest, IndexScanRequest, PartFailure, ScanRequest,
    StorageClient, StorageErrorCode, StorageResponse, UpdateRequest,
};

/// 表驱动的模拟存储：按 label 返回固定行集，邻居请求按队列逐批吐出。
/// partial_scan / fail_scan 用于演练完成度契约的降级与失败路径。
#[derive(Default)]
pub struct MockStorageClient {
    pub vertex_tables: HashMap<String, DataSet>,
    pub partial_scan: bool,
    pub fail_scan: bool,
    pub neighbor_batches: Mutex<VecDeque<DataSet>>,
    pub index_rows: Option<DataSet>,
    pub scan_calls: AtomicU64,
    pub neighbor_calls: AtomicU64,
    pub index_requests: Mutex<Vec<IndexScanRequest>>,
}

impl MockStorageClient {
    pub fn with_table(label: &str, data: DataSet) -> Self {
        let mut mock = Self::default();
        mock.vertex_tables.insert(label.to_string(), data);
        mock
    }

    fn table_for(&self, req: &ScanRequest) -> DataSet {
        req.schema
            .as_deref()
            .and_then(|label| self.vertex_tables.get(label))
            .cloned()
            .unwrap_or_else(|| DataSet::new(req.props.clone()))
    }
}

#[async_trait]
impl StorageClient for MockStorageClient {
    async fn get_props(&self, req: GetPropsRequest) -> DBResult<StorageResponse<DataSet>> {
        let rows = req.ids.into_iter().map(|id| vec![id]).collect();
        Ok(StorageResponse::complete(DataSet::with_rows(
            vec!["vid".to_string()],
            rows,
        )))
    }

    async fn get_neighbors(&self, _req: GetNeighborsRequest) -> DBResult<StorageResponse<DataSet>> {
        self.neighbor_calls.fetch_add(1, Ordering::SeqCst);
        let batch = self
            .neighbor_batches
            .lock()
            .pop_front()
            .unwrap_or_else(|| DataSet::new(vec!["dst".to_string()]));
        Ok(StorageResponse::complete(batch))
    }

    async fn scan_vertices(&self, req: ScanRequest) -> DBResult<StorageResponse<DataSet>> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_scan {
            return Ok(StorageResponse::total_failure(vec![PartFailure {
                part_id: 1,
                code: StorageErrorCode::Unknown,
            }]));
        }
        let data = self.table_for(&req);
        if self.partial_scan {
            return Ok(StorageResponse::partial(
                data,
                60,
                vec![PartFailure {
                    part_id: 2,
                    code: StorageErrorCode::Unknown,
                }],
            ));
        }
        Ok(StorageResponse::complete(data))
    }

    async fn scan_edges(&self, req: ScanRequest) -> DBResult<StorageResponse<DataSet>> {
        Ok(StorageResponse::complete(DataSet::new(req.props)))
    }

    async fn index_scan(&self, req: IndexScanRequest) -> DBResult<StorageResponse<DataSet>> {
        let data = self
            .index_rows
            .clone()
            .unwrap_or_else(|| DataSet::new(req.props.clone()));
        self.index_requests.lock().push(req);
        Ok(StorageResponse::complete(data))
    }

    async fn add_vertices(
        &self,
        vertices: Vec<Vertex>,
        _if_not_exists: bool,
    ) -> DBResult<StorageResponse<i64>> {
        Ok(StorageResponse::complete(vertices.len() as i64))
    }

    async fn add_edges(
        &self,
        edges: Vec<Edge>,
        _if_not_exists: bool,
    ) -> DBResult<StorageResponse<i64>> {
        Ok(StorageResponse::complete(edges.len() as i64))
    }

    async fn update_vertex(&self, _req: UpdateRequest) -> DBResult<StorageResponse<()>> {
        Ok(StorageResponse::complete(()))
    }

    async fn update_edge(&self, _req: UpdateRequest) -> DBResult<StorageResponse<()>> {
        Ok(StorageResponse::complete(()))
    }

    async fn delete_vertices(&self, vids: Vec<Value>) -> DBResult<StorageResponse<i64>> {
        Ok(StorageResponse::complete(vids.len() as i64))
    }

    async fn delete_edges(
        &self,
        edge_keys: Vec<(Value, Value, String, i64)>,
    ) -> DBResult<StorageResponse<i64>> {
        Ok(StorageResponse::complete(edge_keys.len() as i64))
    }

    async fn create_tag_index(
        &self,
        _index_name: String,
        _tag_name: String,
        _fields: Vec<String>,
    ) -> DBResult<()> {
        Ok(())
    }

    async fn drop_tag_index(&self, _index_name: String) -> DBResult<()> {
        Ok(())
    }
}
