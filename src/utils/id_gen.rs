//! 计划节点 ID 生成器
//!
//! 查询级别的单调递增 ID，计划节点与其镜像执行器共用同一 ID 空间。

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicI64,
}

impl IdGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next: AtomicI64::new(0),
        })
    }

    pub fn next_id(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn issued(&self) -> i64 {
        self.next.load(Ordering::Relaxed)
    }
}
