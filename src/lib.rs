//! GraphQuery - 分布式图数据库的查询处理核心
//!
//! 包含计划图模型、符号表、贪心规则优化器、执行器 DAG 与
//! 异步调度器。解析、校验与存储引擎属于外部协作方，本 crate
//! 通过 StorageClient 抽象与存储层交互。

pub mod config;
pub mod core;
pub mod query;
pub mod storage;
pub mod utils;
