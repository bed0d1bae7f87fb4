//! 内建优化规则

mod combine_filter;
mod index_scan;
mod push_filter_down_aggregate;
mod push_filter_down_join;
mod push_filter_down_project;
mod push_limit_down;
mod topn;

pub use combine_filter::CombineFilterRule;
pub use index_scan::IndexScanRule;
pub use push_filter_down_aggregate::PushFilterDownAggregateRule;
pub use push_filter_down_join::PushFilterDownInnerJoinRule;
pub use push_filter_down_project::PushFilterDownProjectRule;
pub use push_limit_down::PushLimitDownProjectRule;
pub use topn::TopNRule;
