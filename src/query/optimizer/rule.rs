//! 规则协议
//!
//! 贪心改写：替代式规则总是 erase_curr，组内最后写入的候选生效，
//! 引擎不做代价比较。match_rule 做模式之外的廉价预判，
//! transform 产出新候选与擦除标志。

use crate::core::error::{DBError, DBResult, OptimizerError};
use crate::query::optimizer::context::OptContext;
use crate::query::optimizer::group::OptGroupNode;
use crate::query::optimizer::pattern::{MatchedResult, Pattern};

/// 变换结果
#[derive(Debug, Default)]
pub struct TransformResult {
    pub new_group_nodes: Vec<OptGroupNode>,
    /// 擦除被命中的候选
    pub erase_curr: bool,
    /// 清空整个组的候选（整组改写，如索引选择）
    pub erase_all: bool,
}

impl TransformResult {
    /// 规则决定本次不改写
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// 以新候选替换被命中候选
    pub fn substitute(node: OptGroupNode) -> Self {
        Self {
            new_group_nodes: vec![node],
            erase_curr: true,
            erase_all: false,
        }
    }

    /// 以新候选整组替换
    pub fn replace_all(node: OptGroupNode) -> Self {
        Self {
            new_group_nodes: vec![node],
            erase_curr: false,
            erase_all: true,
        }
    }

    pub fn is_noop(&self) -> bool {
        !self.erase_curr && !self.erase_all && self.new_group_nodes.is_empty()
    }
}

pub trait OptRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn pattern(&self) -> Pattern;

    /// true 表示先优化完依赖组再应用本规则；
    /// 下推类规则返回 false，自顶向下逐层推进
    fn deps_first(&self) -> bool {
        false
    }

    /// 模式之外的额外预判；返回 false 则本轮放弃
    fn match_rule(&self, _ctx: &OptContext, _matched: &MatchedResult) -> DBResult<bool> {
        Ok(true)
    }

    fn transform(&self, ctx: &mut OptContext, matched: &MatchedResult)
        -> DBResult<TransformResult>;
}

pub(crate) fn rule_failed(rule: &str, message: impl Into<String>) -> DBError {
    OptimizerError::RuleFailed {
        rule: rule.to_string(),
        message: message.into(),
    }
    .into()
}
