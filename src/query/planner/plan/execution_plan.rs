//! 执行计划
//!
//! 以单一根节点表示的计划 DAG，附带诊断用的树形打印。

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::query::planner::plan::node::{PlanNode, PlanNodeKind};

#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub root: Arc<PlanNode>,
}

impl ExecutionPlan {
    pub fn new(root: Arc<PlanNode>) -> Self {
        Self { root }
    }

    /// 可达节点数（菱形共享只计一次）
    pub fn node_count(&self) -> usize {
        let mut seen = HashSet::new();
        Self::count_from(&self.root, &mut seen);
        seen.len()
    }

    fn count_from(node: &Arc<PlanNode>, seen: &mut HashSet<i64>) {
        if !seen.insert(node.id()) {
            return;
        }
        for dep in node.dependencies() {
            Self::count_from(dep, seen);
        }
        match node.kind() {
            PlanNodeKind::Loop(l) => Self::count_from(&l.body, seen),
            PlanNodeKind::Select(s) => {
                Self::count_from(&s.then_plan, seen);
                Self::count_from(&s.else_plan, seen);
            }
            _ => {}
        }
    }

    /// 依赖树的文本渲染，日志与测试断言使用
    pub fn format_tree(&self) -> String {
        let mut out = String::new();
        Self::format_node(&self.root, 0, &mut out);
        out
    }

    fn format_node(node: &Arc<PlanNode>, depth: usize, out: &mut String) {
        let _ = writeln!(out, "{}{}", "  ".repeat(depth), node);
        match node.kind() {
            PlanNodeKind::Loop(l) => {
                let _ = writeln!(out, "{}[body]", "  ".repeat(depth + 1));
                Self::format_node(&l.body, depth + 2, out);
            }
            PlanNodeKind::Select(s) => {
                let _ = writeln!(out, "{}[then]", "  ".repeat(depth + 1));
                Self::format_node(&s.then_plan, depth + 2, out);
                let _ = writeln!(out, "{}[else]", "  ".repeat(depth + 1));
                Self::format_node(&s.else_plan, depth + 2, out);
            }
            _ => {}
        }
        for dep in node.dependencies() {
            Self::format_node(dep, depth + 1, out);
        }
    }
}
