//! 控制流集成测试：循环迭代、分支互斥与调度表校验

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::MockStorageClient;
use graphquery::core::expression::Expression;
use graphquery::core::value::{DataSet, Value};
use graphquery::query::context::QueryContext;
use graphquery::query::executor::logic::StartExecutor;
use graphquery::query::executor::ExecutorFactory;
use graphquery::query::planner::plan::{
    ArgumentNode, ExecutionPlan, GetNeighborsNode, LoopNode, PlanNode, PlanNodeKind,
    ScanVerticesNode, SelectNode,
};
use graphquery::query::scheduler::{AsyncScheduler, ExecutionSchedule};

fn node(qctx: &QueryContext, kind: PlanNodeKind, deps: Vec<Arc<PlanNode>>) -> Arc<PlanNode> {
    Arc::new(PlanNode::new(&qctx.id_gen, kind, deps).expect("计划节点构建失败"))
}

fn scan(qctx: &QueryContext, label: &str, props: &[&str]) -> PlanNode {
    let start = node(qctx, PlanNodeKind::Start, vec![]);
    PlanNode::new(
        &qctx.id_gen,
        PlanNodeKind::ScanVertices(ScanVerticesNode {
            label: Some(label.to_string()),
            props: props.iter().map(|p| p.to_string()).collect(),
            filter: None,
            limit: None,
        }),
        vec![start],
    )
    .expect("计划节点构建失败")
}

/// 前沿迭代式遍历：种子写入 frontier 变量，循环体读 frontier 取邻居
/// 再写回 frontier，前沿为空时循环终止。
#[tokio::test]
async fn test_loop_runs_body_until_frontier_drains() {
    let qctx = QueryContext::new();

    let mut mock = MockStorageClient::with_table(
        "seed",
        DataSet::with_rows(vec!["vid".to_string()], vec![vec![Value::from("v1")]]),
    );
    // 前两轮各返回一个邻居，第三轮队列耗尽返回空前沿
    mock.neighbor_batches.get_mut().push_back(DataSet::with_rows(
        vec!["dst".to_string()],
        vec![vec![Value::from("v2")]],
    ));
    mock.neighbor_batches.get_mut().push_back(DataSet::with_rows(
        vec!["dst".to_string()],
        vec![vec![Value::from("v3")]],
    ));
    let client = Arc::new(mock);

    let mut seed = scan(&qctx, "seed", &["vid"]);
    seed.set_output_var("frontier");
    let seed = Arc::new(seed);

    let argument = node(
        &qctx,
        PlanNodeKind::Argument(ArgumentNode {
            var_name: "frontier".to_string(),
        }),
        vec![],
    );
    let mut expand = PlanNode::new(
        &qctx.id_gen,
        PlanNodeKind::GetNeighbors(GetNeighborsNode {
            src: None,
            edge_types: vec!["knows".to_string()],
            props: vec!["dst".to_string()],
            filter: None,
            limit: None,
            dedup: false,
        }),
        vec![argument.clone()],
    )
    .expect("计划节点构建失败");
    expand.set_output_var("frontier");
    let expand = Arc::new(expand);

    let lp = node(
        &qctx,
        PlanNodeKind::Loop(LoopNode {
            body: expand.clone(),
            condition: Expression::variable("frontier"),
        }),
        vec![seed.clone()],
    );

    let plan = ExecutionPlan::new(lp.clone());
    let factory = ExecutorFactory::new(client.clone(), &qctx);
    let schedule = factory.build(&plan).expect("调度表构建失败");
    let scheduler = AsyncScheduler::new(schedule, qctx.values.clone()).expect("调度器构建失败");
    scheduler.run().await.expect("查询执行失败");

    // 两轮有邻居 + 一轮空前沿 = 循环体执行 3 次，条件求值 4 次
    let expand_stats = scheduler
        .executor_stats(expand.id())
        .await
        .expect("循环体执行器缺失");
    assert_eq!(expand_stats.exec_count, 3);
    assert_eq!(client.neighbor_calls.load(Ordering::SeqCst), 3);

    let argument_stats = scheduler
        .executor_stats(argument.id())
        .await
        .expect("参数执行器缺失");
    assert_eq!(argument_stats.exec_count, 3);

    let loop_stats = scheduler
        .executor_stats(lp.id())
        .await
        .expect("循环执行器缺失");
    assert_eq!(loop_stats.exec_count, 4);

    // 种子在循环体外，不随迭代重跑
    let seed_stats = scheduler
        .executor_stats(seed.id())
        .await
        .expect("种子执行器缺失");
    assert_eq!(seed_stats.exec_count, 1);
}

#[tokio::test]
async fn test_select_schedules_only_taken_branch() {
    let qctx = QueryContext::new();
    let client = Arc::new(MockStorageClient::with_table(
        "person",
        DataSet::with_rows(
            vec!["name".to_string()],
            vec![vec![Value::from("alice")], vec![Value::from("bob")]],
        ),
    ));

    let input = node(&qctx, PlanNodeKind::Start, vec![]);
    let then_plan = Arc::new(scan(&qctx, "person", &["name"]));
    let else_plan = node(&qctx, PlanNodeKind::Start, vec![]);
    let select = node(
        &qctx,
        PlanNodeKind::Select(SelectNode {
            condition: Expression::variable("take_then"),
            then_plan: then_plan.clone(),
            else_plan: else_plan.clone(),
        }),
        vec![input],
    );

    qctx.values.set_value("take_then", Value::Bool(true));

    let plan = ExecutionPlan::new(select);
    let factory = ExecutorFactory::new(client, &qctx);
    let schedule = factory.build(&plan).expect("调度表构建失败");
    let scheduler = AsyncScheduler::new(schedule, qctx.values.clone()).expect("调度器构建失败");
    let result = scheduler.run().await.expect("查询执行失败");

    // Select 的输出被命中分支的结果顶替
    match result.value {
        Value::DataSet(ds) => assert_eq!(ds.rows.len(), 2),
        other => panic!("期望行集结果，得到 {}", other.type_name()),
    }

    let taken = scheduler
        .executor_stats(then_plan.id())
        .await
        .expect("then 分支执行器缺失");
    assert_eq!(taken.exec_count, 1);
    let skipped = scheduler
        .executor_stats(else_plan.id())
        .await
        .expect("else 分支执行器缺失");
    assert_eq!(skipped.exec_count, 0);
}

#[tokio::test]
async fn test_select_false_takes_else_branch() {
    let qctx = QueryContext::new();
    let client = Arc::new(MockStorageClient::with_table(
        "person",
        DataSet::with_rows(vec!["name".to_string()], vec![vec![Value::from("alice")]]),
    ));

    let input = node(&qctx, PlanNodeKind::Start, vec![]);
    let then_plan = Arc::new(scan(&qctx, "person", &["name"]));
    let else_plan = node(&qctx, PlanNodeKind::Start, vec![]);
    let select = node(
        &qctx,
        PlanNodeKind::Select(SelectNode {
            condition: Expression::variable("take_then"),
            then_plan: then_plan.clone(),
            else_plan: else_plan.clone(),
        }),
        vec![input],
    );

    qctx.values.set_value("take_then", Value::Bool(false));

    let plan = ExecutionPlan::new(select);
    let factory = ExecutorFactory::new(client, &qctx);
    let schedule = factory.build(&plan).expect("调度表构建失败");
    let scheduler = AsyncScheduler::new(schedule, qctx.values.clone()).expect("调度器构建失败");
    let result = scheduler.run().await.expect("查询执行失败");

    // else 分支是 Start，输出空行集
    match result.value {
        Value::DataSet(ds) => assert!(ds.rows.is_empty()),
        other => panic!("期望行集结果，得到 {}", other.type_name()),
    }

    let skipped = scheduler
        .executor_stats(then_plan.id())
        .await
        .expect("then 分支执行器缺失");
    assert_eq!(skipped.exec_count, 0);
}

/// 循环体内嵌分支时，分支两侧都要算进循环体成员，
/// 迭代间的承诺清理才能覆盖它们
#[tokio::test]
async fn test_loop_members_include_nested_select_branches() {
    let qctx = QueryContext::new();
    let client = Arc::new(MockStorageClient::default());

    let mut seed = scan(&qctx, "seed", &["vid"]);
    seed.set_output_var("frontier");
    let seed = Arc::new(seed);

    let then_plan = node(&qctx, PlanNodeKind::Start, vec![]);
    let else_plan = node(&qctx, PlanNodeKind::Start, vec![]);
    let input = node(&qctx, PlanNodeKind::Start, vec![]);
    let body_select = node(
        &qctx,
        PlanNodeKind::Select(SelectNode {
            condition: Expression::variable("flag"),
            then_plan: then_plan.clone(),
            else_plan: else_plan.clone(),
        }),
        vec![input.clone()],
    );

    let lp = node(
        &qctx,
        PlanNodeKind::Loop(LoopNode {
            body: body_select.clone(),
            condition: Expression::variable("frontier"),
        }),
        vec![seed],
    );

    let plan = ExecutionPlan::new(lp.clone());
    let factory = ExecutorFactory::new(client, &qctx);
    let schedule = factory.build(&plan).expect("调度表构建失败");

    let control = schedule.loops.get(&lp.id()).expect("缺少循环控制项");
    assert_eq!(control.body_root, body_select.id());
    for id in [
        body_select.id(),
        input.id(),
        then_plan.id(),
        else_plan.id(),
    ] {
        assert!(control.body_members.contains(&id));
    }
}

#[test]
fn test_schedule_rejects_dependency_cycle() {
    let qctx = QueryContext::new();
    let a = node(&qctx, PlanNodeKind::Start, vec![]);
    let b = node(&qctx, PlanNodeKind::Start, vec![]);

    let mut schedule = ExecutionSchedule::new(a.id());
    schedule.add_executor(
        a.id(),
        vec![b.id()],
        a.output_var().to_string(),
        Box::new(StartExecutor::new(&a, qctx.values.clone())),
    );
    schedule.add_executor(
        b.id(),
        vec![a.id()],
        b.output_var().to_string(),
        Box::new(StartExecutor::new(&b, qctx.values.clone())),
    );

    let err = schedule.validate().unwrap_err();
    assert!(err.to_string().contains("cycle detected"));
}
