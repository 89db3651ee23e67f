//! Flow orchestration against recording mock connections.

mod common;

use std::sync::Arc;

use common::{read, runner, services, write, MockConnector};
use oxide_dal::{ExecKind, Record, SqlItem};
use oxide_flow::{
    CancelSignal, FlowContext, FlowDefinition, FlowError, FunctionRegistry, Result, Step,
    RESULT_KEY,
};
use serde_json::json;

fn three_writes() -> (Vec<SqlItem>, FlowDefinition) {
    let items = vec![
        write("first", "INSERT INTO a VALUES (1)"),
        write("second", "INSERT INTO b VALUES (2)"),
        write("third", "INSERT INTO c VALUES (3)"),
    ];
    let flow = FlowDefinition::new(
        "writes",
        vec![
            Step::sql("one", "first"),
            Step::sql("two", "second"),
            Step::sql("three", "third"),
        ],
    );
    (items, flow)
}

#[tokio::test]
async fn test_successful_writes_commit_once() {
    let (items, flow) = three_writes();
    let connector = MockConnector::default();
    let runner = runner(services(items, vec![flow], FunctionRegistry::new()), &connector);

    let result = runner.run("writes", json!({}), &CancelSignal::new()).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.data, json!(1));
    assert_eq!(
        connector.journal.entries(),
        vec![
            "main open",
            "main begin",
            "main execute INSERT INTO a VALUES (1)",
            "main execute INSERT INTO b VALUES (2)",
            "main execute INSERT INTO c VALUES (3)",
            "main commit",
            "main close",
        ]
    );
}

#[tokio::test]
async fn test_failing_third_write_rolls_back_and_closes_once() {
    let (items, flow) = three_writes();
    let connector = MockConnector::failing_on("INTO c");
    let runner = runner(services(items, vec![flow], FunctionRegistry::new()), &connector);

    let mut context = FlowContext::new();
    let err = runner
        .execute(&mut context, "writes", json!({}), &CancelSignal::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("simulated failure"));

    let main = context.get("main").expect("main was opened");
    assert!(main.is_errored());
    assert!(main.in_transaction());
    assert_eq!(main.pending(), 2);

    context.finalize().await;
    context.finalize().await;
    assert!(context.get("main").unwrap().is_closed());

    let journal = &connector.journal;
    assert_eq!(journal.count("main rollback"), 1);
    assert_eq!(journal.count("main commit"), 0);
    assert_eq!(journal.count("main close"), 1);
    assert_eq!(
        journal.entries().last().map(String::as_str),
        Some("main close")
    );
}

#[tokio::test]
async fn test_finalization_failures_do_not_change_the_result() {
    let (items, flow) = three_writes();
    let connector = MockConnector::failing_to_finish();
    let runner = runner(services(items, vec![flow], FunctionRegistry::new()), &connector);

    let result = runner.run("writes", json!({}), &CancelSignal::new()).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.code, "");
    assert_eq!(result.message, "");
    assert_eq!(result.data, json!(1));
    assert_eq!(connector.journal.count("main commit"), 1);
    assert_eq!(connector.journal.count("main close"), 1);
}

#[tokio::test]
async fn test_rollback_failure_keeps_the_step_error() {
    let (items, flow) = three_writes();
    let connector = MockConnector {
        fail_when: Some("INTO c".to_string()),
        ..MockConnector::failing_to_finish()
    };
    let runner = runner(services(items, vec![flow], FunctionRegistry::new()), &connector);

    let result = runner.run("writes", json!({}), &CancelSignal::new()).await;

    assert!(!result.success);
    assert!(result.message.contains("simulated failure on INTO c"));
    assert_eq!(connector.journal.count("main rollback"), 1);
    assert_eq!(connector.journal.count("main close"), 1);
}

#[tokio::test]
async fn test_failure_result_has_message_and_empty_code() {
    let (items, flow) = three_writes();
    let connector = MockConnector::failing_on("INTO c");
    let runner = runner(services(items, vec![flow], FunctionRegistry::new()), &connector);

    let result = runner.run("writes", json!({}), &CancelSignal::new()).await;

    assert!(!result.success);
    assert_eq!(result.code, "");
    assert!(result.message.contains("simulated failure"));
    assert_eq!(connector.journal.count("main rollback"), 1);
    assert_eq!(connector.journal.count("main close"), 1);
}

#[tokio::test]
async fn test_read_only_paged_step_reads_twice_without_transaction() {
    let items = vec![read("users", "SELECT * FROM users")];
    let flow = FlowDefinition::new(
        "list",
        vec![Step::sql("users", "users")
            .arg("pageIndex", 2)
            .arg("pageSize", 10)],
    );
    let connector = MockConnector::default();
    let runner = runner(services(items, vec![flow], FunctionRegistry::new()), &connector);

    let result = runner.run("list", json!({}), &CancelSignal::new()).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.data, json!({"total": 3, "rows": [{"id": 1}]}));
    assert_eq!(
        connector.journal.entries(),
        vec![
            "main open",
            "main scalar SELECT COUNT(*) FROM (SELECT * FROM users) X",
            "main query SELECT * FROM users\nLIMIT 10,10",
            "main close",
        ]
    );
}

#[tokio::test]
async fn test_page_beyond_row_range_runs_nothing() {
    let items = vec![read("users", "SELECT * FROM users")];
    let flow = FlowDefinition::new(
        "list",
        vec![Step::sql("users", "users")
            .arg("pageIndex", "$input.page")
            .arg("pageSize", 1000)],
    );
    let connector = MockConnector::default();
    let runner = runner(services(items, vec![flow], FunctionRegistry::new()), &connector);

    let result = runner
        .run("list", json!({"page": u64::MAX / 100}), &CancelSignal::new())
        .await;

    assert!(!result.success);
    assert!(result.message.contains("out of range"), "{}", result.message);
    assert_eq!(connector.journal.entries(), vec!["main open", "main close"]);
}

#[tokio::test]
async fn test_filter_sort_and_params_reach_the_statement() {
    let items = vec![read("orders", "SELECT * FROM orders WHERE tenant = @tenant")];
    let flow = FlowDefinition::new(
        "search",
        vec![Step::sql("orders", "orders")
            .arg("tenant", "$input.tenant")
            .arg("filter", json!({"Compare": {"name": "total", "op": "Gte", "value": 100}}))
            .arg("sort", "created DESC")],
    );
    let connector = MockConnector::default();
    let runner = runner(services(items, vec![flow], FunctionRegistry::new()), &connector);

    let result = runner
        .run("search", json!({"tenant": 4}), &CancelSignal::new())
        .await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.data, json!([{"id": 1}]));
    assert_eq!(
        connector.journal.entries()[1],
        "main query SELECT * FROM (SELECT * FROM orders WHERE tenant = @tenant) N \
         WHERE total >= @P1\nORDER BY created DESC {\"P1\":100,\"tenant\":4}"
    );
}

#[tokio::test]
async fn test_step_outputs_feed_later_steps() {
    let items = vec![
        write("save", "UPDATE accounts SET owner = @owner WHERE id = @id"),
        SqlItem::new("total", "SELECT SUM(x) FROM y")
            .connection("main")
            .read_only()
            .kind(ExecKind::Scalar),
    ];
    let functions = FunctionRegistry::new().with("lookup", |args: &Record| -> Result<Record> {
        let id = args.int("id").unwrap_or_default();
        Ok(Record::new().with(RESULT_KEY, json!({"id": id, "owner": "ada"})))
    });
    let flow = FlowDefinition::new(
        "assign",
        vec![
            Step::function("account", "lookup").arg("id", "$input.id"),
            Step::sql("saved", "save")
                .arg("id", "$account.id")
                .arg("owner", "$account.owner"),
            Step::sql("sum", "total"),
        ],
    );
    let connector = MockConnector::default();
    let runner = runner(services(items, vec![flow], functions), &connector);

    let result = runner.run("assign", json!({"id": 12}), &CancelSignal::new()).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.data, json!(3));
    let entries = connector.journal.entries();
    assert!(entries.contains(
        &"main execute UPDATE accounts SET owner = @owner WHERE id = @id {\"id\":12,\"owner\":\"ada\"}"
            .to_string()
    ));
    assert_eq!(connector.journal.count("main commit"), 1);
}

#[tokio::test]
async fn test_coded_function_error_keeps_code_and_rolls_back() {
    let items = vec![write("reserve", "UPDATE stock SET n = n - 1")];
    let functions = FunctionRegistry::new().with("charge", |_: &Record| -> Result<Record> {
        Err(FlowError::coded("PAYMENT_DECLINED", "card declined"))
    });
    let flow = FlowDefinition::new(
        "checkout",
        vec![Step::sql("reserve", "reserve"), Step::function("pay", "charge")],
    );
    let connector = MockConnector::default();
    let runner = runner(services(items, vec![flow], functions), &connector);

    let result = runner.run("checkout", json!({}), &CancelSignal::new()).await;

    assert!(!result.success);
    assert_eq!(result.code, "PAYMENT_DECLINED");
    assert_eq!(result.message, "card declined");
    assert_eq!(connector.journal.count("main rollback"), 1);
    assert_eq!(connector.journal.count("main commit"), 0);
}

#[tokio::test]
async fn test_function_without_result_is_an_error() {
    let functions = FunctionRegistry::new().with("noop", |_: &Record| -> Result<Record> {
        Ok(Record::new())
    });
    let flow = FlowDefinition::new("f", vec![Step::function("n", "noop")]);
    let connector = MockConnector::default();
    let runner = runner(services(vec![], vec![flow], functions), &connector);

    let result = runner.run("f", json!({}), &CancelSignal::new()).await;

    assert!(!result.success);
    assert_eq!(result.code, "");
    assert_eq!(result.message, "Function 'noop' returned no result");
    assert!(connector.journal.entries().is_empty());
}

#[tokio::test]
async fn test_nested_flow_shares_the_transaction() {
    let items = vec![
        write("parent_write", "INSERT INTO parent VALUES (1)"),
        write("child_write", "INSERT INTO child VALUES (@n)"),
    ];
    let flows = vec![
        FlowDefinition::new("child", vec![Step::sql("w", "child_write").arg("n", "$input.n")]),
        FlowDefinition::new(
            "parent",
            vec![
                Step::sql("p", "parent_write"),
                Step::flow("c", "child").arg("n", 5),
            ],
        ),
    ];
    let connector = MockConnector::default();
    let runner = runner(services(items, flows, FunctionRegistry::new()), &connector);

    let result = runner.run("parent", json!({}), &CancelSignal::new()).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(
        connector.journal.entries(),
        vec![
            "main open",
            "main begin",
            "main execute INSERT INTO parent VALUES (1)",
            "main execute INSERT INTO child VALUES (@n) {\"n\":5}",
            "main commit",
            "main close",
        ]
    );
}

#[tokio::test]
async fn test_nested_failure_rolls_back_the_parent() {
    let items = vec![
        write("parent_write", "INSERT INTO parent VALUES (1)"),
        write("child_write", "INSERT INTO child VALUES (2)"),
    ];
    let flows = vec![
        FlowDefinition::new("child", vec![Step::sql("w", "child_write")]),
        FlowDefinition::new(
            "parent",
            vec![Step::sql("p", "parent_write"), Step::flow("c", "child")],
        ),
    ];
    let connector = MockConnector::failing_on("INTO child");
    let runner = runner(services(items, flows, FunctionRegistry::new()), &connector);

    let result = runner.run("parent", json!({}), &CancelSignal::new()).await;

    assert!(!result.success);
    assert_eq!(connector.journal.count("main rollback"), 1);
    assert_eq!(connector.journal.count("main commit"), 0);
    assert_eq!(connector.journal.count("main close"), 1);
}

#[tokio::test]
async fn test_failure_rolls_back_every_connection() {
    let items = vec![
        write("order", "INSERT INTO orders VALUES (1)"),
        SqlItem::new("audit", "INSERT INTO audit_log VALUES ('x')")
            .connection("audit")
            .kind(ExecKind::Execute),
        write("broken", "INSERT INTO broken VALUES (1)"),
    ];
    let flow = FlowDefinition::new(
        "audited",
        vec![
            Step::sql("order", "order"),
            Step::sql("audit", "audit"),
            Step::sql("broken", "broken"),
        ],
    );
    let connector = MockConnector::failing_on("broken");
    let runner = runner(services(items, vec![flow], FunctionRegistry::new()), &connector);

    let result = runner.run("audited", json!({}), &CancelSignal::new()).await;

    assert!(!result.success);
    for name in ["main", "audit"] {
        assert_eq!(connector.journal.count(&format!("{name} rollback")), 1);
        assert_eq!(connector.journal.count(&format!("{name} close")), 1);
        assert_eq!(connector.journal.count(&format!("{name} commit")), 0);
    }
}

#[tokio::test]
async fn test_recursive_flow_hits_depth_limit() {
    let flow = FlowDefinition::new("again", vec![Step::flow("inner", "again")]);
    let connector = MockConnector::default();
    let runner = runner(services(vec![], vec![flow], FunctionRegistry::new()), &connector);

    let result = runner.run("again", json!({}), &CancelSignal::new()).await;

    assert!(!result.success);
    assert_eq!(result.message, "Flow nesting exceeds 16 levels");
}

#[tokio::test]
async fn test_cancel_before_start_opens_nothing() {
    let (items, flow) = three_writes();
    let connector = MockConnector::default();
    let runner = runner(services(items, vec![flow], FunctionRegistry::new()), &connector);
    let cancel = CancelSignal::new();
    cancel.cancel();

    let result = runner.run("writes", json!({}), &cancel).await;

    assert!(!result.success);
    assert_eq!(result.code, "cancelled");
    assert!(connector.journal.entries().is_empty());
}

#[tokio::test]
async fn test_cancel_between_steps_rolls_back() {
    let cancel = CancelSignal::new();
    let trigger = cancel.clone();
    let items = vec![
        write("first", "INSERT INTO a VALUES (1)"),
        write("second", "INSERT INTO b VALUES (2)"),
    ];
    let functions = FunctionRegistry::new().with("stop", move |_: &Record| -> Result<Record> {
        trigger.cancel();
        Ok(Record::new().with(RESULT_KEY, true))
    });
    let flow = FlowDefinition::new(
        "interrupted",
        vec![
            Step::sql("one", "first"),
            Step::function("stop", "stop"),
            Step::sql("two", "second"),
        ],
    );
    let connector = MockConnector::default();
    let runner = runner(services(items, vec![flow], functions), &connector);

    let result = runner.run("interrupted", json!({}), &cancel).await;

    assert_eq!(result.code, "cancelled");
    let entries = connector.journal.entries();
    assert!(!entries.iter().any(|e| e.contains("INTO b")));
    assert_eq!(connector.journal.count("main rollback"), 1);
    assert_eq!(connector.journal.count("main close"), 1);
}

#[tokio::test]
async fn test_panicking_step_still_finalizes() {
    let items = vec![write("first", "INSERT INTO a VALUES (1)")];
    let functions = FunctionRegistry::new().with("explode", |_: &Record| -> Result<Record> {
        panic!("boom");
    });
    let flow = FlowDefinition::new(
        "fragile",
        vec![Step::sql("one", "first"), Step::function("bang", "explode")],
    );
    let connector = MockConnector::default();
    let runner = runner(services(items, vec![flow], functions), &connector);

    let result = runner.run("fragile", json!({}), &CancelSignal::new()).await;

    assert!(!result.success);
    assert_eq!(result.message, "Step 'bang' panicked: boom");
    assert_eq!(connector.journal.count("main rollback"), 1);
    assert_eq!(connector.journal.count("main close"), 1);
}

#[tokio::test]
async fn test_unknown_names_fail_fast() {
    let flow = FlowDefinition::new("bad", vec![Step::sql("q", "missing")]);
    let connector = MockConnector::default();
    let runner = runner(services(vec![], vec![flow], FunctionRegistry::new()), &connector);

    let result = runner.run("bad", json!({}), &CancelSignal::new()).await;
    assert_eq!(result.message, "unknown SQL definition: missing");

    let result = runner.run("nope", json!({}), &CancelSignal::new()).await;
    assert_eq!(result.message, "Unknown flow: nope");
    assert!(connector.journal.entries().is_empty());
}

#[tokio::test]
async fn test_spawned_flow() {
    let (items, flow) = three_writes();
    let connector = MockConnector::default();
    let runner = Arc::new(runner(
        services(items, vec![flow], FunctionRegistry::new()),
        &connector,
    ));

    let handle = runner.spawn("writes", json!({}), CancelSignal::new());
    let result = handle.await.unwrap();

    assert!(result.success, "{}", result.message);
    assert_eq!(connector.journal.count("main commit"), 1);
}
