
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gsh::config::{DispatchConfig, FailurePolicy};
use gsh::error::{GshError, Result};
use gsh::node::Node;
use gsh::output::OutputSink;
use gsh::source::local::parse_list;
use gsh::worker::{CommandExecutor, ExecOutcome, NodeStatus, RemoteExecutor, WorkerPool};
use tempfile::TempDir;
use test_harness::{cmd, nodes, numbered_nodes, pool_with, script_node, write_script, RecordingExecutor};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_single_worker_processes_list_in_order() {
    let executor = Arc::new(RecordingExecutor::new());
    let (pool, _sink) = pool_with(DispatchConfig::new(1), executor.clone());

    let report = pool
        .begin(parse_list("node1,node2,node3").unwrap(), cmd(&["testCmd"]))
        .await
        .unwrap();

    assert_eq!(executor.addresses(), vec!["node1", "node2", "node3"]);
    assert_eq!(report.total(), 3);
    assert_eq!(report.count(NodeStatus::Completed), 3);
}

#[tokio::test]
async fn test_every_call_gets_shared_command() {
    let executor = Arc::new(RecordingExecutor::new().expecting(&["testCmd"], "node"));
    let (pool, _sink) = pool_with(DispatchConfig::new(3), executor.clone());

    let report = pool
        .begin(numbered_nodes(3), cmd(&["testCmd"]))
        .await
        .unwrap();

    assert_eq!(executor.calls().len(), 3);
    assert!(executor
        .calls()
        .iter()
        .all(|(_, c)| c == &cmd(&["testCmd"])));
    assert_eq!(report.count(NodeStatus::Completed), 3);
}

#[tokio::test]
async fn test_empty_node_list_returns_immediately() {
    let executor = Arc::new(RecordingExecutor::new());
    let (pool, sink) = pool_with(DispatchConfig::new(4), executor.clone());

    let report = tokio::time::timeout(
        Duration::from_secs(2),
        pool.begin(Vec::new(), cmd(&["testCmd"])),
    )
    .await
    .expect("begin should not block on an empty node list")
    .unwrap();

    assert!(executor.calls().is_empty());
    assert_eq!(report.total(), 0);
    assert!(sink.lines().unwrap().is_empty());
}

#[tokio::test]
async fn test_echo_executor_completes_without_deadlock() {
    let executor = Arc::new(CommandExecutor::with_program("echo"));
    let (pool, sink) = pool_with(DispatchConfig::new(1), executor);

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        pool.begin(numbered_nodes(3), cmd(&["testCmd"])),
    )
    .await
    .expect("pool should not deadlock")
    .unwrap();

    assert_eq!(report.count(NodeStatus::Completed), 3);
    let rendered: Vec<String> = sink
        .lines()
        .unwrap()
        .iter()
        .map(|l| l.to_string())
        .collect();
    assert_eq!(
        rendered,
        vec![
            "node1: node1 testCmd",
            "node2: node2 testCmd",
            "node3: node3 testCmd",
        ]
    );
}

#[tokio::test]
async fn test_each_node_processed_exactly_once() {
    for workers in [1, 2, 7, 64] {
        let executor = Arc::new(RecordingExecutor::new());
        let (pool, _sink) = pool_with(DispatchConfig::new(workers), executor.clone());

        let report = pool.begin(numbered_nodes(50), cmd(&["x"])).await.unwrap();

        let mut seen: HashMap<String, usize> = HashMap::new();
        for address in executor.addresses() {
            *seen.entry(address).or_default() += 1;
        }
        assert_eq!(seen.len(), 50, "workers={}", workers);
        assert!(seen.values().all(|&n| n == 1), "workers={}", workers);
        assert_eq!(report.dispatched(), 50);
    }
}

#[tokio::test]
async fn test_concurrency_never_exceeds_worker_count() {
    let executor = Arc::new(RecordingExecutor::new().with_delay(Duration::from_millis(50)));
    let (pool, _sink) = pool_with(DispatchConfig::new(3), executor.clone());

    pool.begin(numbered_nodes(12), cmd(&["x"])).await.unwrap();

    assert_eq!(executor.calls().len(), 12);
    assert!(
        executor.peak_concurrency() <= 3,
        "peak concurrency {} exceeded 3 workers",
        executor.peak_concurrency()
    );
    assert!(executor.peak_concurrency() >= 2, "workers should overlap");
}

#[tokio::test]
async fn test_per_node_line_order_preserved_under_concurrency() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        "count.sh",
        "i=1\nwhile [ $i -le 200 ]; do echo $i; if [ $((i % 50)) -eq 0 ]; then echo err$i >&2; fi; i=$((i+1)); done\n",
    );
    let targets: Vec<Node> = (1..=4)
        .map(|i| script_node(&format!("node{}", i), &script))
        .collect();

    let executor = Arc::new(CommandExecutor::with_program("sh"));
    let (pool, sink) = pool_with(DispatchConfig::new(4), executor);

    let report = pool.begin(targets, Vec::new()).await.unwrap();
    assert_eq!(report.count(NodeStatus::Completed), 4);

    for i in 1..=4 {
        let lines = sink.lines_for(&format!("node{}", i)).unwrap();
        let stdout: Vec<String> = lines
            .iter()
            .filter(|l| !l.starts_with("err"))
            .cloned()
            .collect();
        let stderr: Vec<String> = lines
            .iter()
            .filter(|l| l.starts_with("err"))
            .cloned()
            .collect();
        let expected: Vec<String> = (1..=200).map(|n| n.to_string()).collect();
        assert_eq!(stdout, expected, "node{} stdout reordered", i);
        assert_eq!(stderr, vec!["err50", "err100", "err150", "err200"]);
    }
}

#[tokio::test]
async fn test_failed_node_does_not_stop_others() {
    let executor = Arc::new(RecordingExecutor::new().failing_on("node2"));
    let (pool, _sink) = pool_with(DispatchConfig::new(2), executor.clone());

    let report = pool.begin(numbered_nodes(5), cmd(&["x"])).await.unwrap();

    assert_eq!(executor.calls().len(), 5);
    assert_eq!(report.count(NodeStatus::Completed), 4);
    assert_eq!(report.count(NodeStatus::Failed), 1);
    let failed = report.report_for("node2").unwrap();
    assert_eq!(failed.status, NodeStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("simulated failure"));
    assert!(report.is_failure(false));
}

#[tokio::test]
async fn test_spawn_failure_isolated_per_node() {
    let executor = Arc::new(CommandExecutor::with_program("nonexistent_program_12345"));
    let (pool, _sink) = pool_with(DispatchConfig::new(2), executor);

    let report = pool.begin(numbered_nodes(3), cmd(&["x"])).await.unwrap();

    assert_eq!(report.count(NodeStatus::Failed), 3);
    assert_eq!(report.dispatched(), 3);
}

#[tokio::test]
async fn test_abort_policy_skips_remaining_nodes() {
    let executor = Arc::new(RecordingExecutor::new().failing_on("node1"));
    let config = DispatchConfig::new(1).with_failure_policy(FailurePolicy::Abort);
    let (pool, _sink) = pool_with(config, executor.clone());

    let report = pool.begin(numbered_nodes(6), cmd(&["x"])).await.unwrap();

    assert_eq!(executor.addresses(), vec!["node1"]);
    assert_eq!(report.total(), 6);
    assert_eq!(report.count(NodeStatus::Failed), 1);
    assert_eq!(report.count(NodeStatus::Skipped), 5);
}

#[tokio::test]
async fn test_abort_on_nonzero_exit_when_strict() {
    let executor = Arc::new(RecordingExecutor::new().with_exit_code(2));
    let config = DispatchConfig {
        fail_on_nonzero_exit: true,
        ..DispatchConfig::new(1).with_failure_policy(FailurePolicy::Abort)
    };
    let (pool, _sink) = pool_with(config, executor.clone());

    let report = pool.begin(numbered_nodes(4), cmd(&["x"])).await.unwrap();

    assert_eq!(executor.calls().len(), 1);
    assert_eq!(report.count(NodeStatus::ExitedNonZero), 1);
    assert_eq!(report.count(NodeStatus::Skipped), 3);
    assert!(report.is_failure(true));
}

#[tokio::test]
async fn test_nonzero_exit_recorded_without_failing_run() {
    let executor = Arc::new(RecordingExecutor::new().with_exit_code(1));
    let (pool, _sink) = pool_with(DispatchConfig::new(2), executor);

    let report = pool.begin(numbered_nodes(3), cmd(&["x"])).await.unwrap();

    assert_eq!(report.count(NodeStatus::ExitedNonZero), 3);
    assert!(!report.is_failure(false));
}

#[tokio::test]
async fn test_cancelled_shutdown_dispatches_nothing() {
    let executor = Arc::new(RecordingExecutor::new());
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let pool = WorkerPool::new(DispatchConfig::new(2), executor.clone(), OutputSink::memory())
        .unwrap()
        .with_shutdown(shutdown);

    let report = pool.begin(numbered_nodes(5), cmd(&["x"])).await.unwrap();

    assert!(executor.calls().is_empty());
    assert_eq!(report.count(NodeStatus::Skipped), 5);
}

#[tokio::test]
async fn test_shutdown_mid_run_stops_dispatch() {
    let executor = Arc::new(RecordingExecutor::new().with_delay(Duration::from_millis(100)));
    let shutdown = CancellationToken::new();
    let pool = WorkerPool::new(DispatchConfig::new(1), executor.clone(), OutputSink::memory())
        .unwrap()
        .with_shutdown(shutdown.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        shutdown.cancel();
    });

    let report = pool.begin(numbered_nodes(20), cmd(&["x"])).await.unwrap();

    let dispatched = executor.calls().len();
    assert!(dispatched < 20, "dispatch should stop early, ran {}", dispatched);
    assert_eq!(report.total(), 20);
    assert_eq!(report.dispatched(), dispatched);
    assert_eq!(report.count(NodeStatus::Skipped), 20 - dispatched);
}

#[tokio::test]
async fn test_large_node_list_with_small_queue() {
    let executor = Arc::new(RecordingExecutor::new());
    let config = DispatchConfig {
        queue_factor: 1,
        ..DispatchConfig::new(2)
    };
    let (pool, _sink) = pool_with(config, executor.clone());

    let report = pool.begin(numbered_nodes(1000), cmd(&["x"])).await.unwrap();

    assert_eq!(executor.calls().len(), 1000);
    assert_eq!(report.count(NodeStatus::Completed), 1000);
}

#[tokio::test]
async fn test_output_lines_go_to_sink() {
    let executor = Arc::new(RecordingExecutor::new().with_lines(&["line1", "line2"]));
    let (pool, sink) = pool_with(DispatchConfig::new(2), executor);

    pool.begin(nodes(&["a", "b"]), cmd(&["x"])).await.unwrap();

    assert_eq!(sink.lines().unwrap().len(), 4);
    assert_eq!(sink.lines_for("a").unwrap(), vec!["line1", "line2"]);
    assert_eq!(sink.lines_for("b").unwrap(), vec!["line1", "line2"]);
}

#[test]
fn test_zero_workers_rejected() {
    let executor = Arc::new(RecordingExecutor::new());
    let result = WorkerPool::new(DispatchConfig::new(0), executor, OutputSink::memory());
    assert!(matches!(result, Err(GshError::Configuration(_))));
}

struct PanickingExecutor;

#[async_trait]
impl RemoteExecutor for PanickingExecutor {
    async fn exec(&self, node: &Node, _cmd: &[String], _sink: &OutputSink) -> Result<ExecOutcome> {
        panic!("executor blew up on {}", node.label());
    }
}

#[tokio::test]
async fn test_worker_panic_surfaces_as_internal_error() {
    let (pool, _sink) = pool_with(DispatchConfig::new(2), Arc::new(PanickingExecutor));

    let err = pool.begin(numbered_nodes(2), cmd(&["x"])).await.unwrap_err();

    assert!(matches!(err, GshError::Internal(_)), "got {:?}", err);
}
