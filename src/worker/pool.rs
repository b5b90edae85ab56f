use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::{DispatchConfig, FailurePolicy};
use crate::error::{GshError, Result};
use crate::node::Node;
use crate::output::OutputSink;
use crate::worker::executor::RemoteExecutor;
use crate::worker::queue::{self, JobConsumer};
use crate::worker::report::{NodeReport, RunReport};

/// Fans nodes out to a fixed number of concurrent workers.
///
/// At most `workers` executions run at once. Each node is executed by
/// exactly one worker, and [`WorkerPool::begin`] only returns once every
/// worker has exited and all output has been emitted.
pub struct WorkerPool {
    config: DispatchConfig,
    executor: Arc<dyn RemoteExecutor>,
    sink: OutputSink,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// # Errors
    ///
    /// Returns [`GshError::Configuration`] if the worker count or queue
    /// factor is zero.
    pub fn new(
        config: DispatchConfig,
        executor: Arc<dyn RemoteExecutor>,
        sink: OutputSink,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            executor,
            sink,
            shutdown: CancellationToken::new(),
        })
    }

    /// Stop dispatching when `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn worker_count(&self) -> usize {
        self.config.workers
    }

    /// Run `cmd` against every node and wait for all of it to finish.
    ///
    /// Nodes are queued in input order, then the queue is closed. Workers
    /// keep pulling until it is closed and empty. A failing node never stops
    /// the others unless the pool runs with [`FailurePolicy::Abort`], in which
    /// case nodes not yet handed to a worker are reported as skipped.
    ///
    /// # Errors
    ///
    /// Only returns an error if a worker task itself panicked. Per-node
    /// failures are reported in the returned [`RunReport`].
    pub async fn begin(&self, nodes: Vec<Node>, cmd: Vec<String>) -> Result<RunReport> {
        let started = Instant::now();
        let total = nodes.len();
        let cmd: Arc<[String]> = cmd.into();
        let dispatch = self.shutdown.child_token();
        let (producer, consumer) = queue::bounded(self.config.queue_capacity());

        tracing::info!(
            nodes = total,
            workers = self.config.workers,
            queue_capacity = producer.capacity(),
            "Dispatching command"
        );

        let mut handles = Vec::with_capacity(self.config.workers);
        for worker_id in 0..self.config.workers {
            let worker = Worker {
                id: worker_id,
                queue: consumer.clone(),
                executor: self.executor.clone(),
                cmd: cmd.clone(),
                sink: self.sink.clone(),
                dispatch: dispatch.clone(),
                policy: self.config.failure_policy,
                fail_on_nonzero_exit: self.config.fail_on_nonzero_exit,
            };
            handles.push(tokio::spawn(worker.run()));
        }

        let mut skipped = Vec::new();
        let mut pending = nodes.into_iter();
        for node in pending.by_ref() {
            let rejected = tokio::select! {
                biased;
                _ = dispatch.cancelled() => Some(node),
                result = producer.push(node.clone()) => result.err(),
            };
            if let Some(node) = rejected {
                skipped.push(node);
                break;
            }
        }
        skipped.extend(pending);
        producer.close();

        let mut reports = Vec::with_capacity(total);
        let mut panicked = 0;
        for handle in handles {
            match handle.await {
                Ok(worker_reports) => reports.extend(worker_reports),
                Err(e) => {
                    tracing::error!(error = %e, "Worker task failed");
                    panicked += 1;
                }
            }
        }

        // Nodes still queued when dispatch was cancelled.
        skipped.extend(drain_queue(&consumer).await);
        if !skipped.is_empty() {
            tracing::warn!(count = skipped.len(), "Nodes skipped after cancellation");
        }
        reports.extend(skipped.into_iter().map(NodeReport::skipped));

        if panicked > 0 {
            return Err(GshError::Internal(format!(
                "{} of {} workers panicked",
                panicked, self.config.workers
            )));
        }

        let report = RunReport {
            nodes: reports,
            elapsed: started.elapsed(),
        };
        tracing::info!(summary = %report.summary(), elapsed = ?report.elapsed, "Dispatch finished");
        Ok(report)
    }
}

/// Pop whatever is left in a closed queue.
async fn drain_queue(queue: &JobConsumer) -> Vec<Node> {
    let mut left = Vec::new();
    while let Some(node) = queue.pop().await {
        left.push(node);
    }
    left
}

struct Worker {
    id: usize,
    queue: JobConsumer,
    executor: Arc<dyn RemoteExecutor>,
    cmd: Arc<[String]>,
    sink: OutputSink,
    dispatch: CancellationToken,
    policy: FailurePolicy,
    fail_on_nonzero_exit: bool,
}

impl Worker {
    async fn run(self) -> Vec<NodeReport> {
        // A worker only leaves the loop once the queue is drained or dispatch
        // is cancelled, so this fires early only when the task panics. That
        // unblocks a producer waiting on a full queue.
        let _unblock_producer = self.dispatch.clone().drop_guard();
        let mut reports = Vec::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.dispatch.cancelled() => None,
                node = self.queue.pop() => node,
            };
            let Some(node) = next else {
                break;
            };

            let started = Instant::now();
            let result = self.executor.exec(&node, &self.cmd, &self.sink).await;
            let report = match result {
                Ok(outcome) => {
                    if !outcome.success() {
                        tracing::warn!(
                            worker = self.id,
                            label = %node.label(),
                            exit_code = ?outcome.exit_code,
                            "Remote command exited non-zero"
                        );
                        if self.fail_on_nonzero_exit {
                            self.abort_if_configured();
                        }
                    }
                    NodeReport::from_outcome(node, outcome, started.elapsed())
                }
                Err(e) => {
                    tracing::error!(
                        worker = self.id,
                        label = %node.label(),
                        error = %e,
                        "Remote execution failed"
                    );
                    self.abort_if_configured();
                    NodeReport::failed(node, e.to_string(), started.elapsed())
                }
            };
            reports.push(report);
        }

        tracing::debug!(worker = self.id, processed = reports.len(), "Worker exiting");
        reports
    }

    fn abort_if_configured(&self) {
        if self.policy == FailurePolicy::Abort && !self.dispatch.is_cancelled() {
            tracing::warn!(worker = self.id, "Cancelling remaining nodes");
            self.dispatch.cancel();
        }
    }
}
