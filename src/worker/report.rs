use std::time::Duration;

use crate::node::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Remote command ran and exited zero
    Completed,
    /// Remote command ran and exited non-zero (or was killed by a signal)
    ExitedNonZero,
    /// Could not be run to completion: spawn, stream, timeout or interruption
    Failed,
    /// Never dispatched because the run was cancelled first
    Skipped,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Completed => write!(f, "completed"),
            NodeStatus::ExitedNonZero => write!(f, "exited non-zero"),
            NodeStatus::Failed => write!(f, "failed"),
            NodeStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// What one executor call produced for a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// `None` when the child was terminated by a signal
    pub exit_code: Option<i32>,
    /// Lines emitted across both output streams
    pub lines: usize,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone)]
pub struct NodeReport {
    pub node: Node,
    pub status: NodeStatus,
    pub exit_code: Option<i32>,
    pub lines: usize,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl NodeReport {
    pub fn from_outcome(node: Node, outcome: ExecOutcome, elapsed: Duration) -> Self {
        let status = if outcome.success() {
            NodeStatus::Completed
        } else {
            NodeStatus::ExitedNonZero
        };
        Self {
            node,
            status,
            exit_code: outcome.exit_code,
            lines: outcome.lines,
            error: None,
            elapsed,
        }
    }

    pub fn failed(node: Node, error: String, elapsed: Duration) -> Self {
        Self {
            node,
            status: NodeStatus::Failed,
            exit_code: None,
            lines: 0,
            error: Some(error),
            elapsed,
        }
    }

    pub fn skipped(node: Node) -> Self {
        Self {
            node,
            status: NodeStatus::Skipped,
            exit_code: None,
            lines: 0,
            error: None,
            elapsed: Duration::ZERO,
        }
    }
}

/// Aggregate result of one [`WorkerPool::begin`](super::WorkerPool::begin).
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub nodes: Vec<NodeReport>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.nodes.len()
    }

    pub fn count(&self, status: NodeStatus) -> usize {
        self.nodes.iter().filter(|r| r.status == status).count()
    }

    /// Nodes that were actually handed to the executor.
    pub fn dispatched(&self) -> usize {
        self.total() - self.count(NodeStatus::Skipped)
    }

    pub fn failures(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(|r| r.status == NodeStatus::Failed)
    }

    pub fn report_for(&self, label: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|r| r.node.label() == label)
    }

    /// Whether the run should be reported as failed to the caller.
    pub fn is_failure(&self, fail_on_nonzero_exit: bool) -> bool {
        self.count(NodeStatus::Failed) > 0
            || self.count(NodeStatus::Skipped) > 0
            || (fail_on_nonzero_exit && self.count(NodeStatus::ExitedNonZero) > 0)
    }

    /// One-line human summary, e.g. `3 nodes: 2 completed, 1 failed`.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        for status in [
            NodeStatus::Completed,
            NodeStatus::ExitedNonZero,
            NodeStatus::Failed,
            NodeStatus::Skipped,
        ] {
            let n = self.count(status);
            if n > 0 {
                parts.push(format!("{} {}", n, status));
            }
        }
        if parts.is_empty() {
            format!("{} nodes", self.total())
        } else {
            format!("{} nodes: {}", self.total(), parts.join(", "))
        }
    }
}
