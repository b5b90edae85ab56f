//! Parallel dispatch of one command across many nodes.
//!
//! # Components
//!
//! - [`WorkerPool`]: owns the job queue and a fixed set of workers
//! - [`queue`]: bounded FIFO between the node producer and the workers
//! - [`RemoteExecutor`]: runs the command for one node; [`CommandExecutor`]
//!   is the process-backed implementation (`ssh <address> <cmd...>`)
//! - [`report`]: per-node and aggregate outcomes
//!
//! # Execution Flow
//!
//! 1. [`WorkerPool::begin`] spawns `workers` tasks sharing one queue
//! 2. Nodes are pushed in input order; pushes wait while the queue is full
//! 3. The queue is closed once every node has been pushed
//! 4. Each worker pops a node, runs the executor and streams the output
//!    with the node label prefixed to each line
//! 5. Workers exit when the queue is closed and empty; `begin` joins them
//!    and returns a [`RunReport`]

pub mod executor;
pub mod pool;
pub mod queue;
pub mod report;

pub use executor::{CommandExecutor, RemoteExecutor};
pub use pool::WorkerPool;
pub use report::{ExecOutcome, NodeReport, NodeStatus, RunReport};
