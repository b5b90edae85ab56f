//! Bounded job queue between the node producer and the workers.
//!
//! Backed by a bounded `tokio::sync::mpsc` channel. The single receiver is
//! shared behind a mutex, so every node is handed to exactly one worker.
//! Closing is tied to the producer: [`JobProducer::close`] consumes it, so
//! the queue closes once, and only after the producer is done.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::node::Node;

/// Create a queue holding at most `capacity` pending nodes.
pub fn bounded(capacity: usize) -> (JobProducer, JobConsumer) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (
        JobProducer { tx, capacity },
        JobConsumer {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

#[derive(Debug)]
pub struct JobProducer {
    tx: mpsc::Sender<Node>,
    capacity: usize,
}

impl JobProducer {
    /// Enqueue a node, waiting while the queue is full.
    ///
    /// Hands the node back if every consumer is gone.
    pub async fn push(&self, node: Node) -> Result<(), Node> {
        self.tx.send(node).await.map_err(|e| e.0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Signal that no more nodes will ever be enqueued. Nodes already queued
    /// are still delivered.
    pub fn close(self) {
        drop(self.tx);
    }
}

#[derive(Debug, Clone)]
pub struct JobConsumer {
    rx: Arc<Mutex<mpsc::Receiver<Node>>>,
}

impl JobConsumer {
    /// Next node in FIFO order. Waits while the queue is open and empty;
    /// returns `None` once it is closed and drained.
    ///
    /// Cancel safe: dropping the future never loses a node.
    pub async fn pop(&self) -> Option<Node> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}
