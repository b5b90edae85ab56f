use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio_util::sync::CancellationToken;

use crate::config::ExecutorConfig;
use crate::error::{GshError, Result};
use crate::node::Node;
use crate::output::OutputSink;
use crate::worker::report::ExecOutcome;

/// Runs a command against one node and streams its output to a sink.
///
/// Implementations must emit lines of a single node in the order they were
/// produced, and must not return before the node's output is fully emitted.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn exec(&self, node: &Node, cmd: &[String], sink: &OutputSink) -> Result<ExecOutcome>;
}

/// Executes `<program> <address> <cmd...>` as a local child process.
///
/// With the default program (`ssh`) this runs the command on the remote
/// host. Arguments are passed as discrete argv entries, never through a
/// shell. stdout and stderr are merged line by line as bytes arrive.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    config: ExecutorConfig,
    shutdown: CancellationToken,
}

impl CommandExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn ssh() -> Self {
        Self::new(ExecutorConfig::default())
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self::new(ExecutorConfig {
            program: program.into(),
            ..ExecutorConfig::default()
        })
    }

    /// Kill running children when `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn program(&self) -> &str {
        &self.config.program
    }

    /// Full argv for `node`: `[program, address, cmd...]`.
    pub fn invocation(&self, node: &Node, cmd: &[String]) -> Vec<String> {
        let mut argv = Vec::with_capacity(cmd.len() + 2);
        argv.push(self.config.program.clone());
        argv.push(node.address().to_string());
        argv.extend(cmd.iter().cloned());
        argv
    }

    fn spawn(&self, node: &Node, cmd: &[String]) -> Result<Child> {
        Command::new(&self.config.program)
            .arg(node.address())
            .args(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| GshError::Spawn {
                label: node.label().to_string(),
                program: self.config.program.clone(),
                source,
            })
    }

    /// Read both pipes until EOF, emitting each line as soon as it is seen.
    async fn drain(
        label: &str,
        stdout: ChildStdout,
        stderr: ChildStderr,
        sink: &OutputSink,
    ) -> Result<usize> {
        let mut out = BufReader::new(stdout).split(b'\n');
        let mut err = BufReader::new(stderr).split(b'\n');
        let mut out_open = true;
        let mut err_open = true;
        let mut lines = 0;

        while out_open || err_open {
            let (segment, from_stdout) = tokio::select! {
                segment = out.next_segment(), if out_open => (segment, true),
                segment = err.next_segment(), if err_open => (segment, false),
            };

            match segment.map_err(|e| stream_error(label, format!("read failed: {}", e)))? {
                Some(bytes) => {
                    sink.emit(label, &decode_line(&bytes))
                        .await
                        .map_err(|e| stream_error(label, format!("write failed: {}", e)))?;
                    lines += 1;
                }
                None if from_stdout => out_open = false,
                None => err_open = false,
            }
        }

        Ok(lines)
    }

    /// Drain both pipes, then wait for the child to exit.
    async fn run_to_exit(
        label: &str,
        child: &mut Child,
        stdout: ChildStdout,
        stderr: ChildStderr,
        sink: &OutputSink,
    ) -> Result<(usize, ExitStatus)> {
        let lines = Self::drain(label, stdout, stderr, sink).await?;
        let status = child
            .wait()
            .await
            .map_err(|e| stream_error(label, format!("wait failed: {}", e)))?;
        Ok((lines, status))
    }

    /// Kill the child if it is still running and wait for it, so it is
    /// never left behind as a zombie.
    async fn reap(label: &str, child: &mut Child) {
        if let Err(e) = child.start_kill() {
            tracing::debug!(label, error = %e, "Child already exited");
        }
        if let Err(e) = child.wait().await {
            tracing::warn!(label, error = %e, "Failed to reap child process");
        }
    }
}

#[async_trait]
impl RemoteExecutor for CommandExecutor {
    async fn exec(&self, node: &Node, cmd: &[String], sink: &OutputSink) -> Result<ExecOutcome> {
        tracing::debug!(
            label = %node.label(),
            address = %node.address(),
            program = %self.config.program,
            "Starting remote execution"
        );

        let mut child = self.spawn(node, cmd)?;
        let label = node.label();

        let pipes = child.stdout.take().zip(child.stderr.take());
        let Some((stdout, stderr)) = pipes else {
            Self::reap(label, &mut child).await;
            return Err(stream_error(label, "output pipes unavailable"));
        };

        // The deadline and shutdown cover the whole lifetime of the child,
        // including a child that closes its pipes and keeps running.
        let finished = tokio::select! {
            result = Self::run_to_exit(label, &mut child, stdout, stderr, sink) => result,
            _ = self.shutdown.cancelled() => Err(GshError::Interrupted {
                label: node.label().to_string(),
            }),
            timeout = deadline(self.config.timeout) => Err(GshError::Timeout {
                label: node.label().to_string(),
                timeout,
            }),
        };

        let (lines, status) = match finished {
            Ok(finished) => finished,
            Err(e) => {
                Self::reap(label, &mut child).await;
                return Err(e);
            }
        };

        tracing::info!(
            label = %node.label(),
            exit_code = ?status.code(),
            lines,
            "Remote execution finished"
        );

        Ok(ExecOutcome {
            exit_code: status.code(),
            lines,
        })
    }
}

/// Resolves after `timeout`, or never when there is none.
async fn deadline(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(timeout) => {
            tokio::time::sleep(timeout).await;
            timeout
        }
        None => std::future::pending().await,
    }
}

fn stream_error(label: &str, message: impl Into<String>) -> GshError {
    GshError::Stream {
        label: label.to_string(),
        message: message.into(),
    }
}

/// Lossy UTF-8 with a trailing carriage return removed.
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
