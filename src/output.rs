use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

/// One line of remote output, tagged with the node it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub label: String,
    pub text: String,
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.text)
    }
}

/// Aggregate destination for every node's output.
///
/// Cheap to clone; all clones share one destination. Each line is written
/// whole under a lock, so concurrent nodes interleave by line, never inside
/// one.
#[derive(Clone)]
pub enum OutputSink {
    Stdout(Arc<Mutex<Stdout>>),
    Memory(Arc<StdMutex<Vec<OutputLine>>>),
}

impl OutputSink {
    pub fn stdout() -> Self {
        OutputSink::Stdout(Arc::new(Mutex::new(tokio::io::stdout())))
    }

    /// Sink that keeps every line in memory, see [`OutputSink::lines`].
    pub fn memory() -> Self {
        OutputSink::Memory(Arc::new(StdMutex::new(Vec::new())))
    }

    pub async fn emit(&self, label: &str, text: &str) -> std::io::Result<()> {
        match self {
            OutputSink::Stdout(stdout) => {
                let rendered = format!("{}: {}\n", label, text);
                let mut stdout = stdout.lock().await;
                stdout.write_all(rendered.as_bytes()).await?;
                stdout.flush().await
            }
            OutputSink::Memory(lines) => {
                let mut lines = lines
                    .lock()
                    .map_err(|_| std::io::Error::other("output buffer poisoned"))?;
                lines.push(OutputLine {
                    label: label.to_string(),
                    text: text.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Snapshot of captured lines. Always empty for stdout sinks.
    pub fn lines(&self) -> std::io::Result<Vec<OutputLine>> {
        match self {
            OutputSink::Stdout(_) => Ok(Vec::new()),
            OutputSink::Memory(lines) => lines
                .lock()
                .map(|lines| lines.clone())
                .map_err(|_| std::io::Error::other("output buffer poisoned")),
        }
    }

    /// Captured lines that belong to `label`, in emission order.
    pub fn lines_for(&self, label: &str) -> std::io::Result<Vec<String>> {
        Ok(self
            .lines()?
            .into_iter()
            .filter(|line| line.label == label)
            .map(|line| line.text)
            .collect())
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSink::Stdout(_) => f.write_str("OutputSink::Stdout"),
            OutputSink::Memory(lines) => {
                let len = lines.lock().map(|l| l.len()).unwrap_or(0);
                write!(f, "OutputSink::Memory({} lines)", len)
            }
        }
    }
}
