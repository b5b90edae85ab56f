use std::path::Path;

use crate::error::{GshError, Result};
use crate::node::Node;

/// Parse a comma-delimited address list. Order is preserved and each entry
/// becomes a node whose label is its address.
pub fn parse_list(machines: &str) -> Result<Vec<Node>> {
    machines
        .split(',')
        .map(|entry| {
            Node::from_address(entry.trim()).map_err(|_| {
                GshError::Configuration(format!("Invalid entry in machine list: {:?}", machines))
            })
        })
        .collect()
}

/// Parse group file contents: one address per line, surrounding whitespace
/// trimmed, blank lines and `#` comments skipped.
pub fn parse_group(contents: &str) -> Vec<Node> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| Node::from_address(line).ok())
        .collect()
}

/// Read and parse the group file `<dir>/<name>`.
pub async fn load_group(dir: &Path, name: &str) -> Result<Vec<Node>> {
    let path = dir.join(name);
    let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
        GshError::Configuration(format!(
            "Node Group file not found: {} ({})",
            path.display(),
            e
        ))
    })?;

    let nodes = parse_group(&contents);
    tracing::debug!(path = %path.display(), count = nodes.len(), "Loaded node group");
    Ok(nodes)
}
