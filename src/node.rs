use std::fmt;

use crate::error::{GshError, Result};

/// One remote target.
///
/// `label` prefixes every output line for the node; `address` is handed to
/// the remote-execution program. Local sources use the same string for both.
///
/// Only constructed through [`Node::new`], so the address is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    label: String,
    address: String,
}

impl Node {
    /// Build a node, rejecting empty addresses and `#` comment markers.
    pub fn new(label: impl Into<String>, address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(GshError::Configuration(
                "Node address must not be empty".to_string(),
            ));
        }
        if address.starts_with('#') {
            return Err(GshError::Configuration(format!(
                "Node address looks like a comment: {}",
                address
            )));
        }
        let label = label.into();
        let label = if label.is_empty() {
            address.clone()
        } else {
            label
        };
        Ok(Self { label, address })
    }

    /// Node whose label is its address.
    pub fn from_address(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        Self::new(address.clone(), address)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.label == self.address {
            write!(f, "{}", self.label)
        } else {
            write!(f, "{} ({})", self.label, self.address)
        }
    }
}
