//! Node sources.
//!
//! Every source yields the same thing: an ordered `Vec<Node>` that the
//! worker pool consumes without caring where it came from.
//!
//! - [`local`]: comma-delimited lists and group files
//! - [`catalog`]: service-discovery catalog lookups over HTTP

pub mod catalog;
pub mod local;

use crate::config::{CatalogConfig, NodeSource};
use crate::error::Result;
use crate::node::Node;

pub use catalog::CatalogClient;

/// Resolve `source` into the ordered node list for one run.
pub async fn resolve(source: &NodeSource, catalog: &CatalogConfig) -> Result<Vec<Node>> {
    let nodes = match source {
        NodeSource::List(machines) => local::parse_list(machines)?,
        NodeSource::Group { dir, name } => local::load_group(dir, name).await?,
        NodeSource::CatalogService { service, filter } => {
            CatalogClient::new(catalog.clone())?
                .service_nodes(service, filter)
                .await?
        }
        NodeSource::CatalogNodes { filter } => {
            CatalogClient::new(catalog.clone())?.nodes(filter).await?
        }
    };

    tracing::debug!(count = nodes.len(), "Resolved nodes");
    Ok(nodes)
}
