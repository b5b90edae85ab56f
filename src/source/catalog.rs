//! Service-discovery catalog lookups.
//!
//! Talks to a Consul-compatible HTTP catalog:
//! - `GET /v1/catalog/service/<service>`: nodes providing a service
//! - `GET /v1/catalog/nodes`: every registered node
//!
//! Both accept a server-side `filter` expression, which is passed through
//! untouched. Results keep the order the catalog returned them in.

use reqwest::Url;
use serde::Deserialize;

use crate::config::CatalogConfig;
use crate::error::{GshError, Result};
use crate::node::Node;

const TOKEN_HEADER: &str = "X-Consul-Token";

/// One catalog row. Service and node listings share these two fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogEntry {
    node: String,
    address: String,
}

pub struct CatalogClient {
    config: CatalogConfig,
    client: reqwest::Client,
}

impl CatalogClient {
    /// # Errors
    ///
    /// Returns [`GshError::CatalogRequest`] if the HTTP client cannot be built.
    pub fn new(config: CatalogConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    /// Nodes registered for `service`, labelled by catalog node name.
    pub async fn service_nodes(&self, service: &str, filter: &str) -> Result<Vec<Node>> {
        let url = self.endpoint(&["v1", "catalog", "service", service])?;
        self.fetch(url, filter).await
    }

    /// Every registered node, labelled by catalog node name.
    pub async fn nodes(&self, filter: &str) -> Result<Vec<Node>> {
        let url = self.endpoint(&["v1", "catalog", "nodes"])?;
        self.fetch(url, filter).await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let base = self.config.base_url();
        let mut url = Url::parse(&base)
            .map_err(|e| GshError::Catalog(format!("Invalid catalog address {}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| GshError::Catalog(format!("Catalog address cannot be a base: {}", base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch(&self, mut url: Url, filter: &str) -> Result<Vec<Node>> {
        {
            let mut query = url.query_pairs_mut();
            if !filter.is_empty() {
                query.append_pair("filter", filter);
            }
            if let Some(dc) = &self.config.datacenter {
                query.append_pair("dc", dc);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        tracing::debug!(url = %url, "Querying catalog");

        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.config.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GshError::Catalog(format!(
                "{} returned {}: {}",
                url.path(),
                status,
                body.trim()
            )));
        }

        let entries: Vec<CatalogEntry> = response.json().await?;
        entries
            .into_iter()
            .map(|entry| {
                Node::new(entry.node.clone(), entry.address).map_err(|_| {
                    GshError::Catalog(format!("Catalog node {} has no address", entry.node))
                })
            })
            .collect()
    }
}
