use std::path::PathBuf;
use std::time::Duration;

use crate::error::{GshError, Result};

const DEFAULT_PROGRAM: &str = "ssh";
const DEFAULT_QUEUE_FACTOR: usize = 2;
const DEFAULT_CATALOG_ADDR: &str = "127.0.0.1:8500";
const DEFAULT_CATALOG_TIMEOUT: Duration = Duration::from_secs(10);

/// How one remote execution is launched.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Program invoked as `<program> <address> <cmd...>`
    pub program: String,
    /// Kill the child if it runs longer than this. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            timeout: None,
        }
    }
}

/// What the pool does after a node fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Record the failure and keep dispatching the remaining nodes.
    #[default]
    Isolate,
    /// Stop dispatching queued nodes; in-flight nodes still finish.
    Abort,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Number of concurrent workers, and so the bound on running children.
    pub workers: usize,
    /// Job queue capacity is `workers * queue_factor`.
    pub queue_factor: usize,
    pub failure_policy: FailurePolicy,
    /// Count a non-zero remote exit status as a node failure.
    pub fail_on_nonzero_exit: bool,
    pub executor: ExecutorConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_factor: DEFAULT_QUEUE_FACTOR,
            failure_policy: FailurePolicy::default(),
            fail_on_nonzero_exit: false,
            executor: ExecutorConfig::default(),
        }
    }
}

impl DispatchConfig {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.executor.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.executor.timeout = Some(timeout);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn queue_capacity(&self) -> usize {
        self.workers.saturating_mul(self.queue_factor)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(GshError::Configuration(
                "Worker count must be at least 1".to_string(),
            ));
        }
        if self.queue_factor == 0 {
            return Err(GshError::Configuration(
                "Queue factor must be at least 1".to_string(),
            ));
        }
        if self.executor.program.trim().is_empty() {
            return Err(GshError::Configuration(
                "Remote execution program must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Connection settings for the service-discovery catalog.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// host:port or full URL of the catalog HTTP API
    pub address: String,
    /// Sent as `X-Consul-Token` when set
    pub token: Option<String>,
    pub datacenter: Option<String>,
    /// Upper bound on each catalog request, connect through body
    pub timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_CATALOG_ADDR.to_string(),
            token: None,
            datacenter: None,
            timeout: DEFAULT_CATALOG_TIMEOUT,
        }
    }
}

impl CatalogConfig {
    /// Base URL with a scheme, without a trailing slash.
    pub fn base_url(&self) -> String {
        let addr = self.address.trim().trim_end_matches('/');
        if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{}", addr)
        }
    }
}

/// Where the node list comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSource {
    /// Comma-delimited addresses
    List(String),
    /// Newline-delimited group file `<dir>/<name>`
    Group { dir: PathBuf, name: String },
    /// Nodes providing `service`, narrowed by a catalog filter expression
    CatalogService { service: String, filter: String },
    /// All registered nodes, narrowed by a catalog filter expression
    CatalogNodes { filter: String },
}

impl NodeSource {
    /// Pick a local source: an explicit machine list wins over a group.
    pub fn local(machines: &str, group: &str, dir: impl Into<PathBuf>) -> Result<Self> {
        if !machines.is_empty() {
            return Ok(NodeSource::List(machines.to_string()));
        }
        if group.is_empty() {
            return Err(GshError::Configuration(
                "Group or Machine list is required".to_string(),
            ));
        }
        Ok(NodeSource::Group {
            dir: dir.into(),
            name: group.to_string(),
        })
    }

    pub fn catalog(kind: CatalogKind, service: &str, filter: &str) -> Result<Self> {
        match kind {
            CatalogKind::Service => {
                if service.is_empty() {
                    return Err(GshError::Configuration(
                        "A catalog service name is required for service lookups".to_string(),
                    ));
                }
                Ok(NodeSource::CatalogService {
                    service: service.to_string(),
                    filter: filter.to_string(),
                })
            }
            CatalogKind::Nodes => Ok(NodeSource::CatalogNodes {
                filter: filter.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Service,
    Nodes,
}

/// `$HOME/.gsh/groups`, or a relative `.gsh/groups` when HOME is unset.
pub fn default_group_dir() -> PathBuf {
    let base = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default();
    base.join(".gsh").join("groups")
}
