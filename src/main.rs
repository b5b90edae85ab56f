use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use gsh::config::{
    default_group_dir, CatalogConfig, CatalogKind, DispatchConfig, ExecutorConfig, FailurePolicy,
    NodeSource,
};
use gsh::error::{GshError, Result};
use gsh::output::OutputSink;
use gsh::shutdown::install_shutdown_handler;
use gsh::source;
use gsh::worker::{CommandExecutor, RunReport, WorkerPool};

const COMPLETION_MESSAGE: &str = "All Nodes Have Completed Task";

#[derive(Parser, Debug)]
#[command(name = "gsh")]
#[command(version)]
#[command(about = "Run a command on many hosts in parallel")]
struct Args {
    /// Where to find nodes
    #[arg(long, value_enum, default_value = "local")]
    conftype: ConfType,

    /// Directory holding group files (default: ~/.gsh/groups)
    #[arg(long)]
    configpath: Option<PathBuf>,

    /// The group of nodes to run commands against
    #[arg(short = 'g', long, default_value = "")]
    group: String,

    /// Comma delimited list of nodes to run commands against
    #[arg(short = 'm', long, default_value = "")]
    machines: String,

    /// Number of nodes to process concurrently
    #[arg(short = 'f', long = "fanout", default_value = "1")]
    workers: usize,

    /// Queue capacity as a multiple of the worker count
    #[arg(long, default_value = "2")]
    queue_factor: usize,

    /// Program used to reach each node, invoked as `<program> <address> <cmd...>`
    #[arg(long, default_value = "ssh")]
    program: String,

    /// Kill a node's command after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Stop dispatching remaining nodes after the first failure
    #[arg(long)]
    fail_fast: bool,

    /// Treat a non-zero remote exit status as a failure
    #[arg(long)]
    strict_exit: bool,

    // === Catalog Options ===
    /// Look up nodes via a service or list all nodes
    #[arg(long, value_enum, default_value = "service")]
    consultype: ConsulType,

    /// Filter expression passed to the catalog API
    #[arg(long, default_value = "")]
    consulfilter: String,

    /// Service to look up when --consultype=service
    #[arg(long, default_value = "")]
    consulservice: String,

    /// Catalog HTTP address
    #[arg(long, env = "CONSUL_HTTP_ADDR", default_value = "127.0.0.1:8500")]
    consul_addr: String,

    /// Catalog ACL token
    #[arg(long, env = "CONSUL_HTTP_TOKEN", hide_env_values = true)]
    consul_token: Option<String>,

    /// Catalog datacenter
    #[arg(long)]
    consul_dc: Option<String>,

    /// Give up on a catalog request after this many seconds
    #[arg(long, default_value = "10")]
    consul_timeout: u64,

    /// Command to run on every node
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    command: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConfType {
    Local,
    Consul,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConsulType {
    Service,
    Nodes,
}

impl Args {
    fn node_source(&self) -> Result<NodeSource> {
        match self.conftype {
            ConfType::Local => {
                let dir = self.configpath.clone().unwrap_or_else(default_group_dir);
                NodeSource::local(&self.machines, &self.group, dir)
            }
            ConfType::Consul => {
                let kind = match self.consultype {
                    ConsulType::Service => CatalogKind::Service,
                    ConsulType::Nodes => CatalogKind::Nodes,
                };
                NodeSource::catalog(kind, &self.consulservice, &self.consulfilter)
            }
        }
    }

    fn catalog_config(&self) -> CatalogConfig {
        CatalogConfig {
            address: self.consul_addr.clone(),
            token: self.consul_token.clone(),
            datacenter: self.consul_dc.clone(),
            timeout: Duration::from_secs(self.consul_timeout),
        }
    }

    fn dispatch_config(&self) -> DispatchConfig {
        let failure_policy = if self.fail_fast {
            FailurePolicy::Abort
        } else {
            FailurePolicy::Isolate
        };
        DispatchConfig {
            workers: self.workers,
            queue_factor: self.queue_factor,
            failure_policy,
            fail_on_nonzero_exit: self.strict_exit,
            executor: ExecutorConfig {
                program: self.program.clone(),
                timeout: self.timeout.map(Duration::from_secs),
            },
        }
    }
}

fn report_failures(report: &RunReport) {
    eprintln!("{}", report.summary());
    for failure in report.failures() {
        eprintln!(
            "  {}: {}",
            failure.node.label(),
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
}

/// Returns whether the run succeeded.
async fn run(args: Args) -> Result<bool> {
    let dispatch = args.dispatch_config();
    dispatch.validate()?;

    let node_source = args.node_source()?;
    let nodes = source::resolve(&node_source, &args.catalog_config()).await?;
    if nodes.is_empty() {
        tracing::warn!(source = ?node_source, "No nodes found");
    }

    let shutdown = install_shutdown_handler()
        .map_err(|e| GshError::Internal(format!("Failed to install signal handlers: {}", e)))?;

    let executor = CommandExecutor::new(dispatch.executor.clone()).with_shutdown(shutdown.clone());
    let pool = WorkerPool::new(dispatch.clone(), Arc::new(executor), OutputSink::stdout())?
        .with_shutdown(shutdown);

    let report = pool.begin(nodes, args.command).await?;
    println!("{}", COMPLETION_MESSAGE);

    let failed = report.is_failure(dispatch.fail_on_nonzero_exit);
    if failed {
        report_failures(&report);
    }
    Ok(!failed)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
