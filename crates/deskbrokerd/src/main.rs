//! deskbrokerd: the session broker daemon.
//!
//! Single binary that assembles the broker:
//! - Node registry (from `DESKTOP_SERVERS` or a TOML file)
//! - Assignment store (redb)
//! - Health monitor
//! - Scheduler + TTL sweeper
//! - HTTP gateway
//!
//! # Usage
//!
//! ```text
//! deskbrokerd serve --port 3001 --desktop-servers desktop-1:177,desktop-2:177
//! deskbrokerd check-config --config /etc/deskbroker/broker.toml
//! ```

mod serve;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use deskbroker_core::{BrokerConfig, DEFAULT_CAPACITY, DEFAULT_HEALTH_PORT, NodeRegistry};

#[derive(Parser)]
#[command(name = "deskbrokerd", about = "Desktop session broker")]
struct Cli {
    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the broker.
    Serve(ServeArgs),

    /// Validate the node configuration and print the registry.
    CheckConfig(NodeArgs),
}

/// Where the node list comes from.
#[derive(Args, Debug, Clone)]
struct NodeArgs {
    /// Comma-separated `host:port[:capacity]` list.
    #[arg(long, env = "DESKTOP_SERVERS", default_value = "desktop-1:177,desktop-2:177")]
    desktop_servers: String,

    /// Capacity for servers that do not set their own.
    #[arg(long, env = "SERVER_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
    server_capacity: u32,

    /// Port of each server's health endpoint.
    #[arg(long, env = "DESKTOP_HEALTH_PORT", default_value_t = DEFAULT_HEALTH_PORT)]
    health_port: u16,

    /// Optional TOML file; its node list replaces `--desktop-servers`.
    #[arg(long, env = "BROKER_CONFIG")]
    config: Option<PathBuf>,
}

impl NodeArgs {
    fn file_config(&self) -> anyhow::Result<BrokerConfig> {
        match &self.config {
            Some(path) => Ok(BrokerConfig::from_file(path)?),
            None => Ok(BrokerConfig::default()),
        }
    }

    /// Resolve the registry and the effective health port.
    fn resolve(&self) -> anyhow::Result<(NodeRegistry, u16)> {
        let file = self.file_config()?;
        let registry = file.build_registry(&self.desktop_servers, self.server_capacity)?;
        let health_port = file.health_port.unwrap_or(self.health_port);
        Ok((registry, health_port))
    }
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    /// Port to listen on.
    #[arg(long, env = "BROKER_PORT", default_value = "3001")]
    port: u16,

    /// Assignment store file.
    #[arg(long, env = "BROKER_STORE_PATH", default_value = "/var/lib/deskbroker/assignments.redb")]
    store_path: PathBuf,

    /// Health check interval in seconds.
    #[arg(long, env = "HEALTH_INTERVAL_SECS", default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
    health_interval: u64,

    /// Per-probe timeout in seconds.
    #[arg(long, env = "PROBE_TIMEOUT_SECS", default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
    probe_timeout: u64,

    /// Expired-assignment sweep interval in seconds.
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    sweep_interval: u64,

    #[command(flatten)]
    nodes: NodeArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve(args) => serve::run(args).await,
        Command::CheckConfig(args) => check_config(&args),
    }
}

/// `RUST_LOG`, then `LOG_LEVEL`, then a sensible default.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("LOG_LEVEL"))
        .unwrap_or_else(|_| EnvFilter::new("info,deskbroker=debug"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn check_config(args: &NodeArgs) -> anyhow::Result<()> {
    let (registry, health_port) = args.resolve()?;

    println!("{} desktop server(s), health port {health_port}", registry.len());
    for node in registry.nodes() {
        println!("  {}:{}  capacity {}", node.host, node.port, node.capacity);
    }
    Ok(())
}
