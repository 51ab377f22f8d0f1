mod app;
mod config;
mod logging;
mod render;

use anyhow::{Context, Result};
use app::{App, GraphKind, LogsOptions};
use ccd_core::ordering::SortKey;
use ccd_core::{GraphPeriod, LogLevel, StartOption, UpdateCodeChainRequest};
use ccd_session::{ChannelNotifier, HubApi, SessionManager};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use config::ConsoleConfig;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "ccd")]
#[command(about = "CodeChain agent hub console", long_about = None)]
struct Cli {
    /// Agent hub WebSocket URL (env: CCD_AGENT_HUB_URL)
    #[arg(long, global = true)]
    hub_url: Option<String>,
    /// Path segment appended to the hub URL (env: CCD_AGENT_HUB_PASSPHRASE)
    #[arg(long, global = true)]
    passphrase: Option<String>,
    /// Directory for ccd-console.log (env: CCD_LOG_DIR)
    #[arg(long, global = true)]
    log_dir: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the node table and connections
    Network {
        #[arg(long, default_value = "name")]
        sort_by: SortKey,
        #[arg(long)]
        desc: bool,
    },
    /// Inspect or control one node
    Node {
        #[command(subcommand)]
        action: NodeCommands,
    },
    /// Query node logs
    Logs(LogsArgs),
    /// List log targets
    Targets,
    /// Network traffic graphs
    Graph {
        #[command(subcommand)]
        kind: GraphCommands,
    },
    /// Send a raw JSON-RPC call to the hub
    Rpc {
        method: String,
        /// JSON params, `[]` when omitted
        params: Option<String>,
    },
    /// Print the network, then follow hub pushes until ctrl-c
    Watch {
        /// Also fetch and track the detail of these nodes
        #[arg(long = "node")]
        nodes: Vec<String>,
        #[arg(long, default_value = "name")]
        sort_by: SortKey,
        #[arg(long)]
        desc: bool,
    },
}

#[derive(Subcommand)]
enum NodeCommands {
    Info {
        name: String,
    },
    Start {
        name: String,
        #[arg(long, default_value = "")]
        env: String,
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        args: String,
    },
    Stop {
        name: String,
    },
    /// Update CodeChain from a git commit or a binary URL
    Update {
        name: String,
        #[arg(long, conflicts_with_all = ["binary_url", "checksum"])]
        commit: Option<String>,
        #[arg(long, requires = "checksum")]
        binary_url: Option<String>,
        #[arg(long, requires = "binary_url")]
        checksum: Option<String>,
    },
}

#[derive(Args)]
struct LogsArgs {
    /// Defaults to every node in the network
    #[arg(long = "node")]
    nodes: Vec<String>,
    /// Defaults to every level
    #[arg(long = "level")]
    levels: Vec<LogLevel>,
    /// Defaults to every target the hub knows
    #[arg(long = "target")]
    targets: Vec<String>,
    #[arg(long)]
    search: Option<String>,
    /// RFC 3339
    #[arg(long)]
    from: Option<DateTime<Utc>>,
    /// RFC 3339
    #[arg(long)]
    to: Option<DateTime<Utc>>,
    /// Oldest first
    #[arg(long)]
    asc: bool,
    /// Records per page
    #[arg(long)]
    limit: Option<u32>,
    /// Number of pages to load
    #[arg(long, default_value_t = 1)]
    pages: u32,
    /// Refresh every 3 seconds until ctrl-c. Always newest first, up to now.
    #[arg(long, conflicts_with_all = ["asc", "to"])]
    follow: bool,
}

#[derive(Args)]
struct GraphWindow {
    #[arg(long)]
    from: Option<DateTime<Utc>>,
    #[arg(long)]
    to: Option<DateTime<Utc>>,
    /// minutes5, hour or day
    #[arg(long)]
    period: Option<GraphPeriod>,
}

#[derive(Subcommand)]
enum GraphCommands {
    /// Network out per node
    All(GraphWindow),
    /// Network out per node, averaged
    Avg(GraphWindow),
    /// Network out of one node per extension
    Node {
        name: String,
        #[command(flatten)]
        window: GraphWindow,
    },
}

impl From<LogsArgs> for LogsOptions {
    fn from(args: LogsArgs) -> Self {
        Self {
            nodes: args.nodes,
            levels: args.levels,
            targets: args.targets,
            search: args.search,
            from: args.from,
            to: args.to,
            ascending: args.asc,
            limit: args.limit,
            pages: args.pages,
            follow: args.follow,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConsoleConfig::resolve(cli.hub_url, cli.passphrase, cli.log_dir);
    let _log_guard = logging::init_logging(&config.log_dir);
    info!(
        event = "console_start",
        hub_url = %config.session.hub_url,
        title = %config.title
    );

    let (notifier, notices) = ChannelNotifier::channel();
    let session = SessionManager::spawn(config.session.clone(), Arc::new(notifier))
        .context("failed to start the hub session")?;
    let mut app = App::new(HubApi::new(session), config, notices);

    let result = run(&mut app, cli.command).await;
    app.shutdown().await;
    result
}

async fn run(app: &mut App, command: Commands) -> Result<()> {
    match command {
        Commands::Network { sort_by, desc } => app.network(sort_by, desc).await,
        Commands::Node { action } => match action {
            NodeCommands::Info { name } => app.node_info(&name).await,
            NodeCommands::Start { name, env, args } => {
                app.node_start(&name, StartOption { env, args }).await
            }
            NodeCommands::Stop { name } => app.node_stop(&name).await,
            NodeCommands::Update {
                name,
                commit,
                binary_url,
                checksum,
            } => {
                let request = match (commit, binary_url, checksum) {
                    (Some(commit_hash), _, _) => UpdateCodeChainRequest::Git { commit_hash },
                    (None, Some(binary_url), Some(binary_checksum)) => {
                        UpdateCodeChainRequest::Binary {
                            binary_url,
                            binary_checksum,
                        }
                    }
                    _ => anyhow::bail!("either --commit or --binary-url with --checksum is required"),
                };
                app.node_update(&name, request).await
            }
        },
        Commands::Logs(args) => app.logs(args.into()).await,
        Commands::Targets => app.targets().await,
        Commands::Graph { kind } => {
            let (kind, window) = match kind {
                GraphCommands::All(window) => (GraphKind::All, window),
                GraphCommands::Avg(window) => (GraphKind::Average, window),
                GraphCommands::Node { name, window } => (GraphKind::Node(name), window),
            };
            app.graph(kind, window.from, window.to, window.period).await
        }
        Commands::Rpc { method, params } => app.rpc(&method, params.as_deref()).await,
        Commands::Watch {
            nodes,
            sort_by,
            desc,
        } => app.watch(&nodes, sort_by, desc).await,
    }
}
