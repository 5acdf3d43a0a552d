use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transmission_mcp_runtime::{DaemonArgs, McpCommands, run};

#[derive(Parser)]
#[command(
    name = "transmission-mcp",
    version,
    about = "MCP server for the Transmission torrent daemon, over stdio"
)]
struct Cli {
    #[command(flatten)]
    daemon: DaemonArgs,

    /// Defaults to `serve`
    #[command(subcommand)]
    command: Option<McpCommands>,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "transmission_mcp=info,transmission_mcp_runtime=info,transmission_rpc=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let code = run(&cli.daemon, cli.command.unwrap_or(McpCommands::Serve)).await;
    std::process::exit(code);
}
