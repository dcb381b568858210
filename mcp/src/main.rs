use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use devrev_mcp_runtime::{McpCommands, run as run_mcp};

#[derive(Parser)]
#[command(
    name = "devrev-mcp",
    version,
    about = "DevRev MCP server: DevRev work items, parts and meetings as MCP tools over stdio"
)]
struct Cli {
    /// DevRev API base URL
    #[arg(long, env = "DEVREV_API_URL", default_value = "https://api.devrev.ai")]
    api_url: String,

    #[command(subcommand)]
    command: McpCommands,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // stdout carries the protocol, so logs go to stderr.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "devrev_mcp=info,devrev_mcp_runtime=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let code = run_mcp(&cli.api_url, cli.command).await;
    std::process::exit(code);
}
