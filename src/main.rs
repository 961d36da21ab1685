use clap::Parser;
use kaitu_ops::app::App;
use kaitu_ops::errors::ToolError;
use kaitu_ops::mcp::server::McpServer;
use std::path::PathBuf;
use std::sync::Arc;

/// MCP tool server for Kaitu fleet operations over stdio.
#[derive(Debug, Parser)]
#[command(name = "kaitu-ops", version)]
struct Args {
    /// Config file (default: $KAITU_OPS_CONFIG or ~/.kaitu-ops/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

async fn run(args: Args) -> Result<(), ToolError> {
    let app = App::initialize(args.config.as_deref())?;
    McpServer::new(Arc::new(app)).run_stdio().await
}

#[tokio::main]
async fn main() {
    if let Err(err) = run(Args::parse()).await {
        match &err.hint {
            Some(hint) => eprintln!("kaitu-ops: {}\n{}", err, hint),
            None => eprintln!("kaitu-ops: {}", err),
        }
        std::process::exit(1);
    }
}
