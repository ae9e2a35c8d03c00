/// MCP Server Entry Point
///
/// Loads the configuration from the environment (see `core::config`), builds
/// the tool registry and starts the selected transports. Logs go to stderr so
/// stdout stays reserved for protocol frames.

use mcp_stream_server::core::config::{ServerConfig, TransportMode};
use mcp_stream_server::core::{logging, server};
use mcp_stream_server::tools;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = ServerConfig::from_env()?;
    let dispatcher = server::build_dispatcher(&config, tools::builtin_tools())?;

    match config.transport {
        TransportMode::Stdio => {
            server::run_server_stdio(config, dispatcher).await?;
        }
        TransportMode::Http => {
            server::run_server_http(config, dispatcher).await?;
        }
        TransportMode::Both => {
            // STDIO in the background, HTTP in the foreground
            let stdio_config = config.clone();
            let stdio_dispatcher = dispatcher.clone();
            let stdio_handle = tokio::spawn(async move {
                if let Err(e) = server::run_server_stdio(stdio_config, stdio_dispatcher).await {
                    error!(error = %e, "STDIO server failed");
                }
            });

            let http_result = server::run_server_http(config, dispatcher).await;

            // If HTTP server exits, abort STDIO task
            stdio_handle.abort();
            http_result?;
        }
    }

    info!("server stopped");
    Ok(())
}
