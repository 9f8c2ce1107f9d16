mod apis;
mod arm;
mod backends;
mod config;
mod contract;
mod error;
mod grpc;
mod operations;
mod products;
mod resources;
mod retry;
mod server;
mod subscriptions;
mod versioning;

use rmcp::transport::stdio;
use rmcp::ServiceExt;
use server::ApimMcpServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Write structured logs to stderr so stdout stays clean for MCP JSON-RPC.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_env("RUST_LOG")
                .add_directive("apim_mcp_server=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting apim-mcp-server v{}", env!("CARGO_PKG_VERSION"));

    let config = config::Config::from_env()?;
    tracing::info!(
        subscription_id = %config.subscription_id,
        resource_group = %config.resource_group,
        service_name = %config.service_name,
        "Targeting API Management service"
    );

    let server = ApimMcpServer::new(&config)?;

    let transport = stdio();

    tracing::info!("MCP server listening on stdio");

    let running = server.serve(transport).await?;

    tokio::select! {
        result = running.waiting() => {
            result?;
            tracing::info!("MCP transport closed, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, shutting down");
        }
    }

    Ok(())
}
