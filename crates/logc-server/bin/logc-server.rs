use anyhow::Context;
use logc_server::{Server, ServerConfig};
use tracing_subscriber::EnvFilter;

/// Usage: `logc-server [config.toml]`
///
/// Exits 0 on a clean interrupt-driven shutdown, 1 on any initialization
/// failure (socket, listen, config).
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            ServerConfig::load(&path).with_context(|| format!("loading config '{path}'"))?
        }
        None => ServerConfig::default(),
    };

    let server = Server::bind(config).context("initializing log server")?;
    server.run().await;
    Ok(())
}
