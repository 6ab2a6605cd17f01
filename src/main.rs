//! Sea Battle Server
//!
//! Binds the configured address and serves matches until Ctrl-C.

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use seabattle::{GameServer, ServerConfig, PROTOCOL_VERSION, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let config = ServerConfig::from_env();
    info!("Sea Battle Server v{} (protocol {})", VERSION, PROTOCOL_VERSION);
    info!("Security error ceiling: {}", config.max_security_errors);

    let server = std::sync::Arc::new(GameServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            signal_server.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
