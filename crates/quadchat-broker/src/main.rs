//! # quadchat-broker
//!
//! Self-hosted rendezvous broker for the quadchat network.
//!
//! This binary provides:
//! - **Identity registration** over a persistent control connection (the
//!   registration lives as long as the connection)
//! - **Identity resolution** so endpoints can dial each other directly
//! - **Per-IP rate limiting** to protect against abuse

use tracing::info;
use tracing_subscriber::EnvFilter;

use quadchat_broker::config::BrokerConfig;
use quadchat_broker::directory::Directory;
use quadchat_broker::rate_limit::RequestLimiter;
use quadchat_broker::service;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,quadchat_broker=debug")),
        )
        .init();

    info!("Starting quadchat broker v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = BrokerConfig::from_env();
    info!(
        instance = %config.instance_name,
        addr = %config.listen_addr,
        registration_open = config.registration_open,
        max_sessions = config.max_sessions,
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    let addr = listener.local_addr()?;

    let directory = Directory::new();
    let limiter = RequestLimiter::default();

    // Periodic rate limiter cleanup (every 5 minutes, evict buckets idle
    // >10 min)
    let rl = limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            rl.purge_stale(600.0).await;
        }
    });

    info!(addr = %addr, "Broker listening");

    // -----------------------------------------------------------------------
    // 4. Serve until shutdown
    // -----------------------------------------------------------------------
    tokio::select! {
        _ = service::serve(listener, config, directory, limiter) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
