//! Self-hosted rendezvous broker for quadchat endpoints.
//!
//! Maps identity strings to the socket addresses endpoints listen on. A
//! registration lives exactly as long as the control connection that
//! carried it; resolution is a one-shot query on a fresh connection. Any
//! service speaking the same rendezvous protocol is substitutable.

pub mod config;
pub mod directory;
pub mod rate_limit;
pub mod service;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::BrokerConfig;
use crate::directory::Directory;
use crate::rate_limit::RequestLimiter;

/// Bind and run a broker in a background task. Returns the bound address,
/// which matters when the config asked for an ephemeral port.
pub async fn spawn_broker(config: BrokerConfig) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(config.listen_addr).await?;
    let addr = listener.local_addr()?;

    let directory = Directory::new();
    let limiter = RequestLimiter::default();
    let handle = tokio::spawn(service::serve(listener, config, directory, limiter));

    Ok((addr, handle))
}
