//! Connection service: one task per inbound broker connection.
//!
//! A connection carries exactly one request. `Resolve` is answered and the
//! connection closed; `Register` is answered and the connection then held
//! open as the registration lease, released on EOF.

use std::net::SocketAddr;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use quadchat_net::wire;
use quadchat_net::NetError;
use quadchat_shared::rendezvous::{RendezvousRequest, RendezvousResponse};
use quadchat_shared::types::PeerIdentity;

use crate::config::BrokerConfig;
use crate::directory::Directory;
use crate::rate_limit::RequestLimiter;

/// Accept loop. Runs until the listener fails or the task is dropped.
pub async fn serve(
    listener: TcpListener,
    config: BrokerConfig,
    directory: Directory,
    limiter: RequestLimiter,
) {
    info!(instance = %config.instance_name, "Broker service started");

    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let config = config.clone();
                let directory = directory.clone();
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    if let Err(e) =
                        handle_connection(stream, peer_addr, config, directory, limiter).await
                    {
                        debug!(addr = %peer_addr, error = %e, "Broker connection ended with error");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "Broker accept failed");
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    config: BrokerConfig,
    directory: Directory,
    limiter: RequestLimiter,
) -> Result<(), NetError> {
    if !limiter.allow(peer_addr.ip()).await {
        warn!(ip = %peer_addr.ip(), "Rate limit exceeded, refusing request");
        wire::write_message(
            &mut stream,
            &RendezvousResponse::Rejected {
                reason: "rate limited".to_string(),
            },
        )
        .await?;
        return Ok(());
    }

    let request: RendezvousRequest = wire::read_message(&mut stream).await?;

    match request {
        RendezvousRequest::Resolve { identity } => {
            let reply = match directory.resolve(&identity).await {
                Some(addr) => RendezvousResponse::Resolved { identity, addr },
                None => {
                    debug!(identity = %identity, "Resolve miss");
                    RendezvousResponse::Unknown { identity }
                }
            };
            wire::write_message(&mut stream, &reply).await
        }

        RendezvousRequest::Register {
            identity,
            listen_addr,
        } => register_session(stream, identity, listen_addr, &config, &directory).await,
    }
}

async fn register_session(
    mut stream: TcpStream,
    identity: PeerIdentity,
    listen_addr: SocketAddr,
    config: &BrokerConfig,
    directory: &Directory,
) -> Result<(), NetError> {
    if !config.registration_open {
        wire::write_message(
            &mut stream,
            &RendezvousResponse::Rejected {
                reason: "registration closed".to_string(),
            },
        )
        .await?;
        return Ok(());
    }

    if config.max_sessions > 0 && directory.count().await >= config.max_sessions {
        wire::write_message(
            &mut stream,
            &RendezvousResponse::Rejected {
                reason: "session limit reached".to_string(),
            },
        )
        .await?;
        return Ok(());
    }

    if !directory.register(identity.clone(), listen_addr).await {
        wire::write_message(
            &mut stream,
            &RendezvousResponse::IdentityTaken { identity },
        )
        .await?;
        return Ok(());
    }

    let acked = wire::write_message(
        &mut stream,
        &RendezvousResponse::Registered {
            identity: identity.clone(),
        },
    )
    .await;

    if let Err(e) = acked {
        directory.unregister(&identity).await;
        return Err(e);
    }

    // The connection is now the lease. Endpoints send nothing further;
    // wait for EOF, then release the identity.
    let mut scratch = [0u8; 16];
    loop {
        match stream.read(&mut scratch).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }

    directory.unregister(&identity).await;
    info!(identity = %identity, "Registration released");
    Ok(())
}
