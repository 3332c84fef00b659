//! Endpoint orchestration with the command/notification channel pattern.
//!
//! The event loop runs in a dedicated tokio task and is the sole owner of
//! the listener, the broker lease, and the link registry. External code
//! talks to it through typed command and notification channels, keeping the
//! transport layer fully asynchronous and decoupled.

use std::net::SocketAddr;

use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use quadchat_shared::protocol::Frame;
use quadchat_shared::types::{LinkDirection, PeerIdentity};

use crate::broker;
use crate::error::NetError;
use crate::link::{self, LinkEvent};
use crate::registry::LinkRegistry;

/// Commands sent *into* the endpoint task.
#[derive(Debug)]
pub enum EndpointCommand {
    /// Dial a remote identity.
    Dial(PeerIdentity),
    /// Send one frame to one open link.
    SendTo { remote: PeerIdentity, frame: Frame },
    /// Send one frame to every open link (best effort, never atomic).
    Broadcast(Frame),
    /// Close the link to one remote.
    CloseLink(PeerIdentity),
    /// Snapshot the identities with open links.
    OpenLinks(oneshot::Sender<Vec<PeerIdentity>>),
    /// Tear down every link and release the identity.
    Shutdown,
}

/// Notifications sent *from* the endpoint task to the application.
#[derive(Debug, Clone)]
pub enum EndpointNotification {
    /// A link is open and ready for frames.
    LinkOpened {
        remote: PeerIdentity,
        direction: LinkDirection,
    },
    /// A link closed: either side hung up, or the transport failed.
    LinkClosed { remote: PeerIdentity },
    /// A frame arrived on the current link for `remote`.
    FrameReceived { remote: PeerIdentity, frame: Frame },
    /// An outbound dial failed; recoverable, the caller may retry.
    DialFailed { remote: PeerIdentity, reason: String },
    /// The broker control connection dropped. Existing links keep working,
    /// but this endpoint can no longer be dialed.
    BrokerLost,
}

/// Configuration for spawning an endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Rendezvous broker address.
    pub broker_addr: SocketAddr,
    /// Identity to claim with the broker.
    pub identity: PeerIdentity,
    /// Local listen address; port 0 picks an ephemeral port.
    pub listen_addr: SocketAddr,
}

/// Bind, register with the broker, and spawn the endpoint event loop.
///
/// Identity acquisition is fatal on failure: without a broker lease there is
/// no session to run, so the error is returned here instead of becoming a
/// notification.
///
/// # Returns
///
/// `(command_tx, notification_rx)`
pub async fn spawn_endpoint(
    config: EndpointConfig,
) -> Result<
    (
        mpsc::Sender<EndpointCommand>,
        mpsc::Receiver<EndpointNotification>,
    ),
    NetError,
> {
    let listener = TcpListener::bind(config.listen_addr).await?;
    let local_addr = listener.local_addr()?;

    let lease = broker::register(config.broker_addr, &config.identity, local_addr).await?;

    info!(identity = %config.identity, addr = %local_addr, "Endpoint registered and listening");

    let (cmd_tx, cmd_rx) = mpsc::channel::<EndpointCommand>(256);
    let (notif_tx, notif_rx) = mpsc::channel::<EndpointNotification>(256);

    tokio::spawn(run_event_loop(config, listener, lease, cmd_rx, notif_tx));

    Ok((cmd_tx, notif_rx))
}

async fn run_event_loop(
    config: EndpointConfig,
    listener: TcpListener,
    lease: broker::BrokerLease,
    mut cmd_rx: mpsc::Receiver<EndpointCommand>,
    notif_tx: mpsc::Sender<EndpointNotification>,
) {
    let mut registry = LinkRegistry::new();
    let (link_tx, mut link_rx) = mpsc::channel::<LinkEvent>(256);

    // The lease carries no traffic after registration; a read completing
    // means the broker hung up.
    let mut lease_stream = lease.into_stream();
    let mut lease_buf = [0u8; 8];
    let mut broker_alive = true;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(EndpointCommand::Dial(remote)) => {
                        let link_id = registry.begin_dial(&remote);
                        link::spawn_dial(
                            config.broker_addr,
                            config.identity.clone(),
                            remote,
                            link_id,
                            link_tx.clone(),
                        );
                    }

                    Some(EndpointCommand::SendTo { remote, frame }) => {
                        let outbound = registry.get(&remote).and_then(|e| e.outbound.clone());
                        match outbound {
                            Some(tx) => {
                                if tx.send(frame).await.is_err() {
                                    warn!(remote = %remote, "Dropping frame for dead link");
                                }
                            }
                            None => {
                                debug!(remote = %remote, "SendTo ignored: link not open");
                            }
                        }
                    }

                    Some(EndpointCommand::Broadcast(frame)) => {
                        for (remote, tx) in registry.open_links() {
                            // One dead link must not abort delivery to the rest.
                            if tx.send(frame.clone()).await.is_err() {
                                warn!(remote = %remote, kind = frame.kind(), "Broadcast skipped dead link");
                            }
                        }
                    }

                    Some(EndpointCommand::CloseLink(remote)) => {
                        if let Some(link_id) = registry.current_link_id(&remote) {
                            if registry.remove(&remote, link_id) {
                                // Dropping the outbound handle closes the
                                // write half; the peer observes EOF.
                                info!(remote = %remote, "Link closed locally");
                                let _ = notif_tx
                                    .send(EndpointNotification::LinkClosed { remote })
                                    .await;
                            }
                        }
                    }

                    Some(EndpointCommand::OpenLinks(reply)) => {
                        let peers = registry
                            .open_links()
                            .into_iter()
                            .map(|(id, _)| id)
                            .collect();
                        let _ = reply.send(peers);
                    }

                    Some(EndpointCommand::Shutdown) => {
                        info!(identity = %config.identity, "Endpoint shutdown requested");
                        break;
                    }

                    None => {
                        info!("Command channel closed, shutting down endpoint");
                        break;
                    }
                }
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!(addr = %peer_addr, "Inbound connection");
                        link::spawn_accept(stream, peer_addr, link_tx.clone());
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                }
            }

            event = link_rx.recv() => {
                if let Some(event) = event {
                    handle_link_event(event, &mut registry, &link_tx, &notif_tx).await;
                }
            }

            read = lease_stream.read(&mut lease_buf), if broker_alive => {
                match read {
                    Ok(0) | Err(_) => {
                        warn!(identity = %config.identity, "Broker control connection lost");
                        broker_alive = false;
                        let _ = notif_tx.send(EndpointNotification::BrokerLost).await;
                    }
                    Ok(_) => {
                        // The broker sends nothing meaningful after
                        // registration; ignore stray bytes.
                    }
                }
            }
        }
    }

    // Dropping the registry closes every outbound queue: writer tasks
    // finish, peers observe EOF, and reader tasks find the event channel
    // closed. Late dial resolutions are dropped the same way.
    info!(identity = %config.identity, "Endpoint event loop terminated");
}

async fn handle_link_event(
    event: LinkEvent,
    registry: &mut LinkRegistry,
    link_tx: &mpsc::Sender<LinkEvent>,
    notif_tx: &mpsc::Sender<EndpointNotification>,
) {
    match event {
        LinkEvent::DialOk {
            remote,
            link_id,
            stream,
        } => {
            if registry.is_stale(&remote, link_id) {
                debug!(remote = %remote, link_id, "Dial superseded, dropping stream");
                return;
            }
            let outbound = link::spawn_link_tasks(stream, remote.clone(), link_id, link_tx.clone());
            registry.insert_open(remote.clone(), link_id, outbound);
            let _ = notif_tx
                .send(EndpointNotification::LinkOpened {
                    remote,
                    direction: LinkDirection::Outbound,
                })
                .await;
        }

        LinkEvent::DialFailed {
            remote,
            link_id,
            error,
        } => {
            warn!(remote = %remote, error = %error, "Dial failed");
            registry.remove(&remote, link_id);
            let _ = notif_tx
                .send(EndpointNotification::DialFailed {
                    remote,
                    reason: error.to_string(),
                })
                .await;
        }

        LinkEvent::Accepted { remote, stream } => {
            // Last writer wins: a reconnect from the same identity replaces
            // the previous link.
            let link_id = registry.next_link_id();
            let outbound = link::spawn_link_tasks(stream, remote.clone(), link_id, link_tx.clone());
            registry.insert_open(remote.clone(), link_id, outbound);
            let _ = notif_tx
                .send(EndpointNotification::LinkOpened {
                    remote,
                    direction: LinkDirection::Inbound,
                })
                .await;
        }

        LinkEvent::Frame {
            remote,
            link_id,
            frame,
        } => {
            if registry.current_link_id(&remote) == Some(link_id) {
                let _ = notif_tx
                    .send(EndpointNotification::FrameReceived { remote, frame })
                    .await;
            } else {
                debug!(remote = %remote, link_id, kind = frame.kind(), "Dropping frame from stale link");
            }
        }

        LinkEvent::Closed { remote, link_id } => {
            if registry.remove(&remote, link_id) {
                info!(remote = %remote, "Link closed");
                let _ = notif_tx
                    .send(EndpointNotification::LinkClosed { remote })
                    .await;
            }
        }
    }
}
