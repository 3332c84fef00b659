//! Per-link transport tasks.
//!
//! Each peer link owns a reader task and a writer task. Both report back to
//! the endpoint event loop through the link-event channel, which is the
//! only path that mutates registry state. Tasks that outlive the endpoint
//! find the channel closed and fall through without side effects.

use std::net::SocketAddr;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use quadchat_shared::constants::CONNECT_TIMEOUT;
use quadchat_shared::protocol::{Frame, Hello};
use quadchat_shared::types::PeerIdentity;

use crate::broker;
use crate::error::NetError;
use crate::wire;

/// Capacity of each link's outbound frame queue.
const OUTBOUND_QUEUE: usize = 64;

/// Internal events flowing from transport tasks into the endpoint loop.
#[derive(Debug)]
pub(crate) enum LinkEvent {
    /// An outbound dial completed; the stream already carries our Hello.
    DialOk {
        remote: PeerIdentity,
        link_id: u64,
        stream: TcpStream,
    },
    /// An outbound dial failed.
    DialFailed {
        remote: PeerIdentity,
        link_id: u64,
        error: NetError,
    },
    /// An inbound connection completed its Hello preamble.
    Accepted {
        remote: PeerIdentity,
        stream: TcpStream,
    },
    /// A link's reader produced a frame.
    Frame {
        remote: PeerIdentity,
        link_id: u64,
        frame: Frame,
    },
    /// A link's reader hit EOF or an error; the link is gone.
    Closed { remote: PeerIdentity, link_id: u64 },
}

/// Dial `remote`: resolve through the broker, connect with a timeout, send
/// the Hello preamble. Runs detached; the outcome is delivered on
/// `event_tx`.
pub(crate) fn spawn_dial(
    broker_addr: SocketAddr,
    local: PeerIdentity,
    remote: PeerIdentity,
    link_id: u64,
    event_tx: mpsc::Sender<LinkEvent>,
) {
    tokio::spawn(async move {
        match dial(broker_addr, &local, &remote).await {
            Ok(stream) => {
                let _ = event_tx
                    .send(LinkEvent::DialOk {
                        remote,
                        link_id,
                        stream,
                    })
                    .await;
            }
            Err(error) => {
                let _ = event_tx
                    .send(LinkEvent::DialFailed {
                        remote,
                        link_id,
                        error,
                    })
                    .await;
            }
        }
    });
}

async fn dial(
    broker_addr: SocketAddr,
    local: &PeerIdentity,
    remote: &PeerIdentity,
) -> Result<TcpStream, NetError> {
    let addr = broker::resolve(broker_addr, remote).await?;

    let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| NetError::DialTimeout(remote.clone()))?
        .map_err(|_| NetError::PeerUnreachable(remote.clone()))?;

    wire::write_message(
        &mut stream,
        &Frame::Hello(Hello {
            identity: local.clone(),
        }),
    )
    .await?;

    debug!(remote = %remote, addr = %addr, "Dial complete");
    Ok(stream)
}

/// Consume an accepted connection: read the Hello preamble within a bounded
/// wait and hand the identified stream to the endpoint loop.
pub(crate) fn spawn_accept(
    stream: TcpStream,
    peer_addr: SocketAddr,
    event_tx: mpsc::Sender<LinkEvent>,
) {
    tokio::spawn(async move {
        let mut stream = stream;
        let first = match timeout(CONNECT_TIMEOUT, wire::read_message::<_, Frame>(&mut stream)).await
        {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                warn!(addr = %peer_addr, error = %e, "Inbound connection failed before Hello");
                return;
            }
            Err(_) => {
                warn!(addr = %peer_addr, "Inbound connection sent no Hello in time");
                return;
            }
        };

        match first {
            Frame::Hello(hello) => {
                let _ = event_tx
                    .send(LinkEvent::Accepted {
                        remote: hello.identity,
                        stream,
                    })
                    .await;
            }
            other => {
                warn!(
                    addr = %peer_addr,
                    kind = other.kind(),
                    "Expected Hello preamble, dropping connection"
                );
            }
        }
    });
}

/// Start the reader and writer tasks for an open link. Returns the outbound
/// frame queue handle the registry stores; dropping it closes the write
/// half, which the remote observes as EOF.
pub(crate) fn spawn_link_tasks(
    stream: TcpStream,
    remote: PeerIdentity,
    link_id: u64,
    event_tx: mpsc::Sender<LinkEvent>,
) -> mpsc::Sender<Frame> {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(OUTBOUND_QUEUE);
    let (read_half, write_half) = stream.into_split();

    let writer_remote = remote.clone();
    tokio::spawn(async move {
        let mut write_half = write_half;
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = wire::write_message(&mut write_half, &frame).await {
                warn!(remote = %writer_remote, error = %e, "Link write failed");
                break;
            }
        }
        debug!(remote = %writer_remote, link_id, "Link writer finished");
    });

    tokio::spawn(async move {
        let mut read_half = read_half;
        loop {
            match wire::read_message::<_, Frame>(&mut read_half).await {
                Ok(frame) => {
                    let event = LinkEvent::Frame {
                        remote: remote.clone(),
                        link_id,
                        frame,
                    };
                    if event_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(remote = %remote, link_id, error = %e, "Link reader finished");
                    let _ = event_tx.send(LinkEvent::Closed { remote, link_id }).await;
                    break;
                }
            }
        }
    });

    outbound_tx
}
