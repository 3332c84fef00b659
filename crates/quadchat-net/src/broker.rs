//! Client side of the rendezvous broker protocol.
//!
//! Registration holds a persistent control connection; the broker drops the
//! identity mapping the moment that connection closes, so holding the
//! returned [`BrokerLease`] IS the lease. Resolution is a one-shot query on
//! a fresh connection.

use std::net::SocketAddr;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use quadchat_shared::constants::CONNECT_TIMEOUT;
use quadchat_shared::rendezvous::{RendezvousRequest, RendezvousResponse};
use quadchat_shared::types::PeerIdentity;

use crate::error::NetError;
use crate::wire;

/// A live identity registration.
pub struct BrokerLease {
    stream: TcpStream,
}

impl BrokerLease {
    pub(crate) fn into_stream(self) -> TcpStream {
        self.stream
    }
}

/// Register `identity` with the broker, advertising `listen_addr` as the
/// address peers should dial.
pub async fn register(
    broker_addr: SocketAddr,
    identity: &PeerIdentity,
    listen_addr: SocketAddr,
) -> Result<BrokerLease, NetError> {
    let mut stream = connect_broker(broker_addr).await?;

    wire::write_message(
        &mut stream,
        &RendezvousRequest::Register {
            identity: identity.clone(),
            listen_addr,
        },
    )
    .await?;

    let reply: RendezvousResponse = timeout(CONNECT_TIMEOUT, wire::read_message(&mut stream))
        .await
        .map_err(|_| NetError::BrokerUnreachable("registration timed out".into()))??;

    match reply {
        RendezvousResponse::Registered { identity: id } => {
            info!(identity = %id, addr = %listen_addr, "Registered with broker");
            Ok(BrokerLease { stream })
        }
        RendezvousResponse::IdentityTaken { identity: id } => Err(NetError::IdentityTaken(id)),
        RendezvousResponse::Rejected { reason } => Err(NetError::RegistrationRejected(reason)),
        _ => Err(NetError::UnexpectedReply),
    }
}

/// One-shot lookup of the dialing address for `identity`.
pub async fn resolve(
    broker_addr: SocketAddr,
    identity: &PeerIdentity,
) -> Result<SocketAddr, NetError> {
    let mut stream = connect_broker(broker_addr).await?;

    wire::write_message(
        &mut stream,
        &RendezvousRequest::Resolve {
            identity: identity.clone(),
        },
    )
    .await?;

    let reply: RendezvousResponse = timeout(CONNECT_TIMEOUT, wire::read_message(&mut stream))
        .await
        .map_err(|_| NetError::BrokerUnreachable("resolve timed out".into()))??;

    match reply {
        RendezvousResponse::Resolved { identity: id, addr } => {
            debug!(identity = %id, addr = %addr, "Resolved peer address");
            Ok(addr)
        }
        RendezvousResponse::Unknown { identity: id } => Err(NetError::PeerUnreachable(id)),
        RendezvousResponse::Rejected { reason } => Err(NetError::RegistrationRejected(reason)),
        _ => Err(NetError::UnexpectedReply),
    }
}

async fn connect_broker(broker_addr: SocketAddr) -> Result<TcpStream, NetError> {
    timeout(CONNECT_TIMEOUT, TcpStream::connect(broker_addr))
        .await
        .map_err(|_| NetError::BrokerUnreachable(format!("connect to {broker_addr} timed out")))?
        .map_err(|e| NetError::BrokerUnreachable(e.to_string()))
}
