//! Wire protocol for the rendezvous broker.
//!
//! Endpoints register their identity and listening address over a persistent
//! control connection; the registration lives exactly as long as that
//! connection. Resolution is a one-shot query on a fresh connection.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::types::PeerIdentity;

/// Requests an endpoint sends to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RendezvousRequest {
    /// Claim an identity and advertise the address peers should dial.
    Register {
        identity: PeerIdentity,
        listen_addr: SocketAddr,
    },

    /// Look up the dialing address registered for an identity.
    Resolve { identity: PeerIdentity },
}

/// Broker replies, one per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RendezvousResponse {
    Registered { identity: PeerIdentity },
    IdentityTaken { identity: PeerIdentity },
    Rejected { reason: String },
    Resolved { identity: PeerIdentity, addr: SocketAddr },
    Unknown { identity: PeerIdentity },
}
