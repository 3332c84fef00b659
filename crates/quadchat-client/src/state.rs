//! Mutable session state shared between the engine's command methods and
//! its notification bridge.
//!
//! Wrapped in `Arc<tokio::sync::Mutex<_>>` by the engine; the bridge loop
//! mutates it on receipt and the command methods mutate it on send, which
//! serializes every view-model write behind one lock.

use std::collections::HashSet;

use quadchat_shared::types::{ConnectionStatus, PeerIdentity};

use crate::events::ErrorNotice;
use crate::session::SessionState;
use crate::transcript::{ResourceCatalog, Transcript};

pub struct ChatState {
    /// Identity this endpoint registered with the broker.
    pub identity: PeerIdentity,

    /// The active session key and display name.
    pub session: SessionState,

    /// Remote identities with an open link right now.
    pub peers: HashSet<PeerIdentity>,

    /// True while a dial is in flight and nothing is open yet; keeps the
    /// aggregate status on "connecting" instead of "disconnected".
    pub dialing: bool,

    /// Ordered message log.
    pub transcript: Transcript,

    /// Shared-resource catalog. Outlives transcript clears.
    pub resources: ResourceCatalog,

    /// Most recent recoverable failure, for the UI status line.
    pub last_error: Option<ErrorNotice>,
}

impl ChatState {
    pub fn new(identity: PeerIdentity, display_name: impl Into<String>) -> Self {
        Self {
            identity,
            session: SessionState::new(display_name),
            peers: HashSet::new(),
            dialing: false,
            transcript: Transcript::new(),
            resources: ResourceCatalog::new(),
            last_error: None,
        }
    }

    /// Aggregate status: connected iff at least one link is open.
    pub fn status(&self) -> ConnectionStatus {
        if !self.peers.is_empty() {
            ConnectionStatus::Connected
        } else if self.dialing {
            ConnectionStatus::Connecting
        } else {
            ConnectionStatus::Disconnected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ChatState {
        ChatState::new(PeerIdentity::generate("campus"), "Jane Smith")
    }

    #[test]
    fn test_status_follows_peer_set() {
        let mut s = state();
        assert_eq!(s.status(), ConnectionStatus::Disconnected);

        s.dialing = true;
        assert_eq!(s.status(), ConnectionStatus::Connecting);

        let peer = PeerIdentity::generate("campus");
        s.peers.insert(peer.clone());
        s.dialing = false;
        assert_eq!(s.status(), ConnectionStatus::Connected);

        s.peers.remove(&peer);
        assert_eq!(s.status(), ConnectionStatus::Disconnected);
    }
}
