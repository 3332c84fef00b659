//! Peer link registry.
//!
//! Tracks every link keyed by remote identity. Entries move
//! pending -> open -> closed; closed is terminal and removes the entry.
//! Re-registering an identity replaces the previous entry (last writer
//! wins). Only the endpoint event loop task mutates the registry.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;

use quadchat_shared::protocol::Frame;
use quadchat_shared::types::{ConnectionStatus, PeerIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Pending,
    Open,
}

/// One tracked peer link.
#[derive(Debug)]
pub struct LinkEntry {
    /// Monotonically increasing id. Closure and frame events from a link
    /// that has since been replaced carry a stale id and are ignored.
    pub link_id: u64,
    pub state: LinkState,
    /// Handle to the link's writer task; present once the link is open.
    pub outbound: Option<mpsc::Sender<Frame>>,
}

/// All peer links, keyed by remote identity.
#[derive(Debug, Default)]
pub struct LinkRegistry {
    entries: HashMap<PeerIdentity, LinkEntry>,
    next_id: u64,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the id for a link about to be created.
    pub fn next_link_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Track an outbound dial. An existing open link to the same identity
    /// stays in place until the new dial actually completes; otherwise a
    /// pending entry is recorded under the returned id.
    pub fn begin_dial(&mut self, remote: &PeerIdentity) -> u64 {
        let link_id = self.next_link_id();
        match self.entries.get(remote) {
            Some(entry) if entry.state == LinkState::Open => {
                debug!(remote = %remote, link_id, "Dial will replace open link on completion");
            }
            _ => {
                self.entries.insert(
                    remote.clone(),
                    LinkEntry {
                        link_id,
                        state: LinkState::Pending,
                        outbound: None,
                    },
                );
                debug!(remote = %remote, link_id, "Tracking pending link");
            }
        }
        link_id
    }

    /// Record a link as open under `link_id`, replacing any previous entry
    /// for the identity.
    pub fn insert_open(
        &mut self,
        remote: PeerIdentity,
        link_id: u64,
        outbound: mpsc::Sender<Frame>,
    ) {
        debug!(remote = %remote, link_id, "Link open");
        self.entries.insert(
            remote,
            LinkEntry {
                link_id,
                state: LinkState::Open,
                outbound: Some(outbound),
            },
        );
    }

    /// The id of the entry currently registered for `remote`, if any.
    pub fn current_link_id(&self, remote: &PeerIdentity) -> Option<u64> {
        self.entries.get(remote).map(|e| e.link_id)
    }

    /// Whether an event from `link_id` is stale, i.e. a newer link has
    /// taken over the identity.
    pub fn is_stale(&self, remote: &PeerIdentity, link_id: u64) -> bool {
        matches!(self.entries.get(remote), Some(e) if e.link_id > link_id)
    }

    /// Remove the entry for `remote` if it still belongs to `link_id`.
    /// Returns true when an entry was actually removed, so a second closure
    /// of the same link reports nothing.
    pub fn remove(&mut self, remote: &PeerIdentity, link_id: u64) -> bool {
        match self.entries.get(remote) {
            Some(entry) if entry.link_id == link_id => {
                self.entries.remove(remote);
                debug!(remote = %remote, link_id, "Link removed");
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, remote: &PeerIdentity) -> Option<&LinkEntry> {
        self.entries.get(remote)
    }

    pub fn is_open(&self, remote: &PeerIdentity) -> bool {
        matches!(self.entries.get(remote), Some(e) if e.state == LinkState::Open)
    }

    /// Snapshot the outbound handles of every open link, for fan-out.
    pub fn open_links(&self) -> Vec<(PeerIdentity, mpsc::Sender<Frame>)> {
        self.entries
            .iter()
            .filter_map(|(id, entry)| match (&entry.state, &entry.outbound) {
                (LinkState::Open, Some(tx)) => Some((id.clone(), tx.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.state == LinkState::Open)
            .count()
    }

    /// Aggregate status: connected iff at least one link is open.
    pub fn status(&self) -> ConnectionStatus {
        if self.open_count() > 0 {
            ConnectionStatus::Connected
        } else if !self.entries.is_empty() {
            ConnectionStatus::Connecting
        } else {
            ConnectionStatus::Disconnected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> PeerIdentity {
        PeerIdentity::parse(name).unwrap()
    }

    fn frame_tx() -> mpsc::Sender<Frame> {
        mpsc::channel(1).0
    }

    #[test]
    fn test_dial_open_close_lifecycle() {
        let mut registry = LinkRegistry::new();
        let peer = identity("peer-111111");

        assert_eq!(registry.status(), ConnectionStatus::Disconnected);

        let link_id = registry.begin_dial(&peer);
        assert!(!registry.is_open(&peer));
        assert_eq!(registry.open_count(), 0);
        assert_eq!(registry.status(), ConnectionStatus::Connecting);

        registry.insert_open(peer.clone(), link_id, frame_tx());
        assert!(registry.is_open(&peer));
        assert_eq!(registry.open_count(), 1);
        assert_eq!(registry.status(), ConnectionStatus::Connected);

        assert!(registry.remove(&peer, link_id));
        assert!(!registry.is_open(&peer));
        assert_eq!(registry.open_count(), 0);
        assert_eq!(registry.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = LinkRegistry::new();
        let peer = identity("peer-222222");

        let link_id = registry.begin_dial(&peer);
        registry.insert_open(peer.clone(), link_id, frame_tx());

        assert!(registry.remove(&peer, link_id));
        assert!(!registry.remove(&peer, link_id));
    }

    #[test]
    fn test_reconnect_replaces_entry_last_writer_wins() {
        let mut registry = LinkRegistry::new();
        let peer = identity("peer-333333");

        let first = registry.next_link_id();
        registry.insert_open(peer.clone(), first, frame_tx());

        let second = registry.next_link_id();
        registry.insert_open(peer.clone(), second, frame_tx());

        assert_eq!(registry.open_count(), 1);
        assert_eq!(registry.current_link_id(&peer), Some(second));

        // The replaced link's closure must not evict its successor.
        assert!(registry.is_stale(&peer, first));
        assert!(!registry.remove(&peer, first));
        assert!(registry.is_open(&peer));

        assert!(registry.remove(&peer, second));
        assert_eq!(registry.open_count(), 0);
    }

    #[test]
    fn test_dial_leaves_existing_open_link_untouched() {
        let mut registry = LinkRegistry::new();
        let peer = identity("peer-444444");

        let first = registry.next_link_id();
        registry.insert_open(peer.clone(), first, frame_tx());

        let redial = registry.begin_dial(&peer);
        assert!(registry.is_open(&peer));
        assert_eq!(registry.current_link_id(&peer), Some(first));
        assert!(redial > first);
    }

    #[test]
    fn test_open_count_tracks_event_sequences() {
        let mut registry = LinkRegistry::new();
        let peers: Vec<_> = (0..4)
            .map(|i| identity(&format!("peer-{i:06}")))
            .collect();

        let ids: Vec<_> = peers
            .iter()
            .map(|p| {
                let id = registry.begin_dial(p);
                registry.insert_open(p.clone(), id, frame_tx());
                id
            })
            .collect();
        assert_eq!(registry.open_count(), 4);
        assert_eq!(registry.status(), ConnectionStatus::Connected);

        registry.remove(&peers[1], ids[1]);
        registry.remove(&peers[3], ids[3]);
        assert_eq!(registry.open_count(), 2);
        assert_eq!(registry.status(), ConnectionStatus::Connected);

        registry.remove(&peers[0], ids[0]);
        registry.remove(&peers[2], ids[2]);
        assert_eq!(registry.open_count(), 0);
        assert_eq!(registry.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_open_links_snapshot_excludes_pending() {
        let mut registry = LinkRegistry::new();
        let open_peer = identity("peer-555555");
        let pending_peer = identity("peer-666666");

        let id = registry.begin_dial(&open_peer);
        registry.insert_open(open_peer.clone(), id, frame_tx());
        registry.begin_dial(&pending_peer);

        let links = registry.open_links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].0, open_peer);
    }
}
