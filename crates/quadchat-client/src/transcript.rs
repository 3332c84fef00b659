//! Chat view model: the transcript and the shared-resource catalog.
//!
//! Pure state, no I/O. Messages are append-only and displayed in insertion
//! order; the timestamp field is informational. Clearing the transcript
//! leaves the resource catalog intact; resources live until the session
//! ends.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use quadchat_shared::protocol::ResourceDescriptor;

/// Which endpoint produced a message.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    Local,
    Remote,
}

/// One transcript entry. Immutable once created: entries are appended or
/// bulk-cleared, never edited.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender_name: String,
    /// Plaintext, present only after a successful local encrypt/decrypt.
    pub content: String,
    /// The form that actually travelled (or will travel) the wire.
    pub ciphertext: String,
    pub timestamp: DateTime<Utc>,
    pub origin: MessageOrigin,
    /// Present when this message announces a resource transfer.
    pub resource: Option<ResourceDescriptor>,
}

/// A fully received (or locally selected) file. Whole-file only; there is
/// no partial-transfer state.
#[derive(Debug, Clone, Serialize)]
pub struct SharedResource {
    pub id: Uuid,
    pub name: String,
    pub mime: String,
    pub size: u64,
    /// Raw bytes backing the downloadable handle. Not serialized into
    /// snapshots; the UI fetches payloads by id.
    #[serde(skip_serializing)]
    pub payload: Bytes,
    pub sender_name: String,
}

impl SharedResource {
    pub fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor {
            id: self.id,
            name: self.name.clone(),
            mime: self.mime.clone(),
            size: self.size,
        }
    }
}

/// Ordered, append-only message log. Insertion order is authoritative for
/// display.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Empty the log. Shared resources are owned by the catalog and are
    /// not touched here.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Shared resources keyed by id, iterated in insertion order for gallery
/// display.
#[derive(Debug, Default)]
pub struct ResourceCatalog {
    order: Vec<Uuid>,
    entries: HashMap<Uuid, SharedResource>,
}

impl ResourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource. Re-adding an id replaces the payload but keeps the
    /// original gallery position.
    pub fn insert(&mut self, resource: SharedResource) {
        if !self.entries.contains_key(&resource.id) {
            self.order.push(resource.id);
        }
        self.entries.insert(resource.id, resource);
    }

    pub fn get(&self, id: &Uuid) -> Option<&SharedResource> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedResource> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
