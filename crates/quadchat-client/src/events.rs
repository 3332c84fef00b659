//! Events the chat engine emits to its UI shell.
//!
//! Subscribers receive these over a broadcast channel; payloads are
//! serializable so a shell can forward them to a webview unchanged.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use quadchat_shared::protocol::ResourceDescriptor;
use quadchat_shared::types::{ConnectionStatus, PeerIdentity};

use crate::transcript::ChatMessage;

/// Everything the UI shell can observe about a running session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ChatEvent {
    /// Aggregate connection status changed.
    StatusChanged { status: ConnectionStatus },

    /// A peer link opened.
    PeerConnected { remote: PeerIdentity },

    /// A peer link closed; other links are unaffected.
    PeerDisconnected { remote: PeerIdentity },

    /// The session key was replaced by a peer's key-exchange frame.
    SessionKeyAccepted { from: PeerIdentity },

    /// A message entered the transcript (local send or remote receipt).
    MessageAppended { message: ChatMessage },

    /// A resource entered the catalog; fetch the payload by id.
    ResourceAdded {
        resource: ResourceDescriptor,
        sender_name: String,
    },

    /// The transcript was cleared. Resources are unaffected.
    TranscriptCleared,

    /// The broker control connection dropped. Existing links keep
    /// working, but this endpoint can no longer be dialed.
    BrokerLost,

    /// A recoverable failure the shell should surface as a toast.
    Error { notice: ErrorNotice },
}

/// Distinguishes the toast the shell should show.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Outbound encryption or framing failed; nothing was sent.
    SendFailed,
    /// An inbound frame could not be handled.
    ReceiveFailed,
    /// An inbound message did not decrypt under the current session key.
    UnreadablePayload,
    /// A dial to a remote identity failed; the user may retry.
    DialFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorNotice {
    pub kind: ErrorKind,
    pub detail: String,
    /// The message id involved, when one exists.
    pub message_id: Option<Uuid>,
}

impl ErrorNotice {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            message_id: None,
        }
    }

    pub fn with_message_id(mut self, id: Uuid) -> Self {
        self.message_id = Some(id);
        self
    }
}

/// Fire an event at every subscriber. Lagging or absent subscribers are
/// not an error; the engine never blocks on its audience.
pub(crate) fn emit(events: &broadcast::Sender<ChatEvent>, event: ChatEvent) {
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = ChatEvent::StatusChanged {
            status: ConnectionStatus::Connected,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "status-changed");
        assert_eq!(json["status"], "connected");
    }

    #[test]
    fn test_error_notice_carries_kind() {
        let event = ChatEvent::Error {
            notice: ErrorNotice::new(ErrorKind::UnreadablePayload, "wrong key"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["notice"]["kind"], "unreadable-payload");
        assert_eq!(json["notice"]["detail"], "wrong key");
    }
}
