//! Secure session state: the active key and frame construction.
//!
//! Pure functions over the session key and display name; all I/O lives in
//! the engine. The key is replaced wholesale whenever a key-exchange frame
//! arrives (last received wins), matching the handshake the wire protocol
//! defines.

use chrono::Utc;
use uuid::Uuid;

use quadchat_shared::cipher::{self, SessionKey};
use quadchat_shared::constants::MAX_MESSAGE_SIZE;
use quadchat_shared::error::CryptoError;
use quadchat_shared::protocol::{Frame, KeyExchange, MessageFrame, ResourceFrame};

use crate::error::ChatError;
use crate::transcript::{ChatMessage, MessageOrigin, SharedResource};

/// The local side of the secure session protocol.
#[derive(Debug)]
pub struct SessionState {
    key: SessionKey,
    display_name: String,
}

impl SessionState {
    /// Start a session with a freshly generated key.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            key: SessionKey::generate(),
            display_name: display_name.into(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The frame that proposes our key to a newly opened link.
    pub fn key_offer(&self) -> Frame {
        Frame::KeyExchange(KeyExchange {
            key: self.key.clone(),
        })
    }

    /// Adopt a key received from a peer, replacing the current one.
    pub fn accept_key(&mut self, key: SessionKey) {
        self.key = key;
    }

    /// Encrypt outbound text and produce both the local transcript entry
    /// and the frame to broadcast.
    pub fn seal_text(&self, content: &str) -> Result<(ChatMessage, MessageFrame), ChatError> {
        if content.len() > MAX_MESSAGE_SIZE {
            return Err(ChatError::MessageTooLarge {
                size: content.len(),
            });
        }
        self.seal(content, None)
    }

    /// The companion message announcing a resource transfer, so it renders
    /// inline in the transcript next to the catalog entry.
    pub fn seal_resource_notice(
        &self,
        resource: &SharedResource,
    ) -> Result<(ChatMessage, MessageFrame), ChatError> {
        let notice = format!("Shared a file: {}", resource.name);
        self.seal(&notice, Some(resource))
    }

    fn seal(
        &self,
        content: &str,
        resource: Option<&SharedResource>,
    ) -> Result<(ChatMessage, MessageFrame), ChatError> {
        let ciphertext = cipher::encrypt(content, &self.key)?;
        let id = Uuid::new_v4();
        let timestamp = Utc::now();
        let descriptor = resource.map(|r| r.descriptor());

        let frame = MessageFrame {
            id,
            sender_name: self.display_name.clone(),
            ciphertext: ciphertext.clone(),
            timestamp,
            resource: descriptor.clone(),
        };
        let message = ChatMessage {
            id,
            sender_name: self.display_name.clone(),
            content: content.to_string(),
            ciphertext,
            timestamp,
            origin: MessageOrigin::Local,
            resource: descriptor,
        };
        Ok((message, frame))
    }

    /// Decrypt an inbound message frame into a transcript entry. A wrong
    /// key or tampered payload fails here; the caller surfaces it as an
    /// unreadable-payload error instead of appending anything.
    pub fn open_message(&self, frame: MessageFrame) -> Result<ChatMessage, CryptoError> {
        let content = cipher::decrypt(&frame.ciphertext, &self.key)?;
        Ok(ChatMessage {
            id: frame.id,
            sender_name: frame.sender_name,
            content,
            ciphertext: frame.ciphertext,
            timestamp: frame.timestamp,
            origin: MessageOrigin::Remote,
            resource: frame.resource,
        })
    }

    /// Materialize an inbound resource frame into a catalog entry.
    /// Payloads travel unencrypted inside the frame, so there is nothing
    /// to fail here.
    pub fn accept_resource(&self, frame: ResourceFrame) -> SharedResource {
        SharedResource {
            id: frame.id,
            name: frame.name,
            mime: frame.mime,
            size: frame.size,
            payload: frame.payload,
            sender_name: frame.sender_name,
        }
    }
}
