use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cipher::SessionKey;
use crate::types::PeerIdentity;

/// All frames exchanged over a peer link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Frame {
    /// Link preamble: the dialer names itself before anything else flows.
    Hello(Hello),

    /// Session key handshake. Receiving this replaces the local key.
    KeyExchange(KeyExchange),

    /// Encrypted chat message.
    Message(MessageFrame),

    /// Whole-file resource transfer.
    Resource(ResourceFrame),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub identity: PeerIdentity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyExchange {
    pub key: SessionKey,
}

/// An encrypted chat message as it travels the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageFrame {
    pub id: Uuid,
    pub sender_name: String,
    /// base64(nonce || ciphertext) under the session key
    pub ciphertext: String,
    pub timestamp: DateTime<Utc>,
    /// Present when this message accompanies a resource transfer.
    pub resource: Option<ResourceDescriptor>,
}

/// Metadata naming a shared resource inside a transcript message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub id: Uuid,
    pub name: String,
    pub mime: String,
    pub size: u64,
}

/// A complete file payload. No chunking: transfers are whole-file only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceFrame {
    pub id: Uuid,
    pub name: String,
    pub mime: String,
    pub size: u64,
    pub payload: Bytes,
    pub sender_name: String,
}

impl ResourceFrame {
    pub fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor {
            id: self.id,
            name: self.name.clone(),
            mime: self.mime.clone(),
            size: self.size,
        }
    }
}

impl Frame {
    /// Short tag for log fields. Resource frames carry whole files, so this
    /// is what gets printed instead of the frame body.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Hello(_) => "hello",
            Frame::KeyExchange(_) => "key-exchange",
            Frame::Message(_) => "message",
            Frame::Resource(_) => "resource",
        }
    }

    /// Serialize to binary (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let frame = Frame::Message(MessageFrame {
            id: Uuid::new_v4(),
            sender_name: "Jane Smith".to_string(),
            ciphertext: "b64data==".to_string(),
            timestamp: Utc::now(),
            resource: None,
        });

        let bytes = frame.to_bytes().unwrap();
        let restored = Frame::from_bytes(&bytes).unwrap();

        if let (Frame::Message(orig), Frame::Message(rest)) = (&frame, &restored) {
            assert_eq!(orig.id, rest.id);
            assert_eq!(orig.ciphertext, rest.ciphertext);
            assert_eq!(orig.sender_name, rest.sender_name);
        } else {
            panic!("Frame kind mismatch");
        }
    }

    #[test]
    fn test_resource_descriptor_matches_frame() {
        let frame = ResourceFrame {
            id: Uuid::new_v4(),
            name: "notes.pdf".to_string(),
            mime: "application/pdf".to_string(),
            size: 2048,
            payload: Bytes::from(vec![0u8; 2048]),
            sender_name: "Bob Johnson".to_string(),
        };

        let desc = frame.descriptor();
        assert_eq!(desc.id, frame.id);
        assert_eq!(desc.name, "notes.pdf");
        assert_eq!(desc.size, 2048);
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(Frame::from_bytes(&[0xFF, 0xFE, 0xFD]).is_err());
    }
}
