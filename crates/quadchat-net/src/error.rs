use thiserror::Error;

use quadchat_shared::types::PeerIdentity;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("Broker unreachable: {0}")]
    BrokerUnreachable(String),

    #[error("Identity already registered: {0}")]
    IdentityTaken(PeerIdentity),

    #[error("Registration rejected by broker: {0}")]
    RegistrationRejected(String),

    #[error("Peer unreachable: {0}")]
    PeerUnreachable(PeerIdentity),

    #[error("Dial timed out: {0}")]
    DialTimeout(PeerIdentity),

    #[error("Unexpected broker reply")]
    UnexpectedReply,

    #[error("Wire frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
