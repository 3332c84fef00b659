use thiserror::Error;

use quadchat_net::NetError;
use quadchat_shared::constants::{MAX_FILE_SIZE, MAX_MESSAGE_SIZE};
use quadchat_shared::error::{CryptoError, IdentityError};

#[derive(Error, Debug)]
pub enum ChatError {
    /// Guarded precondition, checked before any encryption happens.
    #[error("No peers connected")]
    NoPeersConnected,

    #[error("Message too large: {size} bytes (max {max})", max = MAX_MESSAGE_SIZE)]
    MessageTooLarge { size: usize },

    #[error("File too large: {size} bytes (max {max})", max = MAX_FILE_SIZE)]
    FileTooLarge { size: usize },

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Invalid identity: {0}")]
    Identity(#[from] IdentityError),

    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Chat engine is shut down")]
    EngineClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
