use std::time::Duration;

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Default session key length in characters
pub const SESSION_KEY_LEN: usize = 32;

/// Maximum plaintext message size in bytes (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 262_144;

/// Maximum file transfer size in bytes (50 MiB)
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Upper bound for any single wire frame: the largest resource payload plus
/// framing and metadata slack
pub const MAX_FRAME_SIZE: usize = MAX_FILE_SIZE + 64 * 1024;

/// Default rendezvous broker TCP port
pub const DEFAULT_BROKER_PORT: u16 = 4460;

/// Timeout for dialing a peer or querying the broker
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Number of random digits appended to an identity prefix
pub const IDENTITY_SUFFIX_LEN: usize = 6;

/// Maximum identity length in characters
pub const MAX_IDENTITY_LEN: usize = 64;

/// Key derivation context (BLAKE3)
pub const KDF_CONTEXT_SESSION_KEY: &str = "quadchat-session-key-v1";
