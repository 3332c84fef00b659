//! Broker configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the broker can start with zero
//! configuration for local development.

use std::net::SocketAddr;

use quadchat_shared::constants::DEFAULT_BROKER_PORT;

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Socket address to listen on.
    /// Env: `BROKER_ADDR`
    /// Default: `0.0.0.0:4460`
    pub listen_addr: SocketAddr,

    /// Human-readable name for this broker instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Quadchat Broker"`
    pub instance_name: String,

    /// Whether new identities may register.
    /// Self-hosted admins can close registration during maintenance.
    /// Env: `REGISTRATION_OPEN` (true/false)
    /// Default: `true`
    pub registration_open: bool,

    /// Maximum number of concurrently registered identities (0 = unlimited).
    /// Env: `MAX_SESSIONS`
    /// Default: `0`
    pub max_sessions: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([0, 0, 0, 0], DEFAULT_BROKER_PORT).into(),
            instance_name: "Quadchat Broker".to_string(),
            registration_open: true,
            max_sessions: 0,
        }
    }
}

impl BrokerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BROKER_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.listen_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid BROKER_ADDR, using default");
            }
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Ok(val) = std::env::var("REGISTRATION_OPEN") {
            config.registration_open = val != "false" && val != "0";
        }

        if let Ok(val) = std::env::var("MAX_SESSIONS") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_sessions = n;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
