//! In-memory identity directory.
//!
//! One entry per registered endpoint. Duplicate identities are refused;
//! entries are released when their control connection closes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use quadchat_shared::types::PeerIdentity;

/// Identity -> dialing address table. Cloneable handle shared by every
/// connection task.
#[derive(Clone, Default)]
pub struct Directory {
    inner: Arc<Mutex<HashMap<PeerIdentity, SocketAddr>>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `identity`. Returns false when it is already taken.
    pub async fn register(&self, identity: PeerIdentity, addr: SocketAddr) -> bool {
        let mut table = self.inner.lock().await;
        if table.contains_key(&identity) {
            return false;
        }
        info!(identity = %identity, addr = %addr, "Identity registered");
        table.insert(identity, addr);
        true
    }

    pub async fn resolve(&self, identity: &PeerIdentity) -> Option<SocketAddr> {
        self.inner.lock().await.get(identity).copied()
    }

    /// Release a registration, e.g. when its control connection closes.
    pub async fn unregister(&self, identity: &PeerIdentity) {
        if self.inner.lock().await.remove(identity).is_some() {
            debug!(identity = %identity, "Identity released");
        }
    }

    /// Number of currently registered identities.
    pub async fn count(&self) -> usize {
        self.inner.lock().await.len()
    }
}
