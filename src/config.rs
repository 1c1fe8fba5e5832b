//! Configuration surface recognized when bootstrapping a [`crate::Node`].

use std::sync::Arc;
use std::time::Duration;

use crate::net::auth::{AuthMethod, NoAuth, RsaChallengeAuth};
use rsa::{RsaPrivateKey, RsaPublicKey};

/// The handshake variant a node authenticates connections with.
///
/// `None` accepts every connection unconditionally; `AsymmetricKey`
/// gates every connection behind the nonce-reversal challenge of
/// `net::auth::RsaChallengeAuth`.
pub enum AuthConfig {
    None,
    AsymmetricKey {
        public_key: RsaPublicKey,
        private_key: RsaPrivateKey,
    },
}

impl AuthConfig {
    pub(crate) fn build(self) -> Arc<dyn AuthMethod> {
        match self {
            AuthConfig::None => Arc::new(NoAuth),
            AuthConfig::AsymmetricKey {
                public_key,
                private_key,
            } => Arc::new(RsaChallengeAuth::new(public_key, private_key)),
        }
    }
}

/// Configuration used to bootstrap a [`crate::Node`].
pub struct NodeConfig {
    /// The address this node accepts connections on. Port `0` means
    /// kernel-selected; the actual bound port becomes the peer's
    /// published accept port.
    pub host_address: (String, u16),
    /// The address of a single existing cluster member to join
    /// through. `None` means "start a new cluster" — the node mints
    /// its own id and runs standalone.
    pub entry_address: Option<(String, u16)>,
    /// The handshake variant run on every connection, in both
    /// directions, before any router traffic.
    pub auth_method: AuthConfig,
    /// Idle eviction threshold for cached outbound connections.
    /// Defaults to 60 seconds.
    pub connection_cache_ttl: Duration,
    /// Maximum number of entries held in the connection cache.
    /// Defaults to 100.
    pub connection_cache_max: usize,
    /// Maximum accepted frame length, in bytes. Protects the receiver
    /// against a peer announcing an unbounded frame.
    pub frame_max: u32,
}

impl NodeConfig {
    /// Builds a config for a standalone node bound to `host_address`,
    /// with no authentication and a 16 MiB frame cap.
    pub fn standalone(host_address: (String, u16)) -> Self {
        NodeConfig {
            host_address,
            entry_address: None,
            auth_method: AuthConfig::None,
            connection_cache_ttl: Duration::from_secs(60),
            connection_cache_max: 100,
            frame_max: 16 * 1024 * 1024,
        }
    }

    /// Like [`NodeConfig::standalone`], but joining the cluster
    /// reachable through `entry_address`.
    pub fn joining(host_address: (String, u16), entry_address: (String, u16)) -> Self {
        NodeConfig {
            entry_address: Some(entry_address),
            ..Self::standalone(host_address)
        }
    }
}
