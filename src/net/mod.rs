//! Wire protocol, transport and routing primitives.

pub mod auth;
pub mod cache;
pub mod frame;
pub mod listener;
pub mod peer_table;
pub mod router;
pub mod wire;

pub use cache::{ConnHandle, ConnectionCache};
pub use frame::FramedStream;
pub use listener::Listener;
pub use peer_table::PeerTable;
pub use router::{DataHandler, Router};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, ErrorKind, Result, ResultWrappedExt};

/// An opaque, universe-unique textual identifier assigned by the
/// cluster at join time, never self-chosen (except by an isolated
/// peer starting a new cluster, which mints its own).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(Uuid);

impl PeerId {
    /// Mints a fresh, random peer id.
    pub fn new() -> Self {
        PeerId(Uuid::new_v4())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

impl FromStr for PeerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s).map(PeerId).wrapped(ErrorKind::Protocol)
    }
}

/// A peer's accept address: the address where other peers reach it,
/// never the ephemeral client port of any single connection.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: PeerId,
    pub host: String,
    pub port: u16,
}

impl PeerRecord {
    pub fn new(id: PeerId, host: impl Into<String>, port: u16) -> Self {
        PeerRecord {
            id,
            host: host.into(),
            port,
        }
    }

    pub fn addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}
