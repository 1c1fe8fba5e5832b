//! `meshnet` is a peer-to-peer messaging overlay: a set of equal peers
//! that self-organize into a cluster, exchange authenticated named
//! events, and route them either to a single named peer or to the
//! whole cluster.
//!
//! An application embeds a [`node::Node`], subscribes handlers to
//! event names, emits or unicasts events, and receives events other
//! peers raise, without knowing any peer's location.

pub mod async_runtime;
pub mod config;
pub mod error;
pub mod net;
pub mod node;

pub use config::NodeConfig;
pub use error::{Error, ErrorKind, Result};
pub use net::PeerId;
pub use node::Node;
