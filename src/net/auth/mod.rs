//! Pluggable, authenticated connection handshake.
//!
//! A handshake runs once per connection, immediately after the
//! transport connects (client side) or is accepted (server side),
//! before any router traffic. It is transparent to the router: it
//! exchanges its own framed messages directly over the stream, using
//! message names rather than the router's opcode space.

mod none;
mod rsa_challenge;

pub use none::NoAuth;
pub use rsa_challenge::RsaChallengeAuth;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::error::{ErrorKind, Result, ResultWrappedExt};
use crate::net::frame::FramedStream;

/// A single handshake message: a name and an opaque byte payload.
#[derive(Serialize, Deserialize)]
pub(crate) struct HandshakeMessage {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl HandshakeMessage {
    pub fn new(name: &str, bytes: Vec<u8>) -> Self {
        HandshakeMessage {
            name: name.to_owned(),
            bytes,
        }
    }

    pub async fn send(&self, stream: &mut FramedStream<TcpStream>) -> Result<()> {
        let encoded = rmp_serde::to_vec(self).wrapped(ErrorKind::Protocol)?;
        stream.send(&encoded).await
    }

    pub async fn recv(stream: &mut FramedStream<TcpStream>) -> Result<Self> {
        let bytes = stream.recv().await?;
        rmp_serde::from_slice(&bytes).wrapped(ErrorKind::Protocol)
    }

    pub fn expect_name(self, expected: &str) -> Result<Self> {
        if self.name != expected {
            return Err(format!("expected `{}`, got `{}`", expected, self.name))
                .wrapped(ErrorKind::Authentication);
        }
        Ok(self)
    }
}

/// A pluggable authentication handshake. Implementations run once per
/// connection, in both the initiator and acceptor roles.
///
/// Either side either returns successfully (the connection is
/// authenticated and may be used) or fails with an `Authentication`
/// error; the caller MUST close the stream on failure, and the
/// connection cache MUST NOT cache a failed handle.
#[async_trait]
pub trait AuthMethod: Send + Sync {
    /// Runs the handshake as the connecting (client) side.
    async fn initiate(&self, stream: &mut FramedStream<TcpStream>) -> Result<()>;

    /// Runs the handshake as the accepting (server) side.
    async fn accept(&self, stream: &mut FramedStream<TcpStream>) -> Result<()>;
}
