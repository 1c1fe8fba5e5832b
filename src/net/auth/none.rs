use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::error::Result;
use crate::net::auth::AuthMethod;
use crate::net::frame::FramedStream;

/// Authentication method that accepts every connection
/// unconditionally. Both sides return immediately.
pub struct NoAuth;

#[async_trait]
impl AuthMethod for NoAuth {
    async fn initiate(&self, _stream: &mut FramedStream<TcpStream>) -> Result<()> {
        Ok(())
    }

    async fn accept(&self, _stream: &mut FramedStream<TcpStream>) -> Result<()> {
        Ok(())
    }
}
