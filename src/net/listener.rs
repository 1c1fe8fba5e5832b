//! Binds the accept address and hands each authenticated connection
//! off to the router.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::net::frame::FramedStream;
use crate::net::router::Router;

/// Accepts inbound streams, runs the configured handshake as
/// acceptor, then hands each stream to `Router::on_connection`.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Binds at `(host, port)`. Port `0` means kernel-selected; read
    /// the actual bound port back with `local_addr`.
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let inner = TcpListener::bind((host, port)).await?;
        Ok(Listener { inner })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.inner.local_addr().map_err(Error::from)
    }

    /// Runs the accept loop until the listener itself errors out
    /// (which only happens if the underlying socket is in a fatal
    /// state; per-connection failures never propagate here).
    pub async fn serve(self, router: Arc<Router>, frame_max: u32) {
        loop {
            let (sock, remote_addr) = match self.inner.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed, continuing");
                    continue;
                }
            };

            let router = router.clone();
            crate::async_runtime::spawn(async move {
                let auth = router.auth();
                let mut stream = FramedStream::new(sock, frame_max);
                if let Err(e) = auth.accept(&mut stream).await {
                    debug!(error = %e, %remote_addr, "handshake failed, dropping connection");
                    let _ = stream.close().await;
                    return;
                }
                router.on_connection(stream, remote_addr).await;
            });
        }
    }
}
