//! Address-keyed pool of outbound client streams with TTL eviction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::error::{ErrorKind, Result, ResultSimpleExt, ResultWrappedExt};
use crate::net::auth::AuthMethod;
use crate::net::frame::FramedStream;

/// Opaque handle identifying a cached connection. Identity lives in
/// the handle, not the address: two `connect()` calls to the same
/// address may collapse onto a single live handle.
pub type ConnHandle = u64;

struct CacheEntry {
    stream: AsyncMutex<FramedStream<TcpStream>>,
    created_at: parking_lot::Mutex<Instant>,
    addr: (String, u16),
}

/// Pool of cached outbound connections, each gated behind the
/// configured handshake on creation.
pub struct ConnectionCache {
    entries: RwLock<HashMap<ConnHandle, Arc<CacheEntry>>>,
    next_handle: AtomicU64,
    max: usize,
    ttl: Duration,
    auth: Arc<dyn AuthMethod>,
    frame_max: u32,
}

impl ConnectionCache {
    pub fn new(max: usize, ttl: Duration, auth: Arc<dyn AuthMethod>, frame_max: u32) -> Self {
        ConnectionCache {
            entries: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(0),
            max,
            ttl,
            auth,
            frame_max,
        }
    }

    /// Returns the handle of a live connection to `(host, port)`,
    /// opening and authenticating a new one if none exists.
    pub async fn connect(&self, host: &str, port: u16) -> Result<ConnHandle> {
        if let Some(handle) = self.find_by_addr(host, port) {
            self.touch(handle);
            return Ok(handle);
        }

        let sock = TcpStream::connect((host, port))
            .await
            .wrapped(ErrorKind::ConnectionFailed)?;
        let mut stream = FramedStream::new(sock, self.frame_max);
        self.auth.initiate(&mut stream).await?;

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(CacheEntry {
            stream: AsyncMutex::new(stream),
            created_at: parking_lot::Mutex::new(Instant::now()),
            addr: (host.to_owned(), port),
        });

        self.evict_if_full();
        self.entries.write().insert(handle, entry);
        Ok(handle)
    }

    fn find_by_addr(&self, host: &str, port: u16) -> Option<ConnHandle> {
        self.entries
            .read()
            .iter()
            .find(|(_, e)| e.addr.0 == host && e.addr.1 == port)
            .map(|(handle, _)| *handle)
    }

    fn touch(&self, handle: ConnHandle) {
        if let Some(entry) = self.entries.read().get(&handle) {
            *entry.created_at.lock() = Instant::now();
        }
    }

    fn evict_if_full(&self) {
        let oldest = {
            let entries = self.entries.read();
            if entries.len() < self.max {
                return;
            }
            entries
                .iter()
                .min_by_key(|(_, e)| *e.created_at.lock())
                .map(|(handle, _)| *handle)
        };
        if let Some(handle) = oldest {
            self.entries.write().remove(&handle);
        }
    }

    fn get(&self, handle: ConnHandle) -> Result<Arc<CacheEntry>> {
        self.entries
            .read()
            .get(&handle)
            .cloned()
            .ok_or(())
            .simple(ErrorKind::ConnectionNotFound)
    }

    pub async fn send(&self, handle: ConnHandle, bytes: &[u8]) -> Result<()> {
        let entry = self.get(handle)?;
        let mut stream = entry.stream.lock().await;
        stream.send(bytes).await?;
        drop(stream);
        *entry.created_at.lock() = Instant::now();
        Ok(())
    }

    pub async fn recv(&self, handle: ConnHandle) -> Result<Vec<u8>> {
        let entry = self.get(handle)?;
        let mut stream = entry.stream.lock().await;
        let bytes = stream.recv().await?;
        drop(stream);
        *entry.created_at.lock() = Instant::now();
        Ok(bytes)
    }

    /// Closes and removes the connection backing `handle`. Calling
    /// this on an unknown handle is a caller error.
    pub async fn disconnect(&self, handle: ConnHandle) -> Result<()> {
        let entry = self.get(handle)?;
        self.entries.write().remove(&handle);
        let mut stream = entry.stream.lock().await;
        let _ = stream.close().await;
        Ok(())
    }

    /// Removes every entry idle for longer than the configured TTL.
    pub async fn clean(&self) {
        let now = Instant::now();
        let stale: Vec<ConnHandle> = self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| now.duration_since(*e.created_at.lock()) > self.ttl)
            .map(|(handle, _)| *handle)
            .collect();
        for handle in stale {
            if let Some(entry) = self.entries.write().remove(&handle) {
                let mut stream = entry.stream.lock().await;
                let _ = stream.close().await;
                debug!(handle, "evicted idle connection");
            }
        }
    }

    /// Closes and removes every cached connection.
    pub async fn close_all(&self) {
        let handles: Vec<ConnHandle> = self.entries.read().keys().copied().collect();
        for handle in handles {
            if let Some(entry) = self.entries.write().remove(&handle) {
                let mut stream = entry.stream.lock().await;
                let _ = stream.close().await;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::auth::NoAuth;
    use tokio::net::TcpListener;

    async fn echo_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            loop {
                let (sock, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                tokio::spawn(async move {
                    let mut stream = FramedStream::new(sock, 1024 * 1024);
                    while let Ok(bytes) = stream.recv().await {
                        if stream.send(&bytes).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn connect_is_idempotent_for_same_address() {
        let (addr, _server) = echo_server().await;
        let cache = ConnectionCache::new(10, Duration::from_secs(60), Arc::new(NoAuth), 4096);

        let h1 = cache
            .connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();
        let h2 = cache
            .connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();
        assert_eq!(h1, h2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn send_recv_round_trip() {
        let (addr, _server) = echo_server().await;
        let cache = ConnectionCache::new(10, Duration::from_secs(60), Arc::new(NoAuth), 4096);
        let handle = cache
            .connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();

        cache.send(handle, b"ping").await.unwrap();
        let reply = cache.recv(handle).await.unwrap();
        assert_eq!(reply, b"ping");
    }

    #[tokio::test]
    async fn unknown_handle_is_connection_not_found() {
        let cache = ConnectionCache::new(10, Duration::from_secs(60), Arc::new(NoAuth), 4096);
        let err = cache.send(9999, b"x").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConnectionNotFound);
    }

    #[tokio::test]
    async fn clean_evicts_only_stale_entries() {
        let (addr, _server) = echo_server().await;
        let cache = ConnectionCache::new(10, Duration::from_millis(10), Arc::new(NoAuth), 4096);
        let handle = cache
            .connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.clean().await;
        assert_eq!(cache.len(), 0);
        let err = cache.send(handle, b"x").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConnectionNotFound);
    }
}
