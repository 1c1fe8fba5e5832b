//! Thin layer above the router: event-name registration, send/emit,
//! and lifecycle.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::warn;

use crate::config::NodeConfig;
use crate::error::Result;
use crate::net::cache::ConnectionCache;
use crate::net::listener::Listener;
use crate::net::router::{DataHandler, Router};
use crate::net::wire::EventEnvelope;
use crate::net::{PeerId, PeerRecord};

/// A handler bound to a single event name. Implemented for any
/// `Fn(PeerId, Vec<u8>) -> impl Future<Output = ()>` closure, so
/// callers register plain async closures.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn call(&self, origin: PeerId, payload: Vec<u8>);
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(PeerId, Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn call(&self, origin: PeerId, payload: Vec<u8>) {
        (self)(origin, payload).await
    }
}

/// A handler run once, when the node starts running.
#[async_trait]
pub trait StartupHandler: Send + Sync {
    async fn call(&self);
}

#[async_trait]
impl<F, Fut> StartupHandler for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn call(&self) {
        (self)().await
    }
}

/// The application-facing peer-to-peer node. Registers event
/// handlers, serializes `(name, payload)`, and drives the listener
/// and router underneath.
pub struct Node {
    router: Arc<Router>,
    accept_host: String,
    accept_port_cfg: u16,
    entry_address: Option<(String, u16)>,
    frame_max: u32,
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    startup: RwLock<Vec<Arc<dyn StartupHandler>>>,
    bound_addr: RwLock<Option<SocketAddr>>,
    bound_notify: Notify,
}

impl Node {
    /// Validates `config` and constructs a `Node`. No I/O happens
    /// here; call `run()` to bind the listener and, if configured,
    /// join a cluster.
    pub fn new(config: NodeConfig) -> Arc<Self> {
        let auth = config.auth_method.build();
        let cache = ConnectionCache::new(
            config.connection_cache_max,
            config.connection_cache_ttl,
            auth.clone(),
            config.frame_max,
        );
        let (host, port) = config.host_address;
        let router = Arc::new(Router::new(host.clone(), port, cache, auth));

        Arc::new(Node {
            router,
            accept_host: host,
            accept_port_cfg: port,
            entry_address: config.entry_address,
            frame_max: config.frame_max,
            handlers: RwLock::new(HashMap::new()),
            startup: RwLock::new(Vec::new()),
            bound_addr: RwLock::new(None),
            bound_notify: Notify::new(),
        })
    }

    /// Waits for `run()` to have bound its listener, and returns the
    /// resolved accept address (useful in tests, where `port: 0` is
    /// common and the real port is only known after binding).
    pub async fn local_addr(&self) -> SocketAddr {
        loop {
            let notified = self.bound_notify.notified();
            if let Some(addr) = *self.bound_addr.read() {
                return addr;
            }
            notified.await;
        }
    }

    /// The node's current peer id. Stable once joined; may change
    /// exactly once, at the moment a join succeeds.
    pub fn id(&self) -> PeerId {
        self.router.id()
    }

    /// A snapshot of every peer currently known to this node.
    pub fn peers(&self) -> Vec<PeerRecord> {
        self.router.peers().snapshot()
    }

    /// Registers `handler` to be called for every event named
    /// `name`, in registration order. Must be called before `run()`;
    /// the façade makes no guarantee about mid-run registration.
    pub fn on<H, Fut>(&self, name: &str, handler: H)
    where
        H: Fn(PeerId, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Arc<dyn EventHandler> = Arc::new(handler);
        self.handlers
            .write()
            .entry(name.to_owned())
            .or_default()
            .push(handler);
    }

    /// Registers a handler to run once `run()` starts.
    pub fn bind_start<H, Fut>(&self, handler: H)
    where
        H: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Arc<dyn StartupHandler> = Arc::new(handler);
        self.startup.write().push(handler);
    }

    /// Broadcasts `(name, bytes)` to every peer, plus the local
    /// loopback, exactly once.
    pub async fn emit(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let envelope = EventEnvelope::encode(name, bytes)?;
        self.router.emit(envelope).await;
        Ok(())
    }

    /// Sends `(name, bytes)` to a single peer, or to the local
    /// loopback if `target` is this node's own id.
    pub async fn send(&self, target: PeerId, name: &str, bytes: &[u8]) -> Result<()> {
        let envelope = EventEnvelope::encode(name, bytes)?;
        self.router.send_to(target, envelope).await
    }

    /// Starts the listener, attempts to join the configured entry
    /// node (falling back to standalone on failure), runs every
    /// startup handler, then blocks serving inbound connections.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = Listener::bind(&self.accept_host, self.accept_port_cfg).await?;
        let local_addr = listener.local_addr()?;
        self.router.set_accept_port(local_addr.port());
        *self.bound_addr.write() = Some(local_addr);
        self.bound_notify.notify_waiters();
        self.router
            .set_data_handler(self.clone() as Arc<dyn DataHandler>);

        match &self.entry_address {
            Some((host, port)) => self.router.join(host, *port).await,
            None => tracing::info!(id = %self.router.id(), "starting new cluster"),
        }

        let startup: Vec<_> = self.startup.read().iter().cloned().collect();
        for handler in startup {
            crate::async_runtime::spawn(async move { handler.call().await });
        }

        listener.serve(self.router.clone(), self.frame_max).await;
        Ok(())
    }
}

#[async_trait]
impl DataHandler for Node {
    async fn on_data(&self, origin: PeerId, payload: Vec<u8>) {
        let envelope = match EventEnvelope::decode(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping malformed event envelope");
                return;
            }
        };

        let handlers = self.handlers.read().get(&envelope.name).cloned();
        match handlers {
            Some(handlers) => {
                for handler in handlers {
                    handler.call(origin, envelope.bytes.clone()).await;
                }
            }
            None => warn!(name = %envelope.name, "no handler registered for event"),
        }
    }
}
