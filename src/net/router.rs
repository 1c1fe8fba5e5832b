//! The routing layer: join protocol, unicast, broadcast, and
//! self-loopback. This is the heart of the overlay.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, Result, ResultSimpleExt, ResultWrappedExt};
use crate::net::auth::AuthMethod;
use crate::net::cache::ConnectionCache;
use crate::net::frame::FramedStream;
use crate::net::peer_table::PeerTable;
use crate::net::wire::{ControlFrame, DataPayload, JoinOkPayload, JoinPayload, NewPeerPayload};
use crate::net::{PeerId, PeerRecord};

/// Sink for `DATA` frames delivered either over the network or via
/// loopback. Registered once by the node façade before `run()`.
#[async_trait]
pub trait DataHandler: Send + Sync {
    async fn on_data(&self, origin: PeerId, payload: Vec<u8>);
}

/// Implements the join protocol, unicast, broadcast, and
/// self-loopback routing described by the overlay's connectivity
/// fabric.
pub struct Router {
    id: RwLock<PeerId>,
    accept_host: String,
    accept_port: RwLock<u16>,
    peers: PeerTable,
    cache: ConnectionCache,
    auth: Arc<dyn AuthMethod>,
    data_handler: RwLock<Option<Arc<dyn DataHandler>>>,
}

impl Router {
    pub fn new(
        accept_host: String,
        accept_port: u16,
        cache: ConnectionCache,
        auth: Arc<dyn AuthMethod>,
    ) -> Self {
        Router {
            id: RwLock::new(PeerId::new()),
            accept_host,
            accept_port: RwLock::new(accept_port),
            peers: PeerTable::new(),
            cache,
            auth,
            data_handler: RwLock::new(None),
        }
    }

    pub fn id(&self) -> PeerId {
        *self.id.read()
    }

    /// The listener calls this once it has bound its socket, since
    /// port `0` is only resolved at bind time.
    pub fn set_accept_port(&self, port: u16) {
        *self.accept_port.write() = port;
    }

    pub fn accept_addr(&self) -> (String, u16) {
        (self.accept_host.clone(), *self.accept_port.read())
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    pub fn auth(&self) -> Arc<dyn AuthMethod> {
        self.auth.clone()
    }

    pub fn set_data_handler(&self, handler: Arc<dyn DataHandler>) {
        *self.data_handler.write() = Some(handler);
    }

    /// Runs the join protocol against `entry_host:entry_port`. If the
    /// connection cannot be established, this is not an error: the
    /// node remains standalone, keeping its freshly minted id and
    /// serving as its own cluster origin.
    pub async fn join(&self, entry_host: &str, entry_port: u16) {
        match self.try_join(entry_host, entry_port).await {
            Ok(()) => info!(id = %self.id(), "joined cluster"),
            Err(e) => info!(%e, "could not reach entry node, starting standalone"),
        }
    }

    async fn try_join(&self, entry_host: &str, entry_port: u16) -> Result<()> {
        let handle = self.cache.connect(entry_host, entry_port).await?;
        let (host, port) = self.accept_addr();
        let frame = ControlFrame::Join(JoinPayload {
            accept_host: host,
            accept_port: port,
        });
        self.cache.send(handle, &frame.encode()?).await?;

        let response = self.cache.recv(handle).await?;
        let ok = match ControlFrame::decode(&response)? {
            ControlFrame::JoinOk(ok) => ok,
            _ => return Err("expected JOIN_OK in response to JOIN").wrapped(ErrorKind::Protocol),
        };

        *self.id.write() = ok.assigned_id;
        for peer in ok.peers {
            self.peers.upsert(peer.id, peer);
        }
        self.peers.upsert(
            ok.entry_id,
            PeerRecord::new(ok.entry_id, entry_host.to_owned(), entry_port),
        );
        Ok(())
    }

    /// Sends `payload` to a single peer. `target == ownId` is
    /// delivered locally without touching the network.
    pub async fn send_to(&self, target: PeerId, payload: Vec<u8>) -> Result<()> {
        let origin = self.id();
        if target == origin {
            self.loopback(origin, payload).await;
            return Ok(());
        }

        let record = self.peers.get(&target).ok_or(()).simple(ErrorKind::NodeNotFound)?;

        let frame = ControlFrame::Data(DataPayload {
            origin,
            bytes: payload,
        })
        .encode()?;

        match self.send_raw(&record.host, record.port, &frame).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.peers.remove(&target);
                Err(e)
            }
        }
    }

    /// Broadcasts `payload` to every known peer, best-effort, then
    /// delivers it to the local data handler exactly once.
    pub async fn emit(&self, payload: Vec<u8>) {
        let origin = self.id();
        let frame = match (ControlFrame::Data(DataPayload {
            origin,
            bytes: payload.clone(),
        }))
        .encode()
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%e, "failed to encode outgoing DATA frame");
                return;
            }
        };

        for peer in self.peers.snapshot() {
            if self.send_raw(&peer.host, peer.port, &frame).await.is_err() {
                self.peers.remove(&peer.id);
            }
        }

        self.loopback(origin, payload).await;
    }

    async fn send_raw(&self, host: &str, port: u16, bytes: &[u8]) -> Result<()> {
        let handle = self.cache.connect(host, port).await?;
        self.cache.send(handle, bytes).await
    }

    async fn loopback(&self, origin: PeerId, payload: Vec<u8>) {
        let handler = self.data_handler.read().clone();
        if let Some(handler) = handler {
            handler.on_data(origin, payload).await;
        }
    }

    /// Entry point for the listener/acceptor: drives a single,
    /// already-handshaken connection until it closes.
    pub async fn on_connection(&self, mut stream: FramedStream<TcpStream>, remote_addr: SocketAddr) {
        loop {
            let bytes = match stream.recv().await {
                Ok(bytes) => bytes,
                Err(_) => return,
            };
            if let Err(e) = self.on_frame(&bytes, remote_addr, &mut stream).await {
                warn!(%e, %remote_addr, "closing connection after frame error");
                return;
            }
        }
    }

    async fn on_frame(
        &self,
        bytes: &[u8],
        remote_addr: SocketAddr,
        stream: &mut FramedStream<TcpStream>,
    ) -> Result<()> {
        let frame = match ControlFrame::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%e, "dropping unparseable frame");
                return Ok(());
            }
        };

        match frame {
            ControlFrame::Join(payload) => self.handle_join(payload, remote_addr, stream).await,
            ControlFrame::NewPeer(payload) => {
                self.handle_new_peer(payload);
                Ok(())
            }
            ControlFrame::Data(payload) => {
                self.loopback(payload.origin, payload.bytes).await;
                Ok(())
            }
            ControlFrame::JoinOk(_) => {
                warn!("unexpected JOIN_OK on an established connection, dropping");
                Ok(())
            }
        }
    }

    async fn handle_join(
        &self,
        payload: JoinPayload,
        remote_addr: SocketAddr,
        stream: &mut FramedStream<TcpStream>,
    ) -> Result<()> {
        let new_id = PeerId::new();
        let snapshot = self.peers.snapshot();
        let response = ControlFrame::JoinOk(JoinOkPayload {
            peers: snapshot,
            assigned_id: new_id,
            entry_id: self.id(),
        })
        .encode()?;
        stream.send(&response).await?;

        let announce = NewPeerPayload {
            id: new_id,
            observed_host: remote_addr.ip().to_string(),
            observed_port: remote_addr.port(),
            advertised_host: payload.accept_host,
            advertised_port: payload.accept_port,
        };
        self.broadcast_new_peer(announce).await;
        Ok(())
    }

    /// Broadcasts `NEW_PEER` to every existing peer and to the entry
    /// itself, so that the entry's own table update happens through
    /// the exact same code path as every other peer's.
    async fn broadcast_new_peer(&self, announce: NewPeerPayload) {
        let frame = match ControlFrame::NewPeer(announce.clone()).encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%e, "failed to encode NEW_PEER announcement");
                return;
            }
        };

        for peer in self.peers.snapshot() {
            if self.send_raw(&peer.host, peer.port, &frame).await.is_err() {
                self.peers.remove(&peer.id);
            }
        }

        self.handle_new_peer(announce);
    }

    /// Idempotent: a repeated announcement for an id already in the
    /// table is ignored. The host/port tie-break prefers the
    /// remote-observed host (how the peer is actually reachable) and
    /// the advertised port (the peer's own chosen accept port).
    fn handle_new_peer(&self, payload: NewPeerPayload) {
        if payload.id == self.id() || self.peers.contains(&payload.id) {
            return;
        }
        debug!(id = %payload.id, host = %payload.observed_host, port = payload.advertised_port, "new peer announced");
        let record = PeerRecord::new(payload.id, payload.observed_host, payload.advertised_port);
        self.peers.upsert(payload.id, record);
    }
}
