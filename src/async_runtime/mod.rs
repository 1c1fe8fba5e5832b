//! Thin wrapper around the async runtime used to drive the node.
//!
//! Kept as a thin indirection so the rest of the crate never names
//! `tokio` directly outside of here and `net::*`.

pub type JoinHandle<T> = ::tokio::task::JoinHandle<T>;

/// Spawns a future onto the current `tokio` runtime.
#[inline]
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    ::tokio::spawn(future)
}
