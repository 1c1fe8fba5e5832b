//! Authoritative map of peer-id to reachable address.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::net::{PeerId, PeerRecord};

/// Thread-safe mapping from `PeerId` to `PeerRecord`. Never stores the
/// owning peer's own id. Reads take a snapshot (copy-on-iterate), so
/// a concurrent `upsert`/`remove` never corrupts an in-flight
/// iteration.
#[derive(Default)]
pub struct PeerTable {
    inner: RwLock<HashMap<PeerId, PeerRecord>>,
}

impl PeerTable {
    pub fn new() -> Self {
        PeerTable {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn upsert(&self, id: PeerId, record: PeerRecord) {
        self.inner.write().insert(id, record);
    }

    /// Idempotent: removing an absent id is a no-op.
    pub fn remove(&self, id: &PeerId) {
        self.inner.write().remove(id);
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.inner.read().contains_key(id)
    }

    pub fn get(&self, id: &PeerId) -> Option<PeerRecord> {
        self.inner.read().get(id).cloned()
    }

    /// A point-in-time copy of every known peer record, safe to
    /// iterate without holding any lock.
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        self.inner.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_is_idempotent() {
        let table = PeerTable::new();
        let id = PeerId::new();
        table.remove(&id);
        table.remove(&id);
        assert!(!table.contains(&id));
    }

    #[test]
    fn snapshot_is_unaffected_by_later_mutation() {
        let table = PeerTable::new();
        let id = PeerId::new();
        table.upsert(id, PeerRecord::new(id, "127.0.0.1", 9000));
        let snap = table.snapshot();
        table.remove(&id);
        assert_eq!(snap.len(), 1);
        assert_eq!(table.snapshot().len(), 0);
    }
}
