//! Per-entity write serialization.
//!
//! Guarded appends are read-decide-write sequences. Two of them racing on
//! the same entity must not both observe a non-terminal state, so each
//! runs under an exclusive mutex keyed by the entity. Unrelated entities
//! never contend.
//!
//! Peer removal must not interleave with appends anywhere in the peer's
//! subtree. Every write under a peer holds that peer's scope shared;
//! removal holds it exclusively.
//!
//! Lock order: peer scope, then entity mutex, then the connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

use xferlog_shared::{PeerId, TransferId};

use crate::error::{Result, StoreError};

/// Prune dead map entries once a map grows past this many keys.
const PRUNE_THRESHOLD: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum EntityKey {
    Transfer(TransferId),
    Path(TransferId, String),
}

#[derive(Default)]
pub(crate) struct EntityLocks {
    entities: Mutex<HashMap<EntityKey, Weak<Mutex<()>>>>,
    peers: Mutex<HashMap<PeerId, Weak<RwLock<()>>>>,
}

impl EntityLocks {
    pub(crate) fn entity(&self, key: &EntityKey) -> Result<Arc<Mutex<()>>> {
        let mut map = self
            .entities
            .lock()
            .map_err(|_| StoreError::LockPoisoned("entity lock map"))?;
        Ok(upgrade_or_insert(&mut map, key, || Mutex::new(())))
    }

    pub(crate) fn peer_scope(&self, peer_id: &PeerId) -> Result<Arc<RwLock<()>>> {
        let mut map = self
            .peers
            .lock()
            .map_err(|_| StoreError::LockPoisoned("peer scope map"))?;
        Ok(upgrade_or_insert(&mut map, peer_id, || RwLock::new(())))
    }

    /// Run `f` while holding `peer_id`'s scope shared and `key` exclusively.
    pub(crate) fn with_entity<T>(
        &self,
        peer_id: &PeerId,
        key: &EntityKey,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let scope = self.peer_scope(peer_id)?;
        let _shared = scope
            .read()
            .map_err(|_| StoreError::LockPoisoned("peer scope"))?;
        let entity = self.entity(key)?;
        let _exclusive = entity
            .lock()
            .map_err(|_| StoreError::LockPoisoned("entity lock"))?;
        f()
    }

    /// Run `f` while holding `peer_id`'s scope shared.
    pub(crate) fn with_peer_shared<T>(
        &self,
        peer_id: &PeerId,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let scope = self.peer_scope(peer_id)?;
        let _shared = scope
            .read()
            .map_err(|_| StoreError::LockPoisoned("peer scope"))?;
        f()
    }

    /// Run `f` with exclusive ownership of `peer_id`'s whole subtree.
    pub(crate) fn with_peer_exclusive<T>(
        &self,
        peer_id: &PeerId,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let scope = self.peer_scope(peer_id)?;
        let _exclusive = scope
            .write()
            .map_err(|_| StoreError::LockPoisoned("peer scope"))?;
        f()
    }
}

fn upgrade_or_insert<K, L>(
    map: &mut HashMap<K, Weak<L>>,
    key: &K,
    make: impl FnOnce() -> L,
) -> Arc<L>
where
    K: std::hash::Hash + Eq + Clone,
{
    if map.len() > PRUNE_THRESHOLD {
        map.retain(|_, weak| weak.strong_count() > 0);
    }

    if let Some(existing) = map.get(key).and_then(Weak::upgrade) {
        return existing;
    }

    let lock = Arc::new(make());
    map.insert(key.clone(), Arc::downgrade(&lock));
    lock
}
