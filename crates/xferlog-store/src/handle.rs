//! Async access for tokio tasks.
//!
//! SQLite calls block, so every operation runs on the blocking pool. Clone
//! the handle freely; all clones share one [`Database`].

use std::sync::Arc;

use xferlog_shared::{EngineEvent, PeerId, TransferId};

use crate::database::Database;
use crate::error::Result;
use crate::history::TransferDump;
use crate::reconstruct::{PathSnapshot, TransferSnapshot};
use crate::stages::{PathEventRecord, PathStage, TransferEventRecord, TransferStage};

#[derive(Clone)]
pub struct DatabaseHandle {
    inner: Arc<Database>,
}

impl DatabaseHandle {
    pub fn new(db: Database) -> Self {
        Self {
            inner: Arc::new(db),
        }
    }

    /// Run `f` against the database on the blocking pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    pub async fn ingest(&self, event: EngineEvent) -> Result<()> {
        self.run(move |db| db.ingest(&event)).await
    }

    pub async fn append_transfer_event(
        &self,
        transfer_id: TransferId,
        stage: TransferStage,
    ) -> Result<TransferEventRecord> {
        self.run(move |db| db.append_transfer_event(&transfer_id, stage))
            .await
    }

    pub async fn append_path_event(
        &self,
        transfer_id: TransferId,
        path_id: String,
        stage: PathStage,
    ) -> Result<PathEventRecord> {
        self.run(move |db| db.append_path_event(&transfer_id, &path_id, stage))
            .await
    }

    pub async fn transfer_state(&self, transfer_id: TransferId) -> Result<TransferSnapshot> {
        self.run(move |db| db.transfer_state(&transfer_id)).await
    }

    pub async fn path_state(&self, transfer_id: TransferId, path_id: String) -> Result<PathSnapshot> {
        self.run(move |db| db.path_state(&transfer_id, &path_id))
            .await
    }

    pub async fn transfer_dump(&self, transfer_id: TransferId) -> Result<TransferDump> {
        self.run(move |db| db.transfer_dump(&transfer_id)).await
    }

    pub async fn remove_peer(&self, peer_id: PeerId) -> Result<()> {
        self.run(move |db| db.remove_peer(&peer_id)).await
    }
}
