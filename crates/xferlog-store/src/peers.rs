//! Peer identity rows and the cascading removal of a peer's subtree.

use rusqlite::{params, OptionalExtension};
use xferlog_shared::PeerId;

use crate::clock::{format_timestamp, timestamp_column};
use crate::database::Database;
use crate::error::{EntityKind, Result, StoreError};
use crate::models::Peer;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new peer. Fails with `DuplicateId` if it is already known.
    pub fn create_peer(&self, id: &PeerId) -> Result<Peer> {
        let conn = self.conn()?;

        if peer_exists(&conn, id)? {
            return Err(StoreError::DuplicateId {
                kind: EntityKind::Peer,
                id: id.to_string(),
            });
        }

        let created_at = self.timestamp()?;
        conn.execute(
            "INSERT INTO peers (id, created_at) VALUES (?1, ?2)",
            params![id.as_str(), format_timestamp(&created_at)],
        )?;

        tracing::debug!(peer_id = %id, "peer created");
        Ok(Peer {
            id: id.clone(),
            created_at,
        })
    }

    /// Insert the peer on first contact; return the stored row either way.
    pub fn ensure_peer(&self, id: &PeerId) -> Result<Peer> {
        let conn = self.conn()?;

        if !peer_exists(&conn, id)? {
            let created_at = self.timestamp()?;
            conn.execute(
                "INSERT INTO peers (id, created_at) VALUES (?1, ?2)",
                params![id.as_str(), format_timestamp(&created_at)],
            )?;
            tracing::debug!(peer_id = %id, "peer created on first contact");
        }

        get_peer_with(&conn, id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_peer(&self, id: &PeerId) -> Result<Peer> {
        let conn = self.conn()?;
        get_peer_with(&conn, id)
    }

    /// All peers, oldest first.
    pub fn list_peers(&self) -> Result<Vec<Peer>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, created_at FROM peers ORDER BY created_at ASC")?;
        let rows = stmt.query_map([], row_to_peer)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Remove a peer together with its transfers, their paths and every
    /// event below them, in one transaction.
    ///
    /// Holds the peer's scope exclusively, so no append under this peer can
    /// interleave with the cascade.
    pub fn remove_peer(&self, id: &PeerId) -> Result<()> {
        self.locks.with_peer_exclusive(id, || {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;

            let transfers: i64 = tx.query_row(
                "SELECT COUNT(*) FROM transfers WHERE peer_id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )?;

            // ON DELETE CASCADE: transfers, paths and all stage rows go with it
            let affected = tx.execute("DELETE FROM peers WHERE id = ?1", params![id.as_str()])?;
            if affected == 0 {
                return Err(StoreError::UnknownEntity {
                    kind: EntityKind::Peer,
                    id: id.to_string(),
                });
            }

            tx.commit()?;
            tracing::info!(peer_id = %id, transfers, "peer removed");
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn peer_exists(conn: &rusqlite::Connection, id: &PeerId) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM peers WHERE id = ?1",
            params![id.as_str()],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn get_peer_with(conn: &rusqlite::Connection, id: &PeerId) -> Result<Peer> {
    conn.query_row(
        "SELECT id, created_at FROM peers WHERE id = ?1",
        params![id.as_str()],
        row_to_peer,
    )
    .optional()?
    .ok_or_else(|| StoreError::UnknownEntity {
        kind: EntityKind::Peer,
        id: id.to_string(),
    })
}

fn row_to_peer(row: &rusqlite::Row<'_>) -> rusqlite::Result<Peer> {
    let id: String = row.get(0)?;
    let created_at = timestamp_column(row, 1)?;

    Ok(Peer {
        id: PeerId(id),
        created_at,
    })
}
