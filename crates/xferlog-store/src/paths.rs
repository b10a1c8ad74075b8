//! Outgoing and incoming path rows.
//!
//! Both directions share one shape and differ only in the table they live
//! in. A path is addressed by `(transfer_id, path_id)`; the surrogate row id
//! never leaves the crate.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use xferlog_shared::{Direction, TransferId};

use crate::clock::{format_timestamp, timestamp_column};
use crate::database::Database;
use crate::error::{EntityKind, Result, StoreError};
use crate::models::{NewPath, Transfer, TransferPath};
use crate::transfers::{transfer_row, unknown_transfer};

/// A path row together with its storage-internal surrogate id.
#[derive(Debug, Clone)]
pub(crate) struct StoredPath {
    pub row_id: i64,
    pub path: TransferPath,
}

impl Database {
    pub fn create_outgoing_path(
        &self,
        transfer_id: &TransferId,
        path: &str,
        path_id: &str,
        bytes: i64,
    ) -> Result<TransferPath> {
        self.create_path(Direction::Outgoing, transfer_id, path, path_id, bytes)
    }

    pub fn create_incoming_path(
        &self,
        transfer_id: &TransferId,
        path: &str,
        path_id: &str,
        bytes: i64,
    ) -> Result<TransferPath> {
        self.create_path(Direction::Incoming, transfer_id, path, path_id, bytes)
    }

    fn create_path(
        &self,
        direction: Direction,
        transfer_id: &TransferId,
        path: &str,
        path_id: &str,
        bytes: i64,
    ) -> Result<TransferPath> {
        let new_path = NewPath {
            path_id: path_id.to_string(),
            path: path.to_string(),
            bytes,
        };
        let owner = self.peer_of(transfer_id, EntityLookup::Parent)?;

        self.locks.with_peer_shared(&owner, || {
            let conn = self.conn()?;
            let created_at = self.timestamp()?;
            insert_path(&conn, direction, transfer_id, &new_path, created_at)?;

            tracing::debug!(%transfer_id, path_id, %direction, bytes, "path created");
            Ok(TransferPath {
                transfer_id: transfer_id.clone(),
                path_id: new_path.path_id,
                path: new_path.path,
                bytes,
                direction,
                created_at,
            })
        })
    }

    pub fn get_path(&self, transfer_id: &TransferId, path_id: &str) -> Result<TransferPath> {
        let conn = self.conn()?;
        let transfer = transfer_row(&conn, transfer_id)?.ok_or_else(|| unknown_transfer(transfer_id))?;
        Ok(stored_path(&conn, &transfer, path_id)?.path)
    }

    pub fn list_outgoing_paths(&self, transfer_id: &TransferId) -> Result<Vec<TransferPath>> {
        self.list_paths(Direction::Outgoing, transfer_id)
    }

    pub fn list_incoming_paths(&self, transfer_id: &TransferId) -> Result<Vec<TransferPath>> {
        self.list_paths(Direction::Incoming, transfer_id)
    }

    /// Paths of a transfer in creation order. A transfer only ever has paths
    /// of its own direction, so the other listing is empty.
    fn list_paths(&self, direction: Direction, transfer_id: &TransferId) -> Result<Vec<TransferPath>> {
        let conn = self.conn()?;
        if transfer_row(&conn, transfer_id)?.is_none() {
            return Err(unknown_transfer(transfer_id));
        }
        Ok(stored_paths(&conn, direction, transfer_id)?
            .into_iter()
            .map(|stored| stored.path)
            .collect())
    }

    /// Owning peer of a transfer, reporting absence as the given error class.
    pub(crate) fn peer_of(
        &self,
        transfer_id: &TransferId,
        lookup: EntityLookup,
    ) -> Result<xferlog_shared::PeerId> {
        let conn = self.conn()?;
        match transfer_row(&conn, transfer_id)? {
            Some(transfer) => Ok(transfer.peer_id),
            None => Err(lookup.missing_transfer(transfer_id)),
        }
    }
}

/// Whether a missing transfer is the parent of something being created or
/// the subject of an event.
#[derive(Debug, Clone, Copy)]
pub(crate) enum EntityLookup {
    Parent,
    Subject,
}

impl EntityLookup {
    fn missing_transfer(self, id: &TransferId) -> StoreError {
        match self {
            Self::Parent => StoreError::UnknownParent {
                kind: EntityKind::Transfer,
                id: id.to_string(),
            },
            Self::Subject => unknown_transfer(id),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn path_kind(direction: Direction) -> EntityKind {
    match direction {
        Direction::Outgoing => EntityKind::OutgoingPath,
        Direction::Incoming => EntityKind::IncomingPath,
    }
}

fn paths_table(direction: Direction) -> &'static str {
    match direction {
        Direction::Outgoing => "outgoing_paths",
        Direction::Incoming => "incoming_paths",
    }
}

/// Insert a path row under a transfer of the same direction and return its
/// surrogate id.
pub(crate) fn insert_path(
    conn: &Connection,
    direction: Direction,
    transfer_id: &TransferId,
    path: &NewPath,
    created_at: NaiveDateTime,
) -> Result<i64> {
    if path.bytes < 0 {
        return Err(StoreError::InvalidPayload(format!(
            "declared size of {} must be >= 0, got {}",
            path.path_id, path.bytes
        )));
    }

    // a transfer of the other direction is not a parent for this table
    match transfer_row(conn, transfer_id)? {
        Some(transfer) if transfer.direction == direction => {}
        _ => {
            return Err(StoreError::UnknownParent {
                kind: EntityKind::Transfer,
                id: format!("{transfer_id} ({direction})"),
            })
        }
    }

    let table = paths_table(direction);
    let exists = conn
        .query_row(
            &format!("SELECT 1 FROM {table} WHERE transfer_id = ?1 AND path_id = ?2"),
            params![transfer_id.as_str(), path.path_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if exists {
        return Err(StoreError::DuplicateId {
            kind: path_kind(direction),
            id: format!("{transfer_id}/{}", path.path_id),
        });
    }

    conn.execute(
        &format!(
            "INSERT INTO {table} (transfer_id, path_id, path, bytes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)"
        ),
        params![
            transfer_id.as_str(),
            path.path_id,
            path.path,
            path.bytes,
            format_timestamp(&created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Look up a path of `transfer` by its business id.
pub(crate) fn stored_path(conn: &Connection, transfer: &Transfer, path_id: &str) -> Result<StoredPath> {
    let table = paths_table(transfer.direction);
    conn.query_row(
        &format!(
            "SELECT id, transfer_id, path_id, path, bytes, created_at
             FROM {table} WHERE transfer_id = ?1 AND path_id = ?2"
        ),
        params![transfer.id.as_str(), path_id],
        |row| row_to_stored_path(row, transfer.direction),
    )
    .optional()?
    .ok_or_else(|| StoreError::UnknownEntity {
        kind: path_kind(transfer.direction),
        id: format!("{}/{path_id}", transfer.id),
    })
}

pub(crate) fn stored_paths(
    conn: &Connection,
    direction: Direction,
    transfer_id: &TransferId,
) -> Result<Vec<StoredPath>> {
    let table = paths_table(direction);
    let mut stmt = conn.prepare(&format!(
        "SELECT id, transfer_id, path_id, path, bytes, created_at
         FROM {table} WHERE transfer_id = ?1 ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map(params![transfer_id.as_str()], |row| {
        row_to_stored_path(row, direction)
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}

fn row_to_stored_path(row: &rusqlite::Row<'_>, direction: Direction) -> rusqlite::Result<StoredPath> {
    let row_id: i64 = row.get(0)?;
    let transfer_id: String = row.get(1)?;
    let path_id: String = row.get(2)?;
    let path: String = row.get(3)?;
    let bytes: i64 = row.get(4)?;
    let created_at = timestamp_column(row, 5)?;

    Ok(StoredPath {
        row_id,
        path: TransferPath {
            transfer_id: TransferId(transfer_id),
            path_id,
            path,
            bytes,
            direction,
            created_at,
        },
    })
}
