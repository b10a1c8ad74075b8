//! Transfer identity rows.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use xferlog_shared::{Direction, PeerId, TransferId};

use crate::clock::{format_timestamp, timestamp_column};
use crate::database::Database;
use crate::error::{EntityKind, Result, StoreError};
use crate::events::{insert_path_stage, insert_transfer_stage};
use crate::models::{NewPath, Transfer};
use crate::paths::{insert_path, path_kind};
use crate::peers::peer_exists;
use crate::stages::{PathStage, TransferStage};

const SELECT_TRANSFER: &str = "SELECT id, peer_id, direction, created_at FROM transfers";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a transfer owned by `peer_id`. Its direction is fixed forever.
    pub fn create_transfer(
        &self,
        id: &TransferId,
        peer_id: &PeerId,
        direction: Direction,
    ) -> Result<Transfer> {
        self.locks.with_peer_shared(peer_id, || {
            let conn = self.conn()?;
            let created_at = self.timestamp()?;
            let transfer = insert_transfer(&conn, id, peer_id, direction, created_at)?;

            tracing::debug!(transfer_id = %id, peer_id = %peer_id, %direction, "transfer created");
            Ok(transfer)
        })
    }

    /// Create a transfer with its whole file list in one transaction: the
    /// transfer row, an initial `active` event, every path, and a `pending`
    /// event per path. Nothing is written if any part fails.
    pub fn create_transfer_with_paths(
        &self,
        id: &TransferId,
        peer_id: &PeerId,
        direction: Direction,
        paths: &[NewPath],
    ) -> Result<Transfer> {
        let mut seen = HashSet::new();
        for path in paths {
            if !seen.insert(path.path_id.as_str()) {
                return Err(StoreError::DuplicateId {
                    kind: path_kind(direction),
                    id: format!("{id}/{}", path.path_id),
                });
            }
        }

        self.locks.with_peer_shared(peer_id, || {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;

            let transfer = insert_transfer(&tx, id, peer_id, direction, self.timestamp()?)?;
            insert_transfer_stage(&tx, id, &TransferStage::Active, self.timestamp()?)?;

            for path in paths {
                let row_id = insert_path(&tx, direction, id, path, self.timestamp()?)?;
                insert_path_stage(&tx, direction, row_id, &PathStage::Pending, self.timestamp()?)?;
            }

            tx.commit()?;
            tracing::info!(
                transfer_id = %id,
                peer_id = %peer_id,
                %direction,
                files = paths.len(),
                "transfer recorded"
            );
            Ok(transfer)
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_transfer(&self, id: &TransferId) -> Result<Transfer> {
        let conn = self.conn()?;
        transfer_row(&conn, id)?.ok_or_else(|| unknown_transfer(id))
    }

    /// Transfers of one peer, oldest first.
    pub fn list_transfers_for_peer(&self, peer_id: &PeerId) -> Result<Vec<Transfer>> {
        let conn = self.conn()?;

        if !peer_exists(&conn, peer_id)? {
            return Err(StoreError::UnknownEntity {
                kind: EntityKind::Peer,
                id: peer_id.to_string(),
            });
        }

        let mut stmt = conn.prepare(&format!(
            "{SELECT_TRANSFER} WHERE peer_id = ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![peer_id.as_str()], row_to_transfer)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Transfers created at or after `since`, oldest first.
    pub fn list_transfers_since(&self, since: NaiveDateTime) -> Result<Vec<Transfer>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_TRANSFER} WHERE created_at >= ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![format_timestamp(&since)], row_to_transfer)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn insert_transfer(
    conn: &Connection,
    id: &TransferId,
    peer_id: &PeerId,
    direction: Direction,
    created_at: NaiveDateTime,
) -> Result<Transfer> {
    if !peer_exists(conn, peer_id)? {
        return Err(StoreError::UnknownParent {
            kind: EntityKind::Peer,
            id: peer_id.to_string(),
        });
    }
    if transfer_row(conn, id)?.is_some() {
        return Err(StoreError::DuplicateId {
            kind: EntityKind::Transfer,
            id: id.to_string(),
        });
    }

    conn.execute(
        "INSERT INTO transfers (id, peer_id, direction, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            id.as_str(),
            peer_id.as_str(),
            direction.as_i64(),
            format_timestamp(&created_at),
        ],
    )?;

    Ok(Transfer {
        id: id.clone(),
        peer_id: peer_id.clone(),
        direction,
        created_at,
    })
}

pub(crate) fn transfer_row(conn: &Connection, id: &TransferId) -> Result<Option<Transfer>> {
    Ok(conn
        .query_row(
            &format!("{SELECT_TRANSFER} WHERE id = ?1"),
            params![id.as_str()],
            row_to_transfer,
        )
        .optional()?)
}

pub(crate) fn unknown_transfer(id: &TransferId) -> StoreError {
    StoreError::UnknownEntity {
        kind: EntityKind::Transfer,
        id: id.to_string(),
    }
}

fn row_to_transfer(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transfer> {
    let id: String = row.get(0)?;
    let peer_id: String = row.get(1)?;
    let direction_raw: i64 = row.get(2)?;
    let created_at = timestamp_column(row, 3)?;

    let direction = Direction::from_i64(direction_raw).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(2, direction_raw)
    })?;

    Ok(Transfer {
        id: TransferId(id),
        peer_id: PeerId(peer_id),
        direction,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn db_with_peer() -> (Database, PeerId) {
        let db = Database::open_in_memory(StoreConfig::default()).unwrap();
        let peer = PeerId::from("peer-a");
        db.create_peer(&peer).unwrap();
        (db, peer)
    }

    #[test]
    fn unknown_peer_is_unknown_parent() {
        let (db, _) = db_with_peer();
        let err = db
            .create_transfer(&"t1".into(), &"ghost".into(), Direction::Outgoing)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnknownParent {
                kind: EntityKind::Peer,
                ..
            }
        ));
    }

    #[test]
    fn duplicate_transfer_is_rejected() {
        let (db, peer) = db_with_peer();
        let id = TransferId::from("t1");
        db.create_transfer(&id, &peer, Direction::Incoming).unwrap();
        let err = db.create_transfer(&id, &peer, Direction::Outgoing).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { .. }));

        // the first direction stands
        assert_eq!(db.get_transfer(&id).unwrap().direction, Direction::Incoming);
    }

    #[test]
    fn batch_create_is_all_or_nothing() {
        let (db, peer) = db_with_peer();
        let paths = vec![
            NewPath {
                path_id: "f1".into(),
                path: "a.txt".into(),
                bytes: 10,
            },
            NewPath {
                path_id: "f2".into(),
                path: "b.txt".into(),
                bytes: -5,
            },
        ];

        let err = db
            .create_transfer_with_paths(&"t1".into(), &peer, Direction::Outgoing, &paths)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidPayload(_)));
        assert!(matches!(
            db.get_transfer(&"t1".into()),
            Err(StoreError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn batch_create_rejects_repeated_path_ids() {
        let (db, peer) = db_with_peer();
        let file = NewPath {
            path_id: "f1".into(),
            path: "a.txt".into(),
            bytes: 1,
        };
        let err = db
            .create_transfer_with_paths(
                &"t1".into(),
                &peer,
                Direction::Incoming,
                &[file.clone(), file],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { .. }));
    }

    #[test]
    fn transfers_since_filters_by_creation() {
        let (db, peer) = db_with_peer();
        let first = db
            .create_transfer(&"t1".into(), &peer, Direction::Outgoing)
            .unwrap();
        let second = db
            .create_transfer(&"t2".into(), &peer, Direction::Outgoing)
            .unwrap();

        let all = db.list_transfers_since(first.created_at).unwrap();
        assert_eq!(all.len(), 2);

        let later = db.list_transfers_since(second.created_at).unwrap();
        assert_eq!(later, vec![second]);
    }
}
