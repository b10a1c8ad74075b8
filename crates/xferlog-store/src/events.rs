//! Append-only event log.
//!
//! One table per (entity kind x stage). Rows are only ever inserted; the
//! schema rejects UPDATE and only a peer removal deletes them. Every append
//! runs validate-then-insert under the entity's lock so two racing writers
//! cannot both see a non-terminal state and both record a terminal event.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use xferlog_shared::{Direction, TransferId};

use crate::clock::{format_timestamp, timestamp_column};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::guard::{check_path, check_transfer};
use crate::locks::EntityKey;
use crate::paths::{stored_path, EntityLookup};
use crate::reconstruct::{fold_path, fold_transfer, PathSnapshot};
use crate::stages::{PathEventRecord, PathStage, TransferEventRecord, TransferStage};
use crate::transfers::{transfer_row, unknown_transfer};

impl Database {
    /// Append a transfer event if the guard allows it.
    pub fn append_transfer_event(
        &self,
        transfer_id: &TransferId,
        stage: TransferStage,
    ) -> Result<TransferEventRecord> {
        let owner = self.peer_of(transfer_id, EntityLookup::Subject)?;
        let key = EntityKey::Transfer(transfer_id.clone());

        self.locks.with_entity(&owner, &key, || {
            let events = {
                let conn = self.conn()?;
                if transfer_row(&conn, transfer_id)?.is_none() {
                    return Err(unknown_transfer(transfer_id));
                }
                load_transfer_events(&conn, transfer_id)?
            };

            let current = fold_transfer(&events, self.config().terminal_policy).state;
            if let Err(rejection) = check_transfer(current, &stage) {
                tracing::warn!(%transfer_id, from = rejection.from, to = rejection.to, "transition rejected");
                return Err(rejection.into_error(format!("transfer {transfer_id}")));
            }

            let conn = self.conn()?;
            let record = insert_transfer_stage(&conn, transfer_id, &stage, self.timestamp()?)?;
            tracing::debug!(%transfer_id, stage = stage.name(), "transfer event appended");
            Ok(record)
        })
    }

    /// Append a path event if the guard allows it.
    pub fn append_path_event(
        &self,
        transfer_id: &TransferId,
        path_id: &str,
        stage: PathStage,
    ) -> Result<PathEventRecord> {
        self.append_path_event_with(transfer_id, path_id, |_| stage)
    }

    /// Append a path event whose payload depends on the path's current
    /// snapshot, e.g. a cancellation carrying the latest byte counter.
    /// `decide` runs under the path's lock.
    pub(crate) fn append_path_event_with(
        &self,
        transfer_id: &TransferId,
        path_id: &str,
        decide: impl FnOnce(&PathSnapshot) -> PathStage,
    ) -> Result<PathEventRecord> {
        let owner = self.peer_of(transfer_id, EntityLookup::Subject)?;
        let key = EntityKey::Path(transfer_id.clone(), path_id.to_string());

        self.locks.with_entity(&owner, &key, || {
            let (direction, stored, events) = {
                let conn = self.conn()?;
                let transfer = transfer_row(&conn, transfer_id)?.ok_or_else(|| unknown_transfer(transfer_id))?;
                let stored = stored_path(&conn, &transfer, path_id)?;
                let events = load_path_events(&conn, transfer.direction, stored.row_id)?;
                (transfer.direction, stored, events)
            };

            let snapshot = fold_path(&events, self.config().terminal_policy);
            let stage = decide(&snapshot);
            check_path_payload(direction, &stage)?;

            if let Err(rejection) = check_path(snapshot.state, &stage, stored.path.bytes) {
                tracing::warn!(
                    %transfer_id,
                    path_id,
                    from = rejection.from,
                    to = rejection.to,
                    reason = rejection.reason,
                    "transition rejected"
                );
                return Err(rejection.into_error(format!("path {transfer_id}/{path_id}")));
            }

            let conn = self.conn()?;
            let record = insert_path_stage(&conn, direction, stored.row_id, &stage, self.timestamp()?)?;
            tracing::debug!(
                %transfer_id,
                path_id,
                stage = stage.name(),
                bytes = stage.counter(),
                "path event appended"
            );
            Ok(record)
        })
    }
}

// ---------------------------------------------------------------------------
// Insert
// ---------------------------------------------------------------------------

/// `completed` carries a final path exactly for incoming files; counters are
/// never negative.
fn check_path_payload(direction: Direction, stage: &PathStage) -> Result<()> {
    stage.check_payload()?;

    if let PathStage::Completed { final_path } = stage {
        match (direction, final_path) {
            (Direction::Incoming, None) => {
                return Err(StoreError::InvalidPayload(
                    "incoming completion requires a final path".into(),
                ))
            }
            (Direction::Outgoing, Some(_)) => {
                return Err(StoreError::InvalidPayload(
                    "outgoing completion has no final path".into(),
                ))
            }
            _ => {}
        }
    }
    Ok(())
}

pub(crate) fn insert_transfer_stage(
    conn: &Connection,
    transfer_id: &TransferId,
    stage: &TransferStage,
    created_at: NaiveDateTime,
) -> Result<TransferEventRecord> {
    let ts = format_timestamp(&created_at);
    let id = transfer_id.as_str();

    match stage {
        TransferStage::Active => conn.execute(
            "INSERT INTO transfer_active_states (transfer_id, created_at) VALUES (?1, ?2)",
            params![id, ts],
        )?,
        TransferStage::Cancelled { by_peer } => conn.execute(
            "INSERT INTO transfer_cancel_states (transfer_id, by_peer, created_at) VALUES (?1, ?2, ?3)",
            params![id, by_peer, ts],
        )?,
        TransferStage::Failed { status_code } => conn.execute(
            "INSERT INTO transfer_failed_states (transfer_id, status_code, created_at) VALUES (?1, ?2, ?3)",
            params![id, status_code, ts],
        )?,
    };

    Ok(TransferEventRecord {
        stage: stage.clone(),
        created_at,
    })
}

pub(crate) fn insert_path_stage(
    conn: &Connection,
    direction: Direction,
    path_row: i64,
    stage: &PathStage,
    created_at: NaiveDateTime,
) -> Result<PathEventRecord> {
    check_path_payload(direction, stage)?;

    let prefix = table_prefix(direction);
    let counter = counter_column(direction);
    let ts = format_timestamp(&created_at);

    match stage {
        PathStage::Pending => conn.execute(
            &format!("INSERT INTO {prefix}_pending_states (path_id, created_at) VALUES (?1, ?2)"),
            params![path_row, ts],
        )?,
        PathStage::Started { bytes } => conn.execute(
            &format!("INSERT INTO {prefix}_started_states (path_id, {counter}, created_at) VALUES (?1, ?2, ?3)"),
            params![path_row, bytes, ts],
        )?,
        PathStage::Cancelled { by_peer, bytes } => conn.execute(
            &format!(
                "INSERT INTO {prefix}_cancel_states (path_id, by_peer, {counter}, created_at)
                 VALUES (?1, ?2, ?3, ?4)"
            ),
            params![path_row, by_peer, bytes, ts],
        )?,
        PathStage::Failed { status_code, bytes } => conn.execute(
            &format!(
                "INSERT INTO {prefix}_failed_states (path_id, status_code, {counter}, created_at)
                 VALUES (?1, ?2, ?3, ?4)"
            ),
            params![path_row, status_code, bytes, ts],
        )?,
        PathStage::Completed { final_path: None } => conn.execute(
            &format!("INSERT INTO {prefix}_completed_states (path_id, created_at) VALUES (?1, ?2)"),
            params![path_row, ts],
        )?,
        PathStage::Completed {
            final_path: Some(final_path),
        } => conn.execute(
            &format!(
                "INSERT INTO {prefix}_completed_states (path_id, final_path, created_at)
                 VALUES (?1, ?2, ?3)"
            ),
            params![path_row, final_path, ts],
        )?,
    };

    Ok(PathEventRecord {
        stage: stage.clone(),
        created_at,
    })
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

// Stage kinds as tagged in the UNION queries below. Also the tie-break when
// two rows share a timestamp.
const KIND_PENDING: i64 = 0;
const KIND_ACTIVE_OR_STARTED: i64 = 1;
const KIND_CANCELLED: i64 = 2;
const KIND_FAILED: i64 = 3;
const KIND_COMPLETED: i64 = 4;

/// Every event of a transfer across its stage tables, in arrival order.
pub(crate) fn load_transfer_events(
    conn: &Connection,
    transfer_id: &TransferId,
) -> Result<Vec<TransferEventRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {KIND_ACTIVE_OR_STARTED} AS kind, NULL AS detail, created_at, id
             FROM transfer_active_states WHERE transfer_id = ?1
         UNION ALL
         SELECT {KIND_CANCELLED}, by_peer, created_at, id
             FROM transfer_cancel_states WHERE transfer_id = ?1
         UNION ALL
         SELECT {KIND_FAILED}, status_code, created_at, id
             FROM transfer_failed_states WHERE transfer_id = ?1
         ORDER BY created_at ASC, kind ASC, id ASC"
    ))?;

    let rows = stmt.query_map(params![transfer_id.as_str()], |row| {
        let kind: i64 = row.get(0)?;
        let detail: Option<i64> = row.get(1)?;
        let created_at = timestamp_column(row, 2)?;

        let stage = match kind {
            KIND_CANCELLED => TransferStage::Cancelled {
                by_peer: detail.unwrap_or(0) != 0,
            },
            KIND_FAILED => TransferStage::Failed {
                status_code: status_code(detail, 1)?,
            },
            _ => TransferStage::Active,
        };
        Ok(TransferEventRecord { stage, created_at })
    })?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}

/// Every event of a path across its stage tables, in arrival order.
pub(crate) fn load_path_events(
    conn: &Connection,
    direction: Direction,
    path_row: i64,
) -> Result<Vec<PathEventRecord>> {
    let prefix = table_prefix(direction);
    let counter = counter_column(direction);
    let final_path = match direction {
        Direction::Incoming => "final_path",
        Direction::Outgoing => "NULL",
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT {KIND_PENDING} AS kind, NULL AS bytes, NULL AS detail, NULL AS final_path, created_at, id
             FROM {prefix}_pending_states WHERE path_id = ?1
         UNION ALL
         SELECT {KIND_ACTIVE_OR_STARTED}, {counter}, NULL, NULL, created_at, id
             FROM {prefix}_started_states WHERE path_id = ?1
         UNION ALL
         SELECT {KIND_CANCELLED}, {counter}, by_peer, NULL, created_at, id
             FROM {prefix}_cancel_states WHERE path_id = ?1
         UNION ALL
         SELECT {KIND_FAILED}, {counter}, status_code, NULL, created_at, id
             FROM {prefix}_failed_states WHERE path_id = ?1
         UNION ALL
         SELECT {KIND_COMPLETED}, NULL, NULL, {final_path}, created_at, id
             FROM {prefix}_completed_states WHERE path_id = ?1
         ORDER BY created_at ASC, kind ASC, id ASC"
    ))?;

    let rows = stmt.query_map(params![path_row], |row| {
        let kind: i64 = row.get(0)?;
        let bytes: Option<i64> = row.get(1)?;
        let detail: Option<i64> = row.get(2)?;
        let final_path: Option<String> = row.get(3)?;
        let created_at = timestamp_column(row, 4)?;
        let bytes = bytes.unwrap_or(0);

        let stage = match kind {
            KIND_ACTIVE_OR_STARTED => PathStage::Started { bytes },
            KIND_CANCELLED => PathStage::Cancelled {
                by_peer: detail.unwrap_or(0) != 0,
                bytes,
            },
            KIND_FAILED => PathStage::Failed {
                status_code: status_code(detail, 2)?,
                bytes,
            },
            KIND_COMPLETED => PathStage::Completed { final_path },
            _ => PathStage::Pending,
        };
        Ok(PathEventRecord { stage, created_at })
    })?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}

fn status_code(raw: Option<i64>, idx: usize) -> rusqlite::Result<u32> {
    let raw = raw.unwrap_or(0);
    u32::try_from(raw).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, raw))
}

fn table_prefix(direction: Direction) -> &'static str {
    match direction {
        Direction::Outgoing => "outgoing_path",
        Direction::Incoming => "incoming_path",
    }
}

fn counter_column(direction: Direction) -> &'static str {
    match direction {
        Direction::Outgoing => "bytes_sent",
        Direction::Incoming => "bytes_received",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::stages::PathState;

    fn db_with_path(direction: Direction, bytes: i64) -> (Database, TransferId) {
        let db = Database::open_in_memory(StoreConfig::default()).unwrap();
        db.create_peer(&"peer-a".into()).unwrap();
        let t = TransferId::from("t1");
        db.create_transfer(&t, &"peer-a".into(), direction).unwrap();
        match direction {
            Direction::Outgoing => db.create_outgoing_path(&t, "a.bin", "f1", bytes).unwrap(),
            Direction::Incoming => db.create_incoming_path(&t, "a.bin", "f1", bytes).unwrap(),
        };
        (db, t)
    }

    #[test]
    fn unknown_entities_are_reported() {
        let (db, t) = db_with_path(Direction::Outgoing, 10);
        assert!(matches!(
            db.append_transfer_event(&"nope".into(), TransferStage::Active),
            Err(StoreError::UnknownEntity { .. })
        ));
        assert!(matches!(
            db.append_path_event(&t, "nope", PathStage::Pending),
            Err(StoreError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn negative_counter_is_invalid_payload() {
        let (db, t) = db_with_path(Direction::Outgoing, 10);
        db.append_path_event(&t, "f1", PathStage::Pending).unwrap();
        let err = db
            .append_path_event(&t, "f1", PathStage::Started { bytes: -3 })
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidPayload(_)));
    }

    #[test]
    fn incoming_completion_needs_final_path() {
        let (db, t) = db_with_path(Direction::Incoming, 0);
        db.append_path_event(&t, "f1", PathStage::Pending).unwrap();

        let err = db
            .append_path_event(&t, "f1", PathStage::Completed { final_path: None })
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidPayload(_)));

        db.append_path_event(
            &t,
            "f1",
            PathStage::Completed {
                final_path: Some("/tmp/a.bin".into()),
            },
        )
        .unwrap();
        let snapshot = db.path_state(&t, "f1").unwrap();
        assert_eq!(snapshot.state, PathState::Completed);
        assert_eq!(snapshot.final_path.as_deref(), Some("/tmp/a.bin"));
    }

    #[test]
    fn stages_round_trip_through_their_tables() {
        let (db, t) = db_with_path(Direction::Incoming, 100);
        let appended = vec![
            db.append_path_event(&t, "f1", PathStage::Pending).unwrap(),
            db.append_path_event(&t, "f1", PathStage::Started { bytes: 10 }).unwrap(),
            db.append_path_event(
                &t,
                "f1",
                PathStage::Failed {
                    status_code: 42,
                    bytes: 20,
                },
            )
            .unwrap(),
            db.append_path_event(&t, "f1", PathStage::Started { bytes: 20 }).unwrap(),
        ];

        let conn = db.conn().unwrap();
        let transfer = transfer_row(&conn, &t).unwrap().unwrap();
        let stored = stored_path(&conn, &transfer, "f1").unwrap();
        let loaded = load_path_events(&conn, Direction::Incoming, stored.row_id).unwrap();
        assert_eq!(loaded, appended);
    }

    #[test]
    fn rejected_append_writes_nothing() {
        let (db, t) = db_with_path(Direction::Outgoing, 10);
        db.append_transfer_event(&t, TransferStage::Cancelled { by_peer: true })
            .unwrap();
        let err = db
            .append_transfer_event(&t, TransferStage::Failed { status_code: 1 })
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));

        let conn = db.conn().unwrap();
        assert_eq!(load_transfer_events(&conn, &t).unwrap().len(), 1);
    }
}
