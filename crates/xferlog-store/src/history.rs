//! Full-history queries for audit and crash diagnosis.

use chrono::NaiveDateTime;
use serde::Serialize;
use xferlog_shared::TransferId;

use crate::database::Database;
use crate::error::Result;
use crate::events::{load_path_events, load_transfer_events};
use crate::models::{Transfer, TransferPath};
use crate::paths::{stored_path, stored_paths};
use crate::reconstruct::{fold_path, fold_transfer, PathSnapshot, TransferSnapshot};
use crate::stages::{PathEventRecord, TransferEventRecord};
use crate::transfers::{transfer_row, unknown_transfer};

/// A transfer with its complete history and derived state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferDump {
    pub transfer: Transfer,
    pub state: TransferSnapshot,
    pub events: Vec<TransferEventRecord>,
    pub paths: Vec<PathDump>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathDump {
    pub path: TransferPath,
    pub state: PathSnapshot,
    pub events: Vec<PathEventRecord>,
}

impl Database {
    /// Every event of a transfer, in arrival order.
    pub fn transfer_history(&self, transfer_id: &TransferId) -> Result<Vec<TransferEventRecord>> {
        let conn = self.conn()?;
        if transfer_row(&conn, transfer_id)?.is_none() {
            return Err(unknown_transfer(transfer_id));
        }
        load_transfer_events(&conn, transfer_id)
    }

    /// Every event of a path, in arrival order.
    pub fn path_history(&self, transfer_id: &TransferId, path_id: &str) -> Result<Vec<PathEventRecord>> {
        let conn = self.conn()?;
        let transfer = transfer_row(&conn, transfer_id)?.ok_or_else(|| unknown_transfer(transfer_id))?;
        let stored = stored_path(&conn, &transfer, path_id)?;
        load_path_events(&conn, transfer.direction, stored.row_id)
    }

    /// A transfer, its paths, all their events and derived states, read as
    /// one consistent snapshot.
    pub fn transfer_dump(&self, transfer_id: &TransferId) -> Result<TransferDump> {
        let conn = self.conn()?;
        let transfer = transfer_row(&conn, transfer_id)?.ok_or_else(|| unknown_transfer(transfer_id))?;
        self.dump_with(&conn, transfer)
    }

    /// Dumps of every transfer created at or after `since`, oldest first.
    pub fn transfers_since(&self, since: NaiveDateTime) -> Result<Vec<TransferDump>> {
        let transfers = self.list_transfers_since(since)?;

        let conn = self.conn()?;
        let mut dumps = Vec::with_capacity(transfers.len());
        for transfer in transfers {
            // removed in between; skip rather than fail the whole listing
            if transfer_row(&conn, &transfer.id)?.is_none() {
                continue;
            }
            dumps.push(self.dump_with(&conn, transfer)?);
        }
        Ok(dumps)
    }

    fn dump_with(&self, conn: &rusqlite::Connection, transfer: Transfer) -> Result<TransferDump> {
        let policy = self.config().terminal_policy;

        let events = load_transfer_events(conn, &transfer.id)?;
        let state = fold_transfer(&events, policy);

        let mut paths = Vec::new();
        for stored in stored_paths(conn, transfer.direction, &transfer.id)? {
            let events = load_path_events(conn, transfer.direction, stored.row_id)?;
            let state = fold_path(&events, policy);
            if !state.is_consistent() {
                tracing::warn!(
                    transfer_id = %transfer.id,
                    path_id = %stored.path.path_id,
                    regressions = state.regressions.len(),
                    "byte counter regressed"
                );
            }
            paths.push(PathDump {
                path: stored.path,
                state,
                events,
            });
        }

        Ok(TransferDump {
            transfer,
            state,
            events,
            paths,
        })
    }
}
