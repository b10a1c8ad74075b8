//! Transition guard.
//!
//! Storage has no idea what a transfer is, so legality is decided here,
//! against the reconstructed state, before anything is appended.
//!
//! Paths: `pending` only as the first event; `started` never after
//! `completed`; `cancelled`/`failed` from any non-terminal state;
//! `completed` from `started`, or from `pending` when the file is empty.
//! Transfers: `cancelled`/`failed` from any non-terminal state.

use xferlog_shared::TransferId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::stages::{PathStage, PathState, TransferStage, TransferState};

/// Why a proposed event was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub from: &'static str,
    pub to: &'static str,
    pub reason: &'static str,
}

impl Rejection {
    pub(crate) fn into_error(self, entity: String) -> StoreError {
        StoreError::IllegalTransition {
            entity,
            from: self.from.to_string(),
            to: self.to.to_string(),
            reason: self.reason.to_string(),
        }
    }
}

pub fn check_transfer(current: TransferState, proposed: &TransferStage) -> std::result::Result<(), Rejection> {
    let reject = |reason| {
        Err(Rejection {
            from: current.as_str(),
            to: proposed.name(),
            reason,
        })
    };

    match proposed {
        // reconnects record `active` again; after a terminal event it is noise
        TransferStage::Active => Ok(()),
        TransferStage::Cancelled { .. } | TransferStage::Failed { .. } => {
            if current.is_terminal() {
                reject("transfer already ended")
            } else {
                Ok(())
            }
        }
    }
}

pub fn check_path(
    current: PathState,
    proposed: &PathStage,
    declared_bytes: i64,
) -> std::result::Result<(), Rejection> {
    let reject = |reason| {
        Err(Rejection {
            from: current.as_str(),
            to: proposed.name(),
            reason,
        })
    };

    match proposed {
        PathStage::Pending => match current {
            PathState::Unrecorded => Ok(()),
            _ => reject("pending cannot be re-entered"),
        },
        PathStage::Started { .. } => match current {
            PathState::Unrecorded => reject("path was never pending"),
            PathState::Completed => reject("completed is absorbing"),
            _ => Ok(()),
        },
        PathStage::Cancelled { .. } | PathStage::Failed { .. } => {
            if current.is_terminal() {
                reject("path already ended")
            } else {
                Ok(())
            }
        }
        PathStage::Completed { .. } => match current {
            PathState::Started => Ok(()),
            PathState::Pending if declared_bytes == 0 => Ok(()),
            PathState::Pending => reject("non-empty file completed without starting"),
            _ => reject("completed requires a started path"),
        },
    }
}

impl Database {
    /// Would appending `proposed` to this transfer be legal right now?
    ///
    /// Advisory only: the answer can be stale by the time a separate append
    /// runs. Appends re-check under the entity lock.
    pub fn validate_transfer_event(&self, transfer_id: &TransferId, proposed: &TransferStage) -> Result<()> {
        let snapshot = self.transfer_state(transfer_id)?;
        check_transfer(snapshot.state, proposed)
            .map_err(|r| r.into_error(format!("transfer {transfer_id}")))
    }

    /// Would appending `proposed` to this path be legal right now?
    pub fn validate_path_event(
        &self,
        transfer_id: &TransferId,
        path_id: &str,
        proposed: &PathStage,
    ) -> Result<()> {
        let declared = self.get_path(transfer_id, path_id)?.bytes;
        let snapshot = self.path_state(transfer_id, path_id)?;
        check_path(snapshot.state, proposed, declared)
            .map_err(|r| r.into_error(format!("path {transfer_id}/{path_id}")))
    }
}
