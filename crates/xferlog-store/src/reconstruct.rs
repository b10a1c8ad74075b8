//! State reconstruction.
//!
//! Current state is a pure fold over an entity's arrival-ordered event log.
//! Terminal events take precedence over non-terminal ones regardless of
//! order: a stale `started` that lands after a `cancelled` does not revive
//! the path. Among several terminal events the [`TerminalPolicy`] picks one.
//! Without any terminal event the latest non-terminal event decides.

use chrono::NaiveDateTime;
use serde::Serialize;
use xferlog_shared::TransferId;

use crate::config::TerminalPolicy;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::events::{load_path_events, load_transfer_events};
use crate::paths::stored_path;
use crate::stages::{PathEventRecord, PathStage, PathState, TransferEventRecord, TransferState};
use crate::transfers::{transfer_row, unknown_transfer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferSnapshot {
    pub state: TransferState,
    /// The event that determined `state`.
    pub deciding: Option<TransferEventRecord>,
}

/// A byte counter observed lower than the one recorded just before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterRegression {
    pub previous: i64,
    pub observed: i64,
    pub at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathSnapshot {
    pub state: PathState,
    /// Counter of the most recent event carrying one; 0 if none did.
    pub bytes: i64,
    /// Where an incoming file landed, once completed.
    pub final_path: Option<String>,
    pub deciding: Option<PathEventRecord>,
    /// Integrity anomalies. The snapshot is still a best-effort answer.
    pub regressions: Vec<CounterRegression>,
}

impl PathSnapshot {
    pub fn is_consistent(&self) -> bool {
        self.regressions.is_empty()
    }
}

pub fn fold_transfer(events: &[TransferEventRecord], policy: TerminalPolicy) -> TransferSnapshot {
    let deciding = decide(events, |e| e.stage.is_terminal(), policy).cloned();

    TransferSnapshot {
        state: deciding
            .as_ref()
            .map_or(TransferState::Unrecorded, |e| e.stage.state()),
        deciding,
    }
}

pub fn fold_path(events: &[PathEventRecord], policy: TerminalPolicy) -> PathSnapshot {
    let deciding = decide(events, |e| e.stage.is_terminal(), policy).cloned();

    let mut previous: Option<i64> = None;
    let mut regressions = Vec::new();
    for event in events {
        let Some(observed) = event.stage.counter() else {
            continue;
        };
        if let Some(previous) = previous.filter(|p| observed < *p) {
            regressions.push(CounterRegression {
                previous,
                observed,
                at: event.created_at,
            });
        }
        previous = Some(observed);
    }

    let final_path = match deciding.as_ref().map(|e| &e.stage) {
        Some(PathStage::Completed { final_path }) => final_path.clone(),
        _ => None,
    };

    PathSnapshot {
        state: deciding
            .as_ref()
            .map_or(PathState::Unrecorded, |e| e.stage.state()),
        bytes: previous.unwrap_or(0),
        final_path,
        deciding,
        regressions,
    }
}

fn decide<E>(events: &[E], is_terminal: impl Fn(&E) -> bool, policy: TerminalPolicy) -> Option<&E> {
    let mut terminal = None;
    let mut latest_live = None;

    for event in events {
        if is_terminal(event) {
            if terminal.is_none() || policy == TerminalPolicy::LastWins {
                terminal = Some(event);
            }
        } else {
            latest_live = Some(event);
        }
    }

    terminal.or(latest_live)
}

impl Database {
    /// Current state of a transfer, derived from its event log.
    pub fn transfer_state(&self, transfer_id: &TransferId) -> Result<TransferSnapshot> {
        let events = {
            let conn = self.conn()?;
            if transfer_row(&conn, transfer_id)?.is_none() {
                return Err(unknown_transfer(transfer_id));
            }
            load_transfer_events(&conn, transfer_id)?
        };
        Ok(fold_transfer(&events, self.config().terminal_policy))
    }

    /// Current state and byte progress of a path, derived from its event log.
    ///
    /// Counter regressions are logged and reported on the snapshot rather
    /// than failing the read.
    pub fn path_state(&self, transfer_id: &TransferId, path_id: &str) -> Result<PathSnapshot> {
        let events = {
            let conn = self.conn()?;
            let transfer = transfer_row(&conn, transfer_id)?.ok_or_else(|| unknown_transfer(transfer_id))?;
            let stored = stored_path(&conn, &transfer, path_id)?;
            load_path_events(&conn, transfer.direction, stored.row_id)?
        };

        let snapshot = fold_path(&events, self.config().terminal_policy);
        for regression in &snapshot.regressions {
            tracing::warn!(
                %transfer_id,
                path_id,
                previous = regression.previous,
                observed = regression.observed,
                at = %regression.at,
                "byte counter regressed"
            );
        }
        Ok(snapshot)
    }

    /// Like [`Database::path_state`], but a counter regression is an error.
    pub fn checked_path_state(&self, transfer_id: &TransferId, path_id: &str) -> Result<PathSnapshot> {
        let snapshot = self.path_state(transfer_id, path_id)?;
        match snapshot.regressions.first() {
            None => Ok(snapshot),
            Some(regression) => Err(StoreError::RegressedCounter {
                entity: format!("path {transfer_id}/{path_id}"),
                previous: regression.previous,
                observed: regression.observed,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::parse_timestamp;
    use crate::stages::TransferStage;

    fn at(ms: u32) -> NaiveDateTime {
        parse_timestamp(&format!("2024-05-01 12:00:00.{ms:03}")).unwrap()
    }

    fn path_log(stages: Vec<PathStage>) -> Vec<PathEventRecord> {
        stages
            .into_iter()
            .enumerate()
            .map(|(i, stage)| PathEventRecord {
                stage,
                created_at: at(i as u32),
            })
            .collect()
    }

    fn transfer_log(stages: Vec<TransferStage>) -> Vec<TransferEventRecord> {
        stages
            .into_iter()
            .enumerate()
            .map(|(i, stage)| TransferEventRecord {
                stage,
                created_at: at(i as u32),
            })
            .collect()
    }

    #[test]
    fn empty_log_is_unrecorded() {
        let snapshot = fold_path(&[], TerminalPolicy::FirstWins);
        assert_eq!(snapshot.state, PathState::Unrecorded);
        assert_eq!(snapshot.bytes, 0);
        assert!(snapshot.deciding.is_none());
    }

    #[test]
    fn stale_started_does_not_revive_cancelled_path() {
        let log = path_log(vec![
            PathStage::Pending,
            PathStage::Started { bytes: 10 },
            PathStage::Cancelled {
                by_peer: true,
                bytes: 40,
            },
            PathStage::Started { bytes: 40 },
        ]);

        let snapshot = fold_path(&log, TerminalPolicy::FirstWins);
        assert_eq!(snapshot.state, PathState::Cancelled);
        assert_eq!(snapshot.bytes, 40);
        assert_eq!(snapshot.deciding.unwrap().created_at, at(2));
    }

    #[test]
    fn latest_non_terminal_decides_without_terminal() {
        let log = path_log(vec![PathStage::Pending, PathStage::Started { bytes: 0 }]);
        assert_eq!(fold_path(&log, TerminalPolicy::FirstWins).state, PathState::Started);
    }

    #[test]
    fn first_terminal_wins_by_default() {
        let log = transfer_log(vec![
            TransferStage::Active,
            TransferStage::Failed { status_code: 12 },
            TransferStage::Cancelled { by_peer: false },
        ]);

        let first = fold_transfer(&log, TerminalPolicy::FirstWins);
        assert_eq!(first.state, TransferState::Failed);

        let last = fold_transfer(&log, TerminalPolicy::LastWins);
        assert_eq!(last.state, TransferState::Cancelled);
    }

    #[test]
    fn regressed_counter_is_reported_not_fatal() {
        let log = path_log(vec![
            PathStage::Pending,
            PathStage::Started { bytes: 100 },
            PathStage::Started { bytes: 50 },
        ]);

        let snapshot = fold_path(&log, TerminalPolicy::FirstWins);
        assert_eq!(snapshot.state, PathState::Started);
        assert_eq!(snapshot.bytes, 50);
        assert_eq!(
            snapshot.regressions,
            vec![CounterRegression {
                previous: 100,
                observed: 50,
                at: at(2),
            }]
        );
        assert!(!snapshot.is_consistent());
    }

    #[test]
    fn completed_incoming_exposes_final_path() {
        let log = path_log(vec![
            PathStage::Pending,
            PathStage::Started { bytes: 5 },
            PathStage::Completed {
                final_path: Some("/downloads/a (1).txt".into()),
            },
        ]);

        let snapshot = fold_path(&log, TerminalPolicy::FirstWins);
        assert_eq!(snapshot.state, PathState::Completed);
        assert_eq!(snapshot.final_path.as_deref(), Some("/downloads/a (1).txt"));
        assert_eq!(snapshot.bytes, 5);
    }

    #[test]
    fn fold_is_deterministic() {
        let log = path_log(vec![
            PathStage::Pending,
            PathStage::Started { bytes: 1 },
            PathStage::Failed {
                status_code: 3,
                bytes: 2,
            },
        ]);
        assert_eq!(
            fold_path(&log, TerminalPolicy::FirstWins),
            fold_path(&log, TerminalPolicy::FirstWins)
        );
    }
}
