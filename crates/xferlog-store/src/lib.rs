//! # xferlog-store
//!
//! Durable, event-sourced history of peer-to-peer file transfers, backed by
//! SQLite.
//!
//! Identity rows (peers, transfers, paths) are written once. Lifecycle is
//! recorded as immutable events in one append-only table per stage, and the
//! current state of any transfer or path is folded from that log on demand.
//! Appends pass a transition guard under a per-entity lock, so concurrent
//! writers cannot record conflicting terminal events.

pub mod clock;
pub mod config;
pub mod database;
pub mod events;
pub mod guard;
pub mod handle;
pub mod history;
pub mod ingest;
pub mod migrations;
pub mod models;
pub mod paths;
pub mod peers;
pub mod reconstruct;
pub mod stages;
pub mod transfers;

mod error;
mod locks;

pub use config::{StoreConfig, TerminalPolicy};
pub use database::Database;
pub use error::{EntityKind, Result, StoreError};
pub use handle::DatabaseHandle;
pub use history::{PathDump, TransferDump};
pub use models::*;
pub use reconstruct::{CounterRegression, PathSnapshot, TransferSnapshot};
pub use stages::{PathEventRecord, PathStage, PathState, TransferEventRecord, TransferStage, TransferState};
pub use xferlog_shared::{Direction, EngineEvent, PeerId, TransferId};
