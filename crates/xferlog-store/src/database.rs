//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation. It is `Send + Sync`: the
//! connection sits behind a mutex that is held only per statement batch,
//! while guarded read-decide-append sequences are serialized per entity by
//! [`crate::locks`].

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;
use directories::ProjectDirs;
use rusqlite::{Connection, OptionalExtension};
use xferlog_shared::constants::{APP_NAME, DB_FILE_NAME};

use crate::clock::{parse_timestamp, Clock};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::locks::EntityLocks;
use crate::migrations;

/// Every table carrying a store-assigned `created_at`.
pub(crate) const TIMESTAMPED_TABLES: [&str; 17] = [
    "peers",
    "transfers",
    "outgoing_paths",
    "incoming_paths",
    "transfer_active_states",
    "transfer_cancel_states",
    "transfer_failed_states",
    "outgoing_path_pending_states",
    "outgoing_path_started_states",
    "outgoing_path_cancel_states",
    "outgoing_path_failed_states",
    "outgoing_path_completed_states",
    "incoming_path_pending_states",
    "incoming_path_started_states",
    "incoming_path_cancel_states",
    "incoming_path_failed_states",
    "incoming_path_completed_states",
];

pub struct Database {
    conn: Mutex<Connection>,
    pub(crate) locks: EntityLocks,
    clock: Clock,
    config: StoreConfig,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) the database named by `config.storage_path`, or the
    /// default application database when no path is configured.
    ///
    /// The default file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/xferlog/xferlog.db`
    /// - macOS:   `~/Library/Application Support/com.xferlog.xferlog/xferlog.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\xferlog\xferlog\data\xferlog.db`
    pub fn new(config: StoreConfig) -> Result<Self> {
        let db_path = match &config.storage_path {
            Some(path) => path.clone(),
            None => {
                let project_dirs = ProjectDirs::from("com", APP_NAME, APP_NAME)
                    .ok_or(StoreError::NoDataDir)?;
                let data_dir = project_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                data_dir.join(DB_FILE_NAME)
            }
        };

        Self::open_at(&db_path, config)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path, config: StoreConfig) -> Result<Self> {
        tracing::info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::init(conn, config)
    }

    /// Open a private in-memory database. Nothing survives the handle.
    pub fn open_in_memory(config: StoreConfig) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, config)
    }

    fn init(mut conn: Connection, config: StoreConfig) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run_migrations(&mut conn)?;

        let latest = latest_timestamp(&conn)?;
        let path = conn.path().filter(|p| !p.is_empty()).map(PathBuf::from);

        Ok(Self {
            conn: Mutex::new(conn),
            locks: EntityLocks::default(),
            clock: Clock::resume_from(latest),
            config,
            path,
        })
    }

    /// Lock the underlying connection for one statement batch.
    ///
    /// Never hold the returned guard while acquiring an entity lock.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::LockPoisoned("connection"))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.path.clone()
    }

    /// Next store-assigned timestamp. Call while holding the connection so
    /// that timestamp order and insertion order agree.
    pub(crate) fn timestamp(&self) -> Result<NaiveDateTime> {
        self.clock.now()
    }
}

/// Newest `created_at` across every table, so a reopened store's clock
/// continues after what is already on disk.
fn latest_timestamp(conn: &Connection) -> Result<Option<NaiveDateTime>> {
    let union = TIMESTAMPED_TABLES
        .iter()
        .map(|t| format!("SELECT MAX(created_at) AS ts FROM {t}"))
        .collect::<Vec<_>>()
        .join(" UNION ALL ");
    let sql = format!("SELECT MAX(ts) FROM ({union})");

    let latest: Option<String> = conn
        .query_row(&sql, [], |row| row.get(0))
        .optional()?
        .flatten();

    latest
        .map(|s| parse_timestamp(&s))
        .transpose()
        .map_err(StoreError::from)
}
