//! v001 -- Initial schema creation.
//!
//! Four identity tables (`peers`, `transfers`, `outgoing_paths`,
//! `incoming_paths`) and one append-only table per lifecycle stage:
//! three for transfers, five for each path direction.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Identity
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS peers (
    id         TEXT PRIMARY KEY NOT NULL,
    created_at TEXT NOT NULL                  -- naive UTC, millisecond precision
);

CREATE TABLE IF NOT EXISTS transfers (
    id         TEXT PRIMARY KEY NOT NULL,
    peer_id    TEXT NOT NULL,
    direction  INTEGER NOT NULL CHECK (direction IN (0, 1)),   -- 0 incoming, 1 outgoing
    created_at TEXT NOT NULL,

    FOREIGN KEY (peer_id) REFERENCES peers(id) ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE IF NOT EXISTS outgoing_paths (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    transfer_id TEXT NOT NULL,
    path_id     TEXT NOT NULL,                -- stable within the transfer
    path        TEXT NOT NULL,
    bytes       INTEGER NOT NULL CHECK (bytes >= 0),
    created_at  TEXT NOT NULL,

    UNIQUE (transfer_id, path_id),
    FOREIGN KEY (transfer_id) REFERENCES transfers(id) ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE IF NOT EXISTS incoming_paths (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    transfer_id TEXT NOT NULL,
    path_id     TEXT NOT NULL,
    path        TEXT NOT NULL,
    bytes       INTEGER NOT NULL CHECK (bytes >= 0),
    created_at  TEXT NOT NULL,

    UNIQUE (transfer_id, path_id),
    FOREIGN KEY (transfer_id) REFERENCES transfers(id) ON DELETE CASCADE ON UPDATE CASCADE
);

-- ----------------------------------------------------------------
-- Transfer stages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS transfer_active_states (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    transfer_id TEXT NOT NULL,
    created_at  TEXT NOT NULL,

    FOREIGN KEY (transfer_id) REFERENCES transfers(id) ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE IF NOT EXISTS transfer_cancel_states (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    transfer_id TEXT NOT NULL,
    by_peer     INTEGER NOT NULL CHECK (by_peer IN (0, 1)),
    created_at  TEXT NOT NULL,

    FOREIGN KEY (transfer_id) REFERENCES transfers(id) ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE IF NOT EXISTS transfer_failed_states (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    transfer_id TEXT NOT NULL,
    status_code INTEGER NOT NULL,
    created_at  TEXT NOT NULL,

    FOREIGN KEY (transfer_id) REFERENCES transfers(id) ON DELETE CASCADE ON UPDATE CASCADE
);

-- ----------------------------------------------------------------
-- Outgoing path stages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS outgoing_path_pending_states (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    path_id    INTEGER NOT NULL,              -- FK -> outgoing_paths(id)
    created_at TEXT NOT NULL,

    FOREIGN KEY (path_id) REFERENCES outgoing_paths(id) ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE IF NOT EXISTS outgoing_path_started_states (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    path_id    INTEGER NOT NULL,
    bytes_sent INTEGER NOT NULL CHECK (bytes_sent >= 0),
    created_at TEXT NOT NULL,

    FOREIGN KEY (path_id) REFERENCES outgoing_paths(id) ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE IF NOT EXISTS outgoing_path_cancel_states (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    path_id    INTEGER NOT NULL,
    by_peer    INTEGER NOT NULL CHECK (by_peer IN (0, 1)),
    bytes_sent INTEGER NOT NULL CHECK (bytes_sent >= 0),
    created_at TEXT NOT NULL,

    FOREIGN KEY (path_id) REFERENCES outgoing_paths(id) ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE IF NOT EXISTS outgoing_path_failed_states (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    path_id     INTEGER NOT NULL,
    status_code INTEGER NOT NULL,
    bytes_sent  INTEGER NOT NULL CHECK (bytes_sent >= 0),
    created_at  TEXT NOT NULL,

    FOREIGN KEY (path_id) REFERENCES outgoing_paths(id) ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE IF NOT EXISTS outgoing_path_completed_states (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    path_id    INTEGER NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (path_id) REFERENCES outgoing_paths(id) ON DELETE CASCADE ON UPDATE CASCADE
);

-- ----------------------------------------------------------------
-- Incoming path stages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS incoming_path_pending_states (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    path_id    INTEGER NOT NULL,              -- FK -> incoming_paths(id)
    created_at TEXT NOT NULL,

    FOREIGN KEY (path_id) REFERENCES incoming_paths(id) ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE IF NOT EXISTS incoming_path_started_states (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    path_id        INTEGER NOT NULL,
    bytes_received INTEGER NOT NULL CHECK (bytes_received >= 0),
    created_at     TEXT NOT NULL,

    FOREIGN KEY (path_id) REFERENCES incoming_paths(id) ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE IF NOT EXISTS incoming_path_cancel_states (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    path_id        INTEGER NOT NULL,
    by_peer        INTEGER NOT NULL CHECK (by_peer IN (0, 1)),
    bytes_received INTEGER NOT NULL CHECK (bytes_received >= 0),
    created_at     TEXT NOT NULL,

    FOREIGN KEY (path_id) REFERENCES incoming_paths(id) ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE IF NOT EXISTS incoming_path_failed_states (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    path_id        INTEGER NOT NULL,
    status_code    INTEGER NOT NULL,
    bytes_received INTEGER NOT NULL CHECK (bytes_received >= 0),
    created_at     TEXT NOT NULL,

    FOREIGN KEY (path_id) REFERENCES incoming_paths(id) ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE IF NOT EXISTS incoming_path_completed_states (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    path_id    INTEGER NOT NULL,
    final_path TEXT NOT NULL,                 -- where the file landed on disk
    created_at TEXT NOT NULL,

    FOREIGN KEY (path_id) REFERENCES incoming_paths(id) ON DELETE CASCADE ON UPDATE CASCADE
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
