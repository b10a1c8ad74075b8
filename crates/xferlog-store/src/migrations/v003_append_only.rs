//! v003 -- Reject UPDATE on every stage table.
//!
//! Stage rows are history. DELETE stays possible so that removing a peer
//! can cascade through its subtree.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TRIGGER IF NOT EXISTS transfer_active_states_append_only
    BEFORE UPDATE ON transfer_active_states
BEGIN
    SELECT RAISE(ABORT, 'transfer_active_states is append-only');
END;

CREATE TRIGGER IF NOT EXISTS transfer_cancel_states_append_only
    BEFORE UPDATE ON transfer_cancel_states
BEGIN
    SELECT RAISE(ABORT, 'transfer_cancel_states is append-only');
END;

CREATE TRIGGER IF NOT EXISTS transfer_failed_states_append_only
    BEFORE UPDATE ON transfer_failed_states
BEGIN
    SELECT RAISE(ABORT, 'transfer_failed_states is append-only');
END;

CREATE TRIGGER IF NOT EXISTS outgoing_path_pending_states_append_only
    BEFORE UPDATE ON outgoing_path_pending_states
BEGIN
    SELECT RAISE(ABORT, 'outgoing_path_pending_states is append-only');
END;

CREATE TRIGGER IF NOT EXISTS outgoing_path_started_states_append_only
    BEFORE UPDATE ON outgoing_path_started_states
BEGIN
    SELECT RAISE(ABORT, 'outgoing_path_started_states is append-only');
END;

CREATE TRIGGER IF NOT EXISTS outgoing_path_cancel_states_append_only
    BEFORE UPDATE ON outgoing_path_cancel_states
BEGIN
    SELECT RAISE(ABORT, 'outgoing_path_cancel_states is append-only');
END;

CREATE TRIGGER IF NOT EXISTS outgoing_path_failed_states_append_only
    BEFORE UPDATE ON outgoing_path_failed_states
BEGIN
    SELECT RAISE(ABORT, 'outgoing_path_failed_states is append-only');
END;

CREATE TRIGGER IF NOT EXISTS outgoing_path_completed_states_append_only
    BEFORE UPDATE ON outgoing_path_completed_states
BEGIN
    SELECT RAISE(ABORT, 'outgoing_path_completed_states is append-only');
END;

CREATE TRIGGER IF NOT EXISTS incoming_path_pending_states_append_only
    BEFORE UPDATE ON incoming_path_pending_states
BEGIN
    SELECT RAISE(ABORT, 'incoming_path_pending_states is append-only');
END;

CREATE TRIGGER IF NOT EXISTS incoming_path_started_states_append_only
    BEFORE UPDATE ON incoming_path_started_states
BEGIN
    SELECT RAISE(ABORT, 'incoming_path_started_states is append-only');
END;

CREATE TRIGGER IF NOT EXISTS incoming_path_cancel_states_append_only
    BEFORE UPDATE ON incoming_path_cancel_states
BEGIN
    SELECT RAISE(ABORT, 'incoming_path_cancel_states is append-only');
END;

CREATE TRIGGER IF NOT EXISTS incoming_path_failed_states_append_only
    BEFORE UPDATE ON incoming_path_failed_states
BEGIN
    SELECT RAISE(ABORT, 'incoming_path_failed_states is append-only');
END;

CREATE TRIGGER IF NOT EXISTS incoming_path_completed_states_append_only
    BEFORE UPDATE ON incoming_path_completed_states
BEGIN
    SELECT RAISE(ABORT, 'incoming_path_completed_states is append-only');
END;
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
