use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_transfers_peer       ON transfers(peer_id);
CREATE INDEX IF NOT EXISTS idx_transfers_created_at ON transfers(created_at);

CREATE INDEX IF NOT EXISTS idx_outgoing_paths_transfer ON outgoing_paths(transfer_id);
CREATE INDEX IF NOT EXISTS idx_incoming_paths_transfer ON incoming_paths(transfer_id);

CREATE INDEX IF NOT EXISTS idx_transfer_active_transfer ON transfer_active_states(transfer_id);
CREATE INDEX IF NOT EXISTS idx_transfer_cancel_transfer ON transfer_cancel_states(transfer_id);
CREATE INDEX IF NOT EXISTS idx_transfer_failed_transfer ON transfer_failed_states(transfer_id);

CREATE INDEX IF NOT EXISTS idx_out_pending_path   ON outgoing_path_pending_states(path_id);
CREATE INDEX IF NOT EXISTS idx_out_started_path   ON outgoing_path_started_states(path_id);
CREATE INDEX IF NOT EXISTS idx_out_cancel_path    ON outgoing_path_cancel_states(path_id);
CREATE INDEX IF NOT EXISTS idx_out_failed_path    ON outgoing_path_failed_states(path_id);
CREATE INDEX IF NOT EXISTS idx_out_completed_path ON outgoing_path_completed_states(path_id);

CREATE INDEX IF NOT EXISTS idx_in_pending_path   ON incoming_path_pending_states(path_id);
CREATE INDEX IF NOT EXISTS idx_in_started_path   ON incoming_path_started_states(path_id);
CREATE INDEX IF NOT EXISTS idx_in_cancel_path    ON incoming_path_cancel_states(path_id);
CREATE INDEX IF NOT EXISTS idx_in_failed_path    ON incoming_path_failed_states(path_id);
CREATE INDEX IF NOT EXISTS idx_in_completed_path ON incoming_path_completed_states(path_id);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
