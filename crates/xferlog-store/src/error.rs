use thiserror::Error;

/// Class of entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Peer,
    Transfer,
    OutgoingPath,
    IncomingPath,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Peer => "peer",
            Self::Transfer => "transfer",
            Self::OutgoingPath => "outgoing path",
            Self::IncomingPath => "incoming path",
        })
    }
}

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error. Storage failures are fatal and never retried here.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A persisted or supplied timestamp could not be parsed.
    #[error("Timestamp parse error: {0}")]
    Timestamp(#[from] chrono::ParseError),

    /// An entity with this identifier already exists.
    #[error("{kind} {id} already exists")]
    DuplicateId { kind: EntityKind, id: String },

    /// The peer or transfer a new entity should hang off does not exist.
    #[error("parent {kind} {id} does not exist")]
    UnknownParent { kind: EntityKind, id: String },

    /// The entity an event or query refers to does not exist.
    #[error("{kind} {id} does not exist")]
    UnknownEntity { kind: EntityKind, id: String },

    /// Payload violates a structural constraint (negative byte count, ...).
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The proposed event is not legal from the entity's current state.
    #[error("illegal transition for {entity}: {from} -> {to} ({reason})")]
    IllegalTransition {
        entity: String,
        from: String,
        to: String,
        reason: String,
    },

    /// A byte counter went backwards in the recorded history.
    #[error("byte counter regressed for {entity}: {previous} -> {observed}")]
    RegressedCounter {
        entity: String,
        previous: i64,
        observed: i64,
    },

    /// A lock was poisoned by a panicking writer.
    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    /// The store clock ran past the representable timestamp range.
    #[error("Clock out of range: {0} ms")]
    ClockOutOfRange(i64),

    /// A blocking store task could not be joined.
    #[error("Store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// Whether the failure stems from the caller's request or recorded data
    /// rather than from storage, so the caller may pick another action and
    /// carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DuplicateId { .. }
                | Self::UnknownParent { .. }
                | Self::UnknownEntity { .. }
                | Self::InvalidPayload(_)
                | Self::IllegalTransition { .. }
                | Self::RegressedCounter { .. }
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
