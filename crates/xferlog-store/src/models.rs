//! Identity rows. Created once, never updated.
//!
//! Every struct derives `Serialize` so it can be dumped for audit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use xferlog_shared::{Direction, PeerId, TransferId};

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

/// A remote party we have exchanged transfers with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Peer {
    pub id: PeerId,
    /// First contact.
    pub created_at: NaiveDateTime,
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

/// A batch transfer negotiated with a peer. Its logical state is not stored
/// here; see [`crate::reconstruct`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transfer {
    pub id: TransferId,
    pub peer_id: PeerId,
    pub direction: Direction,
    pub created_at: NaiveDateTime,
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// One file of a transfer. Lives in `outgoing_paths` or `incoming_paths`
/// depending on `direction`, which always equals its transfer's direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferPath {
    pub transfer_id: TransferId,
    /// Stable identifier, unique within the transfer, survives renames.
    pub path_id: String,
    /// Path as the application names it.
    pub path: String,
    /// Declared total size in bytes.
    pub bytes: i64,
    pub direction: Direction,
    pub created_at: NaiveDateTime,
}

/// Input for creating a path alongside its transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPath {
    pub path_id: String,
    pub path: String,
    pub bytes: i64,
}

impl From<&xferlog_shared::FileInfo> for NewPath {
    fn from(file: &xferlog_shared::FileInfo) -> Self {
        Self {
            path_id: file.path_id.clone(),
            path: file.path.clone(),
            bytes: file.bytes,
        }
    }
}
