//! Notifications emitted by the transfer engine.
//!
//! The engine decides *when* something happened; the store decides whether
//! the resulting transition is legal and records it.

use serde::{Deserialize, Serialize};

use crate::types::{Direction, PeerId, TransferId};

/// One file offered in a transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileInfo {
    /// Stable file identifier, unique within its transfer.
    pub path_id: String,
    /// Path as the application names it (relative, not the final on-disk path).
    pub path: String,
    /// Declared size in bytes.
    pub bytes: i64,
}

/// A newly negotiated transfer and its file list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferInfo {
    pub id: TransferId,
    pub peer: PeerId,
    pub files: Vec<FileInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A transfer was negotiated and is waiting for its files to start.
    Pending {
        direction: Direction,
        transfer: TransferInfo,
    },
    FileStarted {
        transfer_id: TransferId,
        path_id: String,
    },
    /// Cumulative bytes moved so far for one file.
    Progress {
        transfer_id: TransferId,
        path_id: String,
        bytes: i64,
    },
    FileCanceled {
        transfer_id: TransferId,
        path_id: String,
        by_peer: bool,
    },
    FileFailed {
        transfer_id: TransferId,
        path_id: String,
        status_code: u32,
    },
    TransferCanceled {
        transfer_id: TransferId,
        by_peer: bool,
    },
    TransferFailed {
        transfer_id: TransferId,
        status_code: u32,
    },
    FileUploadComplete {
        transfer_id: TransferId,
        path_id: String,
    },
    /// An incoming file was fully written; `final_path` is where it landed
    /// after name-conflict resolution.
    FileDownloadComplete {
        transfer_id: TransferId,
        path_id: String,
        final_path: String,
    },
}

impl EngineEvent {
    pub fn transfer_id(&self) -> &TransferId {
        match self {
            Self::Pending { transfer, .. } => &transfer.id,
            Self::FileStarted { transfer_id, .. }
            | Self::Progress { transfer_id, .. }
            | Self::FileCanceled { transfer_id, .. }
            | Self::FileFailed { transfer_id, .. }
            | Self::TransferCanceled { transfer_id, .. }
            | Self::TransferFailed { transfer_id, .. }
            | Self::FileUploadComplete { transfer_id, .. }
            | Self::FileDownloadComplete { transfer_id, .. } => transfer_id,
        }
    }
}
