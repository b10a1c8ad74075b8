//! Lifecycle stages and the immutable event rows that record them.
//!
//! Each stage variant maps onto exactly one append-only table. Current state
//! is never stored; it is folded from these rows by [`crate::reconstruct`].

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum TransferStage {
    Active,
    Cancelled { by_peer: bool },
    Failed { status_code: u32 },
}

impl TransferStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled { .. } => "cancelled",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }

    pub fn state(&self) -> TransferState {
        match self {
            Self::Active => TransferState::Active,
            Self::Cancelled { .. } => TransferState::Cancelled,
            Self::Failed { .. } => TransferState::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEventRecord {
    #[serde(flatten)]
    pub stage: TransferStage,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// No event recorded yet.
    Unrecorded,
    Active,
    Cancelled,
    Failed,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unrecorded => "unrecorded",
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Path
// ---------------------------------------------------------------------------

/// Path stage. Byte counters are `bytes_sent` for outgoing paths and
/// `bytes_received` for incoming ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PathStage {
    Pending,
    Started {
        bytes: i64,
    },
    Cancelled {
        by_peer: bool,
        bytes: i64,
    },
    Failed {
        status_code: u32,
        bytes: i64,
    },
    /// `final_path` is present exactly for incoming paths.
    Completed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_path: Option<String>,
    },
}

impl PathStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Started { .. } => "started",
            Self::Cancelled { .. } => "cancelled",
            Self::Failed { .. } => "failed",
            Self::Completed { .. } => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Cancelled { .. } | Self::Failed { .. } | Self::Completed { .. }
        )
    }

    /// Byte counter carried by this stage, if any.
    pub fn counter(&self) -> Option<i64> {
        match self {
            Self::Started { bytes }
            | Self::Cancelled { bytes, .. }
            | Self::Failed { bytes, .. } => Some(*bytes),
            Self::Pending | Self::Completed { .. } => None,
        }
    }

    pub fn state(&self) -> PathState {
        match self {
            Self::Pending => PathState::Pending,
            Self::Started { .. } => PathState::Started,
            Self::Cancelled { .. } => PathState::Cancelled,
            Self::Failed { .. } => PathState::Failed,
            Self::Completed { .. } => PathState::Completed,
        }
    }

    /// Structural checks mirroring the schema's CHECK constraints.
    pub(crate) fn check_payload(&self) -> Result<()> {
        if let Some(bytes) = self.counter() {
            if bytes < 0 {
                return Err(StoreError::InvalidPayload(format!(
                    "{} byte counter must be >= 0, got {bytes}",
                    self.name()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEventRecord {
    #[serde(flatten)]
    pub stage: PathStage,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathState {
    /// No event recorded yet.
    Unrecorded,
    Pending,
    Started,
    Cancelled,
    Failed,
    Completed,
}

impl PathState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Failed | Self::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unrecorded => "unrecorded",
            Self::Pending => "pending",
            Self::Started => "started",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for PathState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
