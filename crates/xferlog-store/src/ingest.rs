//! Engine notifications -> store operations.
//!
//! The engine reports what happened; this maps each report onto entity
//! creation or a guarded append. Cancel and fail reports do not carry a byte
//! count, so they record the latest counter already on file for the path.

use xferlog_shared::EngineEvent;

use crate::database::Database;
use crate::error::Result;
use crate::models::NewPath;
use crate::stages::{PathStage, TransferStage};

impl Database {
    pub fn ingest(&self, event: &EngineEvent) -> Result<()> {
        tracing::debug!(transfer_id = %event.transfer_id(), ?event, "ingesting engine event");

        match event {
            EngineEvent::Pending {
                direction,
                transfer,
            } => {
                self.ensure_peer(&transfer.peer)?;
                let paths: Vec<NewPath> = transfer.files.iter().map(NewPath::from).collect();
                self.create_transfer_with_paths(&transfer.id, &transfer.peer, *direction, &paths)?;
            }
            EngineEvent::FileStarted {
                transfer_id,
                path_id,
            } => {
                // a resumed file restarts from what was already moved
                self.append_path_event_with(transfer_id, path_id, |snapshot| PathStage::Started {
                    bytes: snapshot.bytes,
                })?;
            }
            EngineEvent::Progress {
                transfer_id,
                path_id,
                bytes,
            } => {
                self.append_path_event(transfer_id, path_id, PathStage::Started { bytes: *bytes })?;
            }
            EngineEvent::FileCanceled {
                transfer_id,
                path_id,
                by_peer,
            } => {
                let by_peer = *by_peer;
                self.append_path_event_with(transfer_id, path_id, |snapshot| PathStage::Cancelled {
                    by_peer,
                    bytes: snapshot.bytes,
                })?;
            }
            EngineEvent::FileFailed {
                transfer_id,
                path_id,
                status_code,
            } => {
                let status_code = *status_code;
                self.append_path_event_with(transfer_id, path_id, |snapshot| PathStage::Failed {
                    status_code,
                    bytes: snapshot.bytes,
                })?;
            }
            EngineEvent::TransferCanceled {
                transfer_id,
                by_peer,
            } => {
                self.append_transfer_event(transfer_id, TransferStage::Cancelled { by_peer: *by_peer })?;
            }
            EngineEvent::TransferFailed {
                transfer_id,
                status_code,
            } => {
                self.append_transfer_event(
                    transfer_id,
                    TransferStage::Failed {
                        status_code: *status_code,
                    },
                )?;
            }
            EngineEvent::FileUploadComplete {
                transfer_id,
                path_id,
            } => {
                self.append_path_event(transfer_id, path_id, PathStage::Completed { final_path: None })?;
            }
            EngineEvent::FileDownloadComplete {
                transfer_id,
                path_id,
                final_path,
            } => {
                self.append_path_event(
                    transfer_id,
                    path_id,
                    PathStage::Completed {
                        final_path: Some(final_path.clone()),
                    },
                )?;
            }
        }

        Ok(())
    }
}
