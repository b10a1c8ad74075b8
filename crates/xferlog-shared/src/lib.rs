//! # xferlog-shared
//!
//! Vocabulary shared between the transfer engine and the transfer log:
//! identifier newtypes, transfer direction, and the notifications the engine
//! emits as transfers progress.

pub mod constants;
pub mod event;
pub mod types;

pub use event::{EngineEvent, FileInfo, TransferInfo};
pub use types::{Direction, PeerId, TransferId};
