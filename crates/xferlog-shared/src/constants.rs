/// Application name
pub const APP_NAME: &str = "xferlog";

/// File name of the store inside the platform data directory
pub const DB_FILE_NAME: &str = "xferlog.db";

/// Textual layout of every persisted timestamp: naive UTC, millisecond precision.
/// Lexicographic order of this layout equals chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
