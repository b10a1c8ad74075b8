//! Store configuration loaded from environment variables.
//!
//! Every setting has a default so the store opens with zero configuration.

use std::path::PathBuf;

/// Which of several recorded terminal events decides an entity's state.
///
/// Nothing in the schema stops two terminal rows from being written for one
/// entity (older stores, or writers outside this crate), so reconstruction
/// needs a rule. `FirstWins` treats the earliest terminal transition as
/// authoritative and later ones as noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminalPolicy {
    #[default]
    FirstWins,
    LastWins,
}

impl std::str::FromStr for TerminalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "first-wins" | "first_wins" => Ok(Self::FirstWins),
            "last" | "last-wins" | "last_wins" => Ok(Self::LastWins),
            other => Err(format!("unknown terminal policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Location of the SQLite file.
    /// Env: `XFERLOG_STORAGE_PATH`
    /// Default: `None`, meaning the platform data directory.
    pub storage_path: Option<PathBuf>,

    /// Precedence among competing terminal events.
    /// Env: `XFERLOG_TERMINAL_POLICY` (`first` / `last`)
    /// Default: `first`
    pub terminal_policy: TerminalPolicy,
}

impl StoreConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("XFERLOG_STORAGE_PATH") {
            if !path.is_empty() {
                config.storage_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(val) = std::env::var("XFERLOG_TERMINAL_POLICY") {
            match val.parse::<TerminalPolicy>() {
                Ok(policy) => config.terminal_policy = policy,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid XFERLOG_TERMINAL_POLICY, using default");
                }
            }
        }

        config
    }

    pub fn with_terminal_policy(mut self, policy: TerminalPolicy) -> Self {
        self.terminal_policy = policy;
        self
    }
}
