//! Library configuration for a [`TransferEngine`](crate::TransferEngine).

use std::path::PathBuf;
use std::time::Duration;

use crate::transfer::constants::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use crate::upload::WorkerSizing;

/// Engine-wide defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Connect timeout for requests that do not set one.
    pub connect_timeout: Duration,
    /// Read timeout for requests that do not set one.
    pub read_timeout: Duration,
    /// How many uploads may run at once.
    pub workers: WorkerSizing,
    /// Directory for resized image copies.
    pub scratch_dir: PathBuf,
    /// Directory relative file paths are resolved against.
    pub file_root: PathBuf,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            workers: WorkerSizing::default(),
            scratch_dir: std::env::temp_dir(),
            file_root: PathBuf::from("."),
        }
    }
}

impl TransferConfig {
    #[must_use]
    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: WorkerSizing) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_file_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.file_root = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_transport_defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.read_timeout, Duration::from_secs(300));
        assert_eq!(config.workers, WorkerSizing::Detect);
    }

    #[test]
    fn test_builder_overrides() {
        let config = TransferConfig::default()
            .with_timeouts(Duration::from_secs(1), Duration::from_secs(2))
            .with_workers(WorkerSizing::Fixed(2))
            .with_file_root("/data");
        assert_eq!(config.read_timeout, Duration::from_secs(2));
        assert_eq!(config.workers, WorkerSizing::Fixed(2));
        assert_eq!(config.file_root, PathBuf::from("/data"));
    }
}
