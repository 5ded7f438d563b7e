use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default time a storage call may wait on a locked database or a busy pool.
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for the SQLite-backed statement store.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    /// Create the database file when it does not exist yet
    pub create_if_missing: bool,
    pub max_connections: u32,
    /// How long SQLite waits for a competing writer before giving up
    pub busy_timeout: Duration,
    /// How long a caller waits for a pooled connection
    pub acquire_timeout: Duration,
}

impl StorageConfig {
    pub fn new(database_path: impl AsRef<Path>) -> Self {
        Self {
            database_path: database_path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Apply the same bound to lock waits and pool waits.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("ledgerline.db"),
            create_if_missing: false,
            max_connections: 5,
            busy_timeout: DEFAULT_STORAGE_TIMEOUT,
            acquire_timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }
}
