//! Journal store configuration.

/// Configuration for [`crate::JournalStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Sync the journal to disk before a commit becomes visible.
    pub sync_on_commit: bool,
    /// Create the store directory if it does not exist.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
            create_if_missing: true,
        }
    }
}

impl StoreConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether commits are synced to disk.
    #[must_use]
    pub fn with_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    /// Sets whether a missing directory is created.
    #[must_use]
    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_durable() {
        let config = StoreConfig::default();
        assert!(config.sync_on_commit);
        assert!(config.create_if_missing);
    }

    #[test]
    fn builder() {
        let config = StoreConfig::new()
            .with_sync_on_commit(false)
            .with_create_if_missing(false);
        assert!(!config.sync_on_commit);
        assert!(!config.create_if_missing);
    }
}
