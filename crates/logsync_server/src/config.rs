//! Server configuration.

/// What to do when a node submits a digest that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptClientTreePolicy {
    /// Answer with no messages. The node keeps its state and retries later.
    #[default]
    EmptyDelta,
    /// Send the owner's whole history, minus the node's own messages.
    FullResync,
}

/// Configuration for the sync coordinator.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum messages accepted in one request.
    pub max_messages_per_request: usize,
    /// Maximum encoded request size in bytes.
    pub max_request_bytes: usize,
    /// Handling of unparseable client digests.
    pub corrupt_client_tree: CorruptClientTreePolicy,
}

impl ServerConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_messages_per_request: 10_000,
            max_request_bytes: 16 * 1024 * 1024,
            corrupt_client_tree: CorruptClientTreePolicy::EmptyDelta,
        }
    }

    /// Sets the maximum messages per request.
    pub fn with_max_messages_per_request(mut self, max: usize) -> Self {
        self.max_messages_per_request = max;
        self
    }

    /// Sets the maximum request size.
    pub fn with_max_request_bytes(mut self, max: usize) -> Self {
        self.max_request_bytes = max;
        self
    }

    /// Sets the corrupt client digest policy.
    pub fn with_corrupt_client_tree(mut self, policy: CorruptClientTreePolicy) -> Self {
        self.corrupt_client_tree = policy;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_messages_per_request, 10_000);
        assert_eq!(config.max_request_bytes, 16 * 1024 * 1024);
        assert_eq!(config.corrupt_client_tree, CorruptClientTreePolicy::EmptyDelta);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_max_messages_per_request(5)
            .with_max_request_bytes(1024)
            .with_corrupt_client_tree(CorruptClientTreePolicy::FullResync);
        assert_eq!(config.max_messages_per_request, 5);
        assert_eq!(config.max_request_bytes, 1024);
        assert_eq!(config.corrupt_client_tree, CorruptClientTreePolicy::FullResync);
    }
}
