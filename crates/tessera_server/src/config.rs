//! Server configuration.

use std::time::Duration;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of mutations accepted in one push.
    pub max_push_batch: usize,
    /// How long a CVR snapshot stays addressable by its cookie.
    pub cvr_ttl: Duration,
    /// Maximum number of CVR snapshots kept before LRU eviction.
    pub cvr_capacity: usize,
    /// How many times a conflicting store transaction is re-run.
    pub store_retries: u32,
    /// Whether to require token authentication.
    pub require_auth: bool,
    /// Secret key for token validation (if auth enabled).
    pub auth_secret: Option<Vec<u8>>,
}

impl ServerConfig {
    /// Creates a configuration with default limits and auth disabled.
    pub fn new() -> Self {
        Self {
            max_push_batch: 100,
            cvr_ttl: Duration::from_secs(24 * 60 * 60),
            cvr_capacity: 100_000,
            store_retries: 8,
            require_auth: false,
            auth_secret: None,
        }
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }

    /// Sets the CVR snapshot time-to-live.
    pub fn with_cvr_ttl(mut self, ttl: Duration) -> Self {
        self.cvr_ttl = ttl;
        self
    }

    /// Sets the CVR snapshot capacity.
    pub fn with_cvr_capacity(mut self, capacity: usize) -> Self {
        self.cvr_capacity = capacity;
        self
    }

    /// Sets the store conflict retry limit.
    pub fn with_store_retries(mut self, retries: u32) -> Self {
        self.store_retries = retries;
        self
    }

    /// Enables authentication with the given secret.
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.require_auth = true;
        self.auth_secret = Some(secret);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
