//! Server configuration.

/// Configuration for the document server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Tenant (application id) callers must present.
    pub tenant: String,
    /// Maximum number of operations in one batch request.
    pub max_batch_size: usize,
    /// Upper bound on the number of objects one query returns.
    pub max_query_limit: usize,
    /// Number of batch responses remembered for token replay.
    pub response_cache_size: usize,
}

impl ServerConfig {
    /// Creates a configuration for the given tenant.
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            max_batch_size: 1000,
            max_query_limit: 1000,
            response_cache_size: 1024,
        }
    }

    /// Sets the maximum batch size.
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Sets the maximum query limit.
    pub fn with_max_query_limit(mut self, limit: usize) -> Self {
        self.max_query_limit = limit;
        self
    }

    /// Sets how many batch responses are kept for replay.
    pub fn with_response_cache_size(mut self, size: usize) -> Self {
        self.response_cache_size = size;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("default")
    }
}
