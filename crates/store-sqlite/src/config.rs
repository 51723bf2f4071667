// Storage Engine Configuration

use plainq_core::domain::{
    DEFAULT_MAX_RECEIVE_ATTEMPTS, DEFAULT_RETENTION_PERIOD_SECONDS,
    DEFAULT_VISIBILITY_TIMEOUT_SECONDS,
};
use std::time::Duration;

/// Default timeout between garbage collection runs.
pub const DEFAULT_GC_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default size of the queue properties cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Default timeout for warming the queue properties cache at startup.
pub const DEFAULT_CACHE_WARMUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default page size used for listing queues.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Engine configuration. Zero-valued fields fall back to the documented
/// defaults when the engine opens.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Filesystem path (or sqlite URL) of the durable store.
    pub storage_path: String,

    pub gc_timeout: Duration,
    pub cache_capacity: usize,
    pub cache_warmup_timeout: Duration,

    /// Fallbacks applied when the corresponding CreateQueue field is zero.
    pub default_retention_period_seconds: u64,
    pub default_visibility_timeout_seconds: u64,
    pub default_max_receive_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_path: "plainq.db".to_string(),
            gc_timeout: DEFAULT_GC_TIMEOUT,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_warmup_timeout: DEFAULT_CACHE_WARMUP_TIMEOUT,
            default_retention_period_seconds: DEFAULT_RETENTION_PERIOD_SECONDS,
            default_visibility_timeout_seconds: DEFAULT_VISIBILITY_TIMEOUT_SECONDS,
            default_max_receive_attempts: DEFAULT_MAX_RECEIVE_ATTEMPTS,
        }
    }
}

impl StoreConfig {
    /// Replaces zero-valued fields with their defaults.
    pub(crate) fn normalized(mut self) -> Self {
        if self.gc_timeout.is_zero() {
            self.gc_timeout = DEFAULT_GC_TIMEOUT;
        }

        if self.cache_capacity == 0 {
            self.cache_capacity = DEFAULT_CACHE_CAPACITY;
        }

        if self.cache_warmup_timeout.is_zero() {
            self.cache_warmup_timeout = DEFAULT_CACHE_WARMUP_TIMEOUT;
        }

        if self.default_retention_period_seconds == 0 {
            self.default_retention_period_seconds = DEFAULT_RETENTION_PERIOD_SECONDS;
        }

        if self.default_visibility_timeout_seconds == 0 {
            self.default_visibility_timeout_seconds = DEFAULT_VISIBILITY_TIMEOUT_SECONDS;
        }

        if self.default_max_receive_attempts == 0 {
            self.default_max_receive_attempts = DEFAULT_MAX_RECEIVE_ATTEMPTS;
        }

        self
    }
}
