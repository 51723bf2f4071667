// Time Provider Port (for testability)

/// Clock abstraction so visibility and retention behavior is testable
/// without sleeping.
pub trait TimeProvider: Send + Sync {
    /// Current unix time in milliseconds.
    fn now_millis(&self) -> i64;
}

/// System clock provider (production).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
