// Queue Domain Model

use crate::domain::QueueId;
use serde::{Deserialize, Serialize};

/// Default retention period for messages: 7 days.
pub const DEFAULT_RETENTION_PERIOD_SECONDS: u64 = 7 * 24 * 3600;

/// Default visibility timeout applied after a receive.
pub const DEFAULT_VISIBILITY_TIMEOUT_SECONDS: u64 = 30;

/// Default maximum number of receive attempts per message.
pub const DEFAULT_MAX_RECEIVE_ATTEMPTS: u32 = 5;

/// What happens to an expired message when the sweeper evicts it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Expired messages are removed.
    #[default]
    Drop,

    /// Expired messages are moved to the configured dead-letter queue.
    DeadLetter,
}

impl EvictionPolicy {
    /// Wire value persisted in the properties table. Zero is reserved for
    /// "unspecified" and is read back as [`EvictionPolicy::Drop`].
    pub fn as_i64(self) -> i64 {
        match self {
            EvictionPolicy::Drop => 1,
            EvictionPolicy::DeadLetter => 2,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            2 => EvictionPolicy::DeadLetter,
            _ => EvictionPolicy::Drop,
        }
    }

    /// Stable label used in metric names and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            EvictionPolicy::Drop => "drop",
            EvictionPolicy::DeadLetter => "dead_letter",
        }
    }
}

/// Canonical description of a queue.
///
/// All timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueProperties {
    pub id: QueueId,
    pub name: String,
    pub created_at: i64,

    /// Updated after every successful sweep; the garbage collector selects
    /// candidate queues by this value.
    pub last_swept_at: i64,

    pub retention_period_seconds: u64,
    pub visibility_timeout_seconds: u64,
    pub max_receive_attempts: u32,
    pub eviction_policy: EvictionPolicy,
    pub dead_letter_queue_id: Option<QueueId>,
}
