// Domain Model

pub mod id;
pub mod message;
pub mod queue;

pub use id::{MessageId, QueueId};
pub use message::{NewMessage, ReceivedMessage};
pub use queue::{
    EvictionPolicy, QueueProperties, DEFAULT_MAX_RECEIVE_ATTEMPTS,
    DEFAULT_RETENTION_PERIOD_SECONDS, DEFAULT_VISIBILITY_TIMEOUT_SECONDS,
};
