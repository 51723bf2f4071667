// Queue Storage Port
//
// The storage engine implements this interface; the queue service facade
// dispatches to it. Request identifiers arrive as raw strings because they
// come from untrusted callers; responses carry validated domain types.

use crate::domain::{MessageId, NewMessage, QueueId, QueueProperties, ReceivedMessage};
use crate::domain::queue::EvictionPolicy;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Sort key for queue listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    #[default]
    Id,
    Name,
    CreatedAt,
}

/// Sort direction for queue listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateQueueRequest {
    pub queue_name: String,

    /// Zero means "use the configured default". Same for the two fields
    /// below.
    #[serde(default)]
    pub retention_period_seconds: u64,

    #[serde(default)]
    pub visibility_timeout_seconds: u64,

    #[serde(default)]
    pub max_receive_attempts: u32,

    #[serde(default)]
    pub eviction_policy: Option<EvictionPolicy>,

    #[serde(default)]
    pub dead_letter_queue_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQueueResponse {
    pub queue_id: QueueId,
}

/// Exactly one of the two fields must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescribeQueueRequest {
    #[serde(default)]
    pub queue_id: Option<String>,

    #[serde(default)]
    pub queue_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQueuesRequest {
    /// Restricts `queue_name` to names starting with this prefix.
    #[serde(default)]
    pub queue_prefix: Option<String>,

    /// Sort-key value of the last row of the previous page.
    #[serde(default)]
    pub cursor: Option<String>,

    /// Zero means the default page size.
    #[serde(default)]
    pub limit: u32,

    #[serde(default)]
    pub order_by: OrderBy,

    #[serde(default)]
    pub sort_by: SortBy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListQueuesResponse {
    pub queues: Vec<QueueProperties>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeQueueRequest {
    pub queue_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteQueueRequest {
    pub queue_id: String,

    /// Reserved for transports to guard against accidental deletion of a
    /// non-empty queue; the engine drops the queue regardless.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub queue_id: String,
    pub messages: Vec<NewMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    /// Same order as the request messages.
    pub message_ids: Vec<MessageId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveRequest {
    pub queue_id: String,

    /// Zero defaults to 1.
    #[serde(default)]
    pub batch_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveResponse {
    pub messages: Vec<ReceivedMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub queue_id: String,
    pub message_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFailure {
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub successful: Vec<MessageId>,
    pub failed: Vec<DeleteFailure>,
}

/// QueueStorage encapsulates interaction with the durable queue store.
#[async_trait]
pub trait QueueStorage: Send + Sync {
    /// Creates a new queue.
    async fn create_queue(&self, input: CreateQueueRequest) -> Result<CreateQueueResponse>;

    /// Returns the properties of the specified queue.
    async fn describe_queue(&self, input: DescribeQueueRequest) -> Result<QueueProperties>;

    /// Returns a page of existing queues.
    async fn list_queues(&self, input: ListQueuesRequest) -> Result<ListQueuesResponse>;

    /// Removes all messages from the queue.
    async fn purge_queue(&self, input: PurgeQueueRequest) -> Result<()>;

    /// Deletes the queue together with its messages.
    async fn delete_queue(&self, input: DeleteQueueRequest) -> Result<()>;

    /// Appends messages to the queue.
    async fn send(&self, input: SendRequest) -> Result<SendResponse>;

    /// Hands out up to `batch_size` visible messages, making them invisible
    /// for the queue's visibility timeout.
    async fn receive(&self, input: ReceiveRequest) -> Result<ReceiveResponse>;

    /// Deletes messages by id, reporting per-item success.
    async fn delete(&self, input: DeleteRequest) -> Result<DeleteResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_deserialize_with_defaults() {
        let req: CreateQueueRequest = serde_json::from_str(r#"{"queue_name":"orders"}"#).unwrap();
        assert_eq!(req.queue_name, "orders");
        assert_eq!(req.retention_period_seconds, 0);
        assert!(req.eviction_policy.is_none());

        let req: ListQueuesRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.limit, 0);
        assert_eq!(req.order_by, OrderBy::Id);
        assert_eq!(req.sort_by, SortBy::Asc);

        let req: ReceiveRequest =
            serde_json::from_str(r#"{"queue_id":"00000000000000000000"}"#).unwrap();
        assert_eq!(req.batch_size, 0);
    }

    #[test]
    fn order_and_sort_keys_use_snake_case() {
        assert_eq!(
            serde_json::to_string(&OrderBy::CreatedAt).unwrap(),
            r#""created_at""#
        );
        assert_eq!(serde_json::to_string(&SortBy::Desc).unwrap(), r#""desc""#);
    }
}
