// Queue Service Facade
//
// Thin coordinating layer between transports and the storage engine:
// validates identifiers and batch limits, dispatches to the storage port,
// and passes taxonomy errors through untouched. Transports translate them
// to their own wire statuses.

use crate::application::validation;
use crate::domain::QueueProperties;
use crate::error::{Error, Result};
use crate::port::queue_storage::{
    CreateQueueRequest, CreateQueueResponse, DeleteQueueRequest, DeleteRequest, DeleteResponse,
    DescribeQueueRequest, ListQueuesRequest, ListQueuesResponse, PurgeQueueRequest, QueueStorage,
    ReceiveRequest, ReceiveResponse, SendRequest, SendResponse,
};
use std::sync::Arc;

/// Holds the logic of interacting with a queue on behalf of a transport.
pub struct QueueService {
    storage: Arc<dyn QueueStorage>,
}

impl QueueService {
    pub fn new(storage: Arc<dyn QueueStorage>) -> Self {
        Self { storage }
    }

    pub async fn create_queue(&self, input: CreateQueueRequest) -> Result<CreateQueueResponse> {
        if input.queue_name.is_empty() {
            return Err(Error::InvalidArgument("queue name is empty".to_string()));
        }

        if let Some(dlq_id) = &input.dead_letter_queue_id {
            validation::validate_queue_id(dlq_id)?;
        }

        self.storage.create_queue(input).await
    }

    pub async fn describe_queue(&self, input: DescribeQueueRequest) -> Result<QueueProperties> {
        match (input.queue_id.as_deref(), input.queue_name.as_deref()) {
            (Some(queue_id), None) => {
                validation::validate_queue_id(queue_id)?;
            }

            (None, Some(queue_name)) if !queue_name.is_empty() => {}

            _ => {
                return Err(Error::InvalidArgument(
                    "exactly one of queue_id or queue_name must be specified".to_string(),
                ));
            }
        }

        self.storage.describe_queue(input).await
    }

    pub async fn list_queues(&self, input: ListQueuesRequest) -> Result<ListQueuesResponse> {
        self.storage.list_queues(input).await
    }

    pub async fn purge_queue(&self, input: PurgeQueueRequest) -> Result<()> {
        validation::validate_queue_id(&input.queue_id)?;

        self.storage.purge_queue(input).await
    }

    pub async fn delete_queue(&self, input: DeleteQueueRequest) -> Result<()> {
        validation::validate_queue_id(&input.queue_id)?;

        self.storage.delete_queue(input).await
    }

    pub async fn send(&self, input: SendRequest) -> Result<SendResponse> {
        validation::validate_queue_id(&input.queue_id)?;
        validation::validate_batch_len(input.messages.len())?;

        self.storage.send(input).await
    }

    pub async fn receive(&self, input: ReceiveRequest) -> Result<ReceiveResponse> {
        validation::validate_queue_id(&input.queue_id)?;
        validation::validate_receive_batch_size(input.batch_size)?;

        self.storage.receive(input).await
    }

    pub async fn delete(&self, input: DeleteRequest) -> Result<DeleteResponse> {
        validation::validate_queue_id(&input.queue_id)?;
        validation::validate_batch_len(input.message_ids.len())?;

        self.storage.delete(input).await
    }
}
