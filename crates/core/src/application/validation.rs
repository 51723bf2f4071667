// Request Validation
//
// Performed at the facade before any request reaches the database.

use crate::domain::QueueId;
use crate::error::{Error, Result};

/// Largest batch accepted by Send, Receive, and Delete.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Validates a queue identifier taken from a request.
pub fn validate_queue_id(queue_id: &str) -> Result<QueueId> {
    if queue_id.is_empty() {
        return Err(Error::InvalidId);
    }

    QueueId::parse(queue_id)
}

/// Validates the item count of a Send or Delete batch.
pub fn validate_batch_len(len: usize) -> Result<()> {
    if len == 0 {
        return Err(Error::InvalidArgument("batch is empty".to_string()));
    }

    if len > MAX_BATCH_SIZE {
        return Err(Error::InvalidBatchSize);
    }

    Ok(())
}

/// Validates a Receive batch size. Zero is allowed; the engine defaults it
/// to 1.
pub fn validate_receive_batch_size(batch_size: u32) -> Result<()> {
    if batch_size as usize > MAX_BATCH_SIZE {
        return Err(Error::InvalidBatchSize);
    }

    Ok(())
}
