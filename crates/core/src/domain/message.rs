// Message Domain Model

use crate::domain::MessageId;
use serde::{Deserialize, Serialize};

/// A message submitted by a producer. The body is opaque to the core; size
/// limits are the transport's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub body: Vec<u8>,
}

/// A message handed to a consumer by `Receive`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    pub id: MessageId,
    pub body: Vec<u8>,
}
