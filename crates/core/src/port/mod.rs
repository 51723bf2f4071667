// Port Layer - Interfaces between the engine and its collaborators

pub mod observer;
pub mod queue_storage;
pub mod time_provider;

pub use observer::{Counter, Gauge, Histogram, NoopObserver, Observer};
pub use queue_storage::{
    CreateQueueRequest, CreateQueueResponse, DeleteFailure, DeleteQueueRequest, DeleteRequest,
    DeleteResponse, DescribeQueueRequest, ListQueuesRequest, ListQueuesResponse, OrderBy,
    PurgeQueueRequest, QueueStorage, ReceiveRequest, ReceiveResponse, SendRequest, SendResponse,
    SortBy,
};
pub use time_provider::{SystemTimeProvider, TimeProvider};
