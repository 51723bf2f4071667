// Application Layer - the queue service facade

pub mod queue_service;
pub mod validation;

pub use queue_service::QueueService;
