// PlainQ Core - Domain Model, Ports, and the Queue Service Facade
// No storage dependencies; the SQLite engine lives in plainq-store-sqlite.

pub mod application;
pub mod domain;
pub mod error;
pub mod port;
pub mod time;

pub use error::{Error, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
