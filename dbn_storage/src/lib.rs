#![deny(clippy::unwrap_used)]

#[macro_use]
extern crate log;

pub mod base;
pub mod connection;
pub mod connection_repository;
pub mod error;
pub mod in_memory;
pub mod message;
pub mod message_repository;
pub mod record;

pub use base::Storage;
pub use connection::{ConnectionRecordData, ConnectionRecordTagKeys, ConnectionRole, ConnectionState};
pub use connection_repository::ConnectionRepository;
pub use error::{RepositoryError, StorageError};
pub use in_memory::InMemoryStorage;
pub use message::{MessageDirection, MessageRecordData, MessageRecordTagKeys, MessageState};
pub use message_repository::MessageRepository;
pub use record::Record;

#[cfg(test)]
fn test_init() {
    env_logger::builder().is_test(true).try_init().ok();
}
