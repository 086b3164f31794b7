#![deny(clippy::unwrap_used)]

#[macro_use]
extern crate log;

pub mod decorators;
pub mod message;
pub mod oob;
pub mod protocols;

pub use message::{Attachment, DidCommMessage, MessageError};
pub use oob::{OutOfBandInvitation, OobError, OobService};

#[cfg(test)]
fn test_init() {
    env_logger::builder().is_test(true).try_init().ok();
}
