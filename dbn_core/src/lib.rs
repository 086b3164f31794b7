#![deny(clippy::unwrap_used)]

#[macro_use]
extern crate log;

pub mod capability;
pub mod config;
pub mod connection_manager;
pub mod error;
pub mod events;
pub mod framework;
pub mod handlers;
pub mod registry;
pub mod router;

pub use config::CoreConfig;
pub use connection_manager::{AcceptInvitationParams, ConnectionManager, CreateInvitationParams, CreatedInvitation, PingResult};
pub use error::CoreError;
pub use events::{BasicMessageEvent, BasicMessageEventBus, EventEmitter};
pub use framework::DbnFramework;
pub use registry::{MessageContext, ProtocolHandler, ProtocolRegistry};
pub use router::MessageRouter;

#[cfg(test)]
fn test_init() {
    env_logger::builder().is_test(true).try_init().ok();
}
