pub mod basic_message;
pub mod connection;
pub mod trust_ping;

pub use basic_message::BasicMessageHandler;
pub use connection::ConnectionProtocolHandler;
pub use trust_ping::TrustPingHandler;
