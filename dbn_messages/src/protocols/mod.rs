pub mod basic_message;
pub mod connection;
pub mod trust_ping;

/// Protocol family URIs (no trailing message name), used both for registering
/// `ProtocolHandler`s by prefix and for the `dbn_messages::DidCommMessage::protocol_uri`
/// comparisons the handlers perform in `supports()`.
pub mod uris {
    pub const CONNECTIONS_1_0: &str = "https://didcomm.org/connections/1.0";
    pub const BASIC_MESSAGE_2_0: &str = "https://didcomm.org/basicmessage/2.0";
    pub const TRUST_PING_2_0: &str = "https://didcomm.org/trust-ping/2.0";
}

pub mod types {
    pub const CONNECTION_REQUEST: &str = "https://didcomm.org/connections/1.0/request";
    pub const CONNECTION_RESPONSE: &str = "https://didcomm.org/connections/1.0/response";
    pub const CONNECTION_ACK: &str = "https://didcomm.org/connections/1.0/ack";
    pub const BASIC_MESSAGE: &str = "https://didcomm.org/basicmessage/2.0/message";
    pub const TRUST_PING: &str = "https://didcomm.org/trust-ping/2.0/ping";
    pub const TRUST_PING_RESPONSE: &str = "https://didcomm.org/trust-ping/2.0/ping-response";
}
