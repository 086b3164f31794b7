use std::time::Duration;

use url::Url;

/// Typed, `Clone`-by-value configuration passed into each service constructor at
/// startup. No environment-variable reads inside this crate; a binary embedding the
/// core populates this struct from its own config/CLI layer.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub agent_endpoint: Url,
    pub agent_label: String,
    pub kms_base_url: Url,
    pub http_timeout: Duration,
    /// The protocol URI whose outbound messages may bypass the usual
    /// `is_transmittable` check on the target connection (see
    /// [`crate::router::MessageRouter::route_outbound`]'s `allow_handshake` flag).
    pub allow_handshake_protocol: String,
}

impl CoreConfig {
    pub fn new(agent_endpoint: Url, agent_label: impl Into<String>, kms_base_url: Url) -> Self {
        Self {
            agent_endpoint,
            agent_label: agent_label.into(),
            kms_base_url,
            http_timeout: Duration::from_secs(30),
            allow_handshake_protocol: dbn_messages::protocols::uris::CONNECTIONS_1_0.to_string(),
        }
    }
}
