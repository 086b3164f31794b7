use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dbn_messages::DidCommMessage;

use crate::error::CoreError;

/// Context threaded through a `ProtocolHandler::handle` call. Built fresh by
/// `MessageRouter::route_inbound` for each inbound message.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub connection_id: Option<String>,
    pub direction: &'static str,
    pub transport: &'static str,
    pub encrypted: bool,
    pub received_at: DateTime<Utc>,
}

impl MessageContext {
    pub fn inbound(connection_id: Option<String>) -> Self {
        Self { connection_id, direction: "inbound", transport: "http", encrypted: true, received_at: Utc::now() }
    }
}

/// A pluggable per-protocol message handler, registered at startup in a
/// `Box<dyn ProtocolHandler>` registry rather than modeled as an enum, so new
/// protocols can be added without touching the router.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this handler accepts the given DIDComm message type URI. Handlers
    /// typically accept any type with their protocol family URI as a prefix.
    fn supports(&self, message_type: &str) -> bool;

    async fn handle(&self, message: DidCommMessage, context: MessageContext) -> Result<(), CoreError>;
}

/// Maps protocol-type URI prefixes to handlers. Lookup is exact-match-first, then
/// first `supports()` match; registration is process-wide, performed at startup, and
/// re-registering a name overwrites the previous handler with a warning.
pub struct ProtocolRegistry {
    handlers: Vec<Box<dyn ProtocolHandler>>,
    exact: HashMap<String, usize>,
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self { handlers: vec![], exact: HashMap::new() }
    }

    #[must_use]
    pub fn register(mut self, exact_type: &str, handler: Box<dyn ProtocolHandler>) -> Self {
        if self.exact.contains_key(exact_type) {
            warn!("Overwriting existing protocol handler registration for `{}`", exact_type);
        }
        let index = self.handlers.len();
        self.exact.insert(exact_type.to_string(), index);
        self.handlers.push(handler);
        self
    }

    pub fn find(&self, message_type: &str) -> Option<&dyn ProtocolHandler> {
        if let Some(&index) = self.exact.get(message_type) {
            return Some(self.handlers[index].as_ref());
        }
        self.handlers.iter().find(|handler| handler.supports(message_type)).map(AsRef::as_ref)
    }

    pub async fn route(&self, message: DidCommMessage, context: MessageContext) -> Result<(), CoreError> {
        let handler = self
            .find(&message.type_)
            .ok_or_else(|| CoreError::HandlerNotFound(message.type_.clone()))?;
        handler.handle(message, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoHandler {
        prefix: &'static str,
    }

    #[async_trait]
    impl ProtocolHandler for EchoHandler {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn supports(&self, message_type: &str) -> bool {
            message_type.starts_with(self.prefix)
        }
        async fn handle(&self, _message: DidCommMessage, _context: MessageContext) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn routes_to_handler_by_prefix_match() {
        let registry = ProtocolRegistry::new().register(
            "https://didcomm.org/basicmessage/2.0/message",
            Box::new(EchoHandler { prefix: "https://didcomm.org/basicmessage/2.0" }),
        );
        let message = DidCommMessage::new("https://didcomm.org/basicmessage/2.0/message", json!({"content":"hi"}));
        assert!(registry.route(message, MessageContext::inbound(None)).await.is_ok());
    }

    #[tokio::test]
    async fn missing_handler_is_reported() {
        let registry = ProtocolRegistry::new();
        let message = DidCommMessage::new("https://didcomm.org/unknown/1.0/foo", json!({}));
        let err = registry.route(message, MessageContext::inbound(None)).await.unwrap_err();
        assert!(matches!(err, CoreError::HandlerNotFound(_)));
    }
}
