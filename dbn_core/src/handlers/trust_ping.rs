use std::sync::Arc;

use async_trait::async_trait;
use dbn_messages::{
    protocols::{trust_ping::PingResponseBody, types, uris},
    DidCommMessage,
};
use dbn_storage::{ConnectionRepository, ConnectionState, MessageRecordData, MessageRepository};
use serde_json::json;

use crate::{error::CoreError, registry::{MessageContext, ProtocolHandler}, router::MessageRouter};

/// Persists both `/ping` and `/ping-response` as inbound message rows and marks the
/// associated connection active/complete. Answers a `/ping` with a `/ping-response`
/// when `response_requested` is set; an unanswerable ping (uncorrelated connection,
/// response not requested) is logged, never an error.
pub struct TrustPingHandler {
    connections: Arc<ConnectionRepository>,
    messages: Arc<MessageRepository>,
    router: Arc<MessageRouter>,
}

impl TrustPingHandler {
    pub fn new(connections: Arc<ConnectionRepository>, messages: Arc<MessageRepository>, router: Arc<MessageRouter>) -> Self {
        Self { connections, messages, router }
    }

    fn persist_inbound(&self, message: &DidCommMessage, context: &MessageContext) -> Result<(), CoreError> {
        if self.messages.find_by_message_id(&message.id)?.is_some() {
            return Ok(());
        }
        let mut data = MessageRecordData::new_inbound(message.id.clone(), message.type_.clone(), message.from.clone(), message.body.clone());
        data.connection_id = context.connection_id.clone();
        data.thread_id = message.thread.thid.clone();
        data.metadata.encrypted = Some(context.encrypted);
        data.metadata.transport = Some(context.transport.to_string());
        self.messages.create(data)?;
        Ok(())
    }

    /// If the connection is known, marks it active/complete — a successful ping
    /// round is itself evidence the handshake succeeded, matching the advisory
    /// (never-rejecting) state update the protocol handlers otherwise use.
    fn mark_connection_active(&self, connection_id: &str) -> Result<(), CoreError> {
        self.connections.update_state(connection_id, ConnectionState::Complete)?;
        Ok(())
    }

    async fn handle_ping(&self, message: DidCommMessage, context: MessageContext) -> Result<(), CoreError> {
        self.persist_inbound(&message, &context)?;

        if let Some(connection_id) = &context.connection_id {
            self.mark_connection_active(connection_id)?;
        }

        let response_requested = message.body.get("response_requested").and_then(serde_json::Value::as_bool).unwrap_or(true);
        if !response_requested {
            info!("Received trust ping with no response requested");
            return Ok(());
        }

        let Some(connection_id) = context.connection_id else {
            warn!("Received trust ping from an uncorrelated connection, cannot answer");
            return Ok(());
        };
        let Some(connection) = self.connections.get(&connection_id)? else {
            return Ok(());
        };

        let response = DidCommMessage::new(types::TRUST_PING_RESPONSE, json!(PingResponseBody::pong()))
            .from_did(connection.data.my_did.clone())
            .to_did(connection.data.their_did.clone())
            .in_thread(message.id.clone());
        if let Err(err) = self.router.route_outbound(response, &connection_id, false).await {
            warn!("Failed to send trust ping response on connection `{}`: {}", connection_id, err);
        }
        Ok(())
    }

    async fn handle_ping_response(&self, message: DidCommMessage, context: MessageContext) -> Result<(), CoreError> {
        self.persist_inbound(&message, &context)?;
        if let Some(connection_id) = &context.connection_id {
            self.mark_connection_active(connection_id)?;
        }
        info!("Received trust ping response `{}`", message.id);
        Ok(())
    }
}

#[async_trait]
impl ProtocolHandler for TrustPingHandler {
    fn name(&self) -> &'static str {
        "trust_ping"
    }

    fn supports(&self, message_type: &str) -> bool {
        message_type.starts_with(uris::TRUST_PING_2_0)
    }

    async fn handle(&self, message: DidCommMessage, context: MessageContext) -> Result<(), CoreError> {
        match message.type_.as_str() {
            types::TRUST_PING => self.handle_ping(message, context).await,
            types::TRUST_PING_RESPONSE => self.handle_ping_response(message, context).await,
            other => {
                debug!("Ignoring trust ping message of type `{}`", other);
                Ok(())
            }
        }
    }
}
