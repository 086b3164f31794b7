use std::sync::Arc;

use async_trait::async_trait;
use dbn_messages::{
    protocols::{
        connection::{scan_for_endpoint, ConnectionAckBody, ConnectionRequestBody, ConnectionResponseBody, DidDocument},
        types, uris,
    },
    DidCommMessage,
};
use dbn_storage::{ConnectionRecordData, ConnectionRepository, ConnectionRole, ConnectionState, MessageRecordData, MessageRepository};
use serde_json::{json, Value};

use crate::{
    capability::{capabilities_from_services, Capabilities},
    error::CoreError,
    registry::{MessageContext, ProtocolHandler},
    router::MessageRouter,
};

fn capabilities_from_did_document(doc: &DidDocument) -> Capabilities {
    let services: Vec<Value> = doc.service.iter().map(|service| serde_json::to_value(service).unwrap_or(Value::Null)).collect();
    capabilities_from_services(&services)
}

/// Drives the inviter/invitee sides of the handshake: `/request` (inviter auto-responds
/// with `/response`), `/response` (invitee auto-acks), `/ack` (inviter completes).
/// State transitions are advisory (via [`ConnectionRepository::update_state`]) since an
/// inbound protocol message is, definitionally, evidence the peer believes the
/// transition is valid; strict rejection is reserved for API-initiated calls through
/// `ConnectionManager`.
pub struct ConnectionProtocolHandler {
    connections: Arc<ConnectionRepository>,
    messages: Arc<MessageRepository>,
    router: Arc<MessageRouter>,
}

impl ConnectionProtocolHandler {
    pub fn new(connections: Arc<ConnectionRepository>, messages: Arc<MessageRepository>, router: Arc<MessageRouter>) -> Self {
        Self { connections, messages, router }
    }

    fn locate_connection(&self, my_did: Option<&str>, their_did: &str, context: &MessageContext) -> Result<Option<dbn_storage::Record<ConnectionRecordData, dbn_storage::ConnectionRecordTagKeys>>, CoreError> {
        if let Some(connection_id) = &context.connection_id {
            if let Some(record) = self.connections.get(connection_id)? {
                return Ok(Some(record));
            }
        }
        let Some(my_did) = my_did else { return Ok(None) };
        Ok(self.connections.find_by_pair(my_did, their_did)?)
    }

    /// Writes the inbound row, guarded by `find_by_message_id` so a duplicate
    /// arrival of the same `messageId` is a no-op, per the exactly-once invariant.
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

    async fn handle_request(&self, message: DidCommMessage, context: MessageContext) -> Result<(), CoreError> {
        self.persist_inbound(&message, &context)?;

        let body: ConnectionRequestBody = serde_json::from_value(message.body.clone())
            .map_err(|err| CoreError::InvalidMessage(format!("malformed connection request: {err}")))?;

        let their_did = message.from.clone().ok_or_else(|| CoreError::InvalidMessage("connection request has no `from`".to_string()))?;
        let my_did = message.to.as_ref().and_then(|to| to.first()).cloned();

        let capabilities = match body.inline_did_document() {
            Some(doc) => capabilities_from_did_document(doc),
            None => Capabilities { endpoint: scan_for_endpoint(&message.body), protocols: vec![], services: vec![] },
        };

        let existing = match &body.invitation_id {
            Some(invitation_id) => self.connections.find_by_invitation_id(invitation_id)?.into_iter().find(|record| record.data.state.normalize() == ConnectionState::Invited),
            None => None,
        };

        let connection = match existing {
            Some(record) => {
                self.connections.update_peer_info(&record.id, their_did.clone(), Some(body.label.clone()))?;
                self.connections.update_capabilities(&record.id, capabilities.endpoint.clone(), capabilities.protocols.clone(), capabilities.services.clone())?;
                self.connections.update_state(&record.id, ConnectionState::Requested)?;
                self.connections.get(&record.id)?.ok_or_else(|| CoreError::ConnectionNotFound(record.id.clone()))?
            }
            None => {
                let Some(my_did) = my_did else {
                    warn!("Unsolicited connection request with no invitation correlation and no addressed DID, dropping");
                    return Ok(());
                };
                let mut data = ConnectionRecordData::new(my_did, their_did.clone(), ConnectionRole::Inviter, ConnectionState::Requested);
                data.their_label = Some(body.label.clone());
                data.their_endpoint = capabilities.endpoint.clone();
                data.their_protocols = capabilities.protocols.clone();
                data.their_services = capabilities.services.clone();
                self.connections.create(data)?
            }
        };

        let response = DidCommMessage::new(
            types::CONNECTION_RESPONSE,
            json!(ConnectionResponseBody {
                label: body.label.clone(),
                did_doc: DidDocument { id: connection.data.my_did.clone(), service: vec![] },
            }),
        )
        .from_did(connection.data.my_did.clone())
        .to_did(their_did.clone())
        .in_thread(message.id.clone());

        if let Err(err) = self.router.route_outbound(response, &connection.id, true).await {
            warn!("Failed to send connection response on `{}`, leaving it in its pre-send state: {}", connection.id, err);
            return Ok(());
        }
        self.connections.update_state(&connection.id, ConnectionState::Responded)?;
        Ok(())
    }

    async fn handle_response(&self, message: DidCommMessage, context: MessageContext) -> Result<(), CoreError> {
        self.persist_inbound(&message, &context)?;

        let body: ConnectionResponseBody = serde_json::from_value(message.body.clone())
            .map_err(|err| CoreError::InvalidMessage(format!("malformed connection response: {err}")))?;

        let their_did = message.from.clone().ok_or_else(|| CoreError::InvalidMessage("connection response has no `from`".to_string()))?;
        let my_did = message.to.as_ref().and_then(|to| to.first()).cloned();

        let Some(connection) = self.locate_connection(my_did.as_deref(), &their_did, &context)? else {
            warn!("Received connection response for an unrecognized connection from `{}`", their_did);
            return Ok(());
        };

        let capabilities = capabilities_from_did_document(&body.did_doc);
        self.connections.update_capabilities(&connection.id, capabilities.endpoint.clone(), capabilities.protocols.clone(), capabilities.services.clone())?;
        self.connections.update_state(&connection.id, ConnectionState::Responded)?;

        let ack = DidCommMessage::new(types::CONNECTION_ACK, json!(ConnectionAckBody::ok()))
            .from_did(connection.data.my_did.clone())
            .to_did(their_did)
            .in_thread(message.id.clone());

        if let Err(err) = self.router.route_outbound(ack, &connection.id, true).await {
            warn!("Failed to send connection ack on `{}`, leaving it in its pre-send state: {}", connection.id, err);
            return Ok(());
        }
        self.connections.update_state(&connection.id, ConnectionState::Complete)?;
        Ok(())
    }

    async fn handle_ack(&self, message: DidCommMessage, context: MessageContext) -> Result<(), CoreError> {
        self.persist_inbound(&message, &context)?;

        let their_did = message.from.clone().unwrap_or_default();
        let my_did = message.to.as_ref().and_then(|to| to.first()).cloned();
        let Some(connection) = self.locate_connection(my_did.as_deref(), &their_did, &context)? else {
            warn!("Received connection ack for an unrecognized connection");
            return Ok(());
        };
        self.connections.update_state(&connection.id, ConnectionState::Complete)?;
        Ok(())
    }
}

#[async_trait]
impl ProtocolHandler for ConnectionProtocolHandler {
    fn name(&self) -> &'static str {
        "connection"
    }

    fn supports(&self, message_type: &str) -> bool {
        message_type.starts_with(uris::CONNECTIONS_1_0)
    }

    async fn handle(&self, message: DidCommMessage, context: MessageContext) -> Result<(), CoreError> {
        match message.type_.as_str() {
            types::CONNECTION_REQUEST => self.handle_request(message, context).await,
            types::CONNECTION_RESPONSE => self.handle_response(message, context).await,
            types::CONNECTION_ACK => self.handle_ack(message, context).await,
            other => Err(CoreError::HandlerNotFound(other.to_string())),
        }
    }
}
