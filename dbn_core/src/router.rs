use std::{sync::Arc, time::Duration};

use dbn_kms::{DecryptRequest, EncryptRequest, KmsClient};
use dbn_messages::DidCommMessage;
use dbn_storage::{ConnectionRepository, ConnectionState, MessageRecordData, MessageRepository, MessageState};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::{
    error::CoreError,
    registry::{MessageContext, ProtocolRegistry},
};

/// The pipeline component: routes outbound messages (store-pending -> encrypt ->
/// deliver -> mark-sent/failed) and inbound messages (decrypt -> parse -> correlate
/// -> dispatch via the [`ProtocolRegistry`]).
pub struct MessageRouter {
    connections: Arc<ConnectionRepository>,
    messages: Arc<MessageRepository>,
    kms: Arc<dyn KmsClient>,
    registry: Arc<ProtocolRegistry>,
    http: reqwest::Client,
    timeout: Duration,
    allow_handshake_protocol: String,
}

impl MessageRouter {
    pub fn new(
        connections: Arc<ConnectionRepository>,
        messages: Arc<MessageRepository>,
        kms: Arc<dyn KmsClient>,
        registry: Arc<ProtocolRegistry>,
        timeout: Duration,
        allow_handshake_protocol: String,
    ) -> Self {
        Self { connections, messages, kms, registry, http: reqwest::Client::new(), timeout, allow_handshake_protocol }
    }

    fn is_handshake_message(&self, message: &DidCommMessage) -> bool {
        message.protocol_uri() == self.allow_handshake_protocol
    }

    /// Routes an outbound message against `connection_id`. `allow_handshake` is an
    /// explicit parameter rather than inferred from message content so the one
    /// permitted exception — the connection protocol's own auto-response path
    /// calling in before the connection reaches `complete` — is visible at every call
    /// site instead of hidden inside this function.
    pub async fn route_outbound(&self, message: DidCommMessage, connection_id: &str, allow_handshake: bool) -> Result<(), CoreError> {
        let connection = self
            .connections
            .get(connection_id)?
            .ok_or_else(|| CoreError::ConnectionNotFound(connection_id.to_string()))?;

        let transmittable = connection.data.state.is_transmittable()
            || (allow_handshake && self.is_handshake_message(&message));
        if !transmittable {
            return Err(CoreError::ConnectionNotActive(connection_id.to_string()));
        }

        let their_endpoint = connection
            .data
            .their_endpoint
            .clone()
            .ok_or_else(|| CoreError::NoEndpoint(connection_id.to_string()))?;

        let row = match self.messages.find_by_message_id(&message.id)? {
            Some(existing) => existing,
            None => {
                let mut data = MessageRecordData::new_outbound(
                    message.id.clone(),
                    message.type_.clone(),
                    connection.data.my_did.clone(),
                    connection.data.their_did.clone(),
                    message.body.clone(),
                );
                data.connection_id = Some(connection_id.to_string());
                data.thread_id = message.thread.thid.clone();
                self.messages.create(data)?
            }
        };

        self.encrypt_and_deliver(&row.id, &message, &connection.data.my_did, &connection.data.their_did, &their_endpoint).await
    }

    async fn encrypt_and_deliver(
        &self,
        message_row_id: &str,
        message: &DidCommMessage,
        my_did: &str,
        their_did: &str,
        their_endpoint: &str,
    ) -> Result<(), CoreError> {
        let plaintext = message.to_json_string()?;
        let encrypted = self.kms.encrypt(EncryptRequest { to: their_did.to_string(), plaintext, from: Some(my_did.to_string()) }).await;
        let jwe = match encrypted {
            Ok(response) => response.jwe,
            Err(err) => {
                self.messages.mark_failed(message_row_id, err.to_string())?;
                return Err(CoreError::DeliveryFailed(err.to_string()));
            }
        };

        let request = self.http.post(their_endpoint).header(CONTENT_TYPE, "application/didcomm-encrypted+json").json(&jwe).send();
        let response = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                self.messages.mark_failed(message_row_id, err.to_string())?;
                return Err(CoreError::DeliveryFailed(err.to_string()));
            }
            Err(_) => {
                self.messages.mark_failed(message_row_id, "delivery timed out")?;
                return Err(CoreError::DeliveryTimeout);
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            self.messages.mark_failed(message_row_id, format!("peer returned status {status}"))?;
            return Err(CoreError::DeliveryFailed(format!("peer returned status {status}")));
        }

        self.messages.mark_sent(message_row_id)?;
        info!("Delivered message to `{}` via `{}`", their_did, their_endpoint);
        Ok(())
    }

    /// Requires the message to be `failed` and its connection transmittable, then
    /// re-runs encryption and delivery against the *same* row, incrementing
    /// `retryCount` regardless of outcome.
    pub async fn retry_message(&self, message_id: &str) -> Result<(), CoreError> {
        let row = self
            .messages
            .find_by_message_id(message_id)?
            .ok_or_else(|| CoreError::InvalidMessageState(message_id.to_string()))?;
        if !matches!(row.data.state, MessageState::Failed) {
            return Err(CoreError::InvalidMessageState(message_id.to_string()));
        }
        let connection_id = row.data.connection_id.clone().ok_or_else(|| CoreError::ConnectionNotActive(message_id.to_string()))?;
        let connection = self
            .connections
            .get(&connection_id)?
            .ok_or_else(|| CoreError::ConnectionNotFound(connection_id.clone()))?;
        if !connection.data.state.is_transmittable() {
            return Err(CoreError::ConnectionNotActive(connection_id));
        }
        let their_endpoint = connection.data.their_endpoint.clone().ok_or_else(|| CoreError::NoEndpoint(connection_id.clone()))?;

        self.messages.increment_retry(&row.id)?;

        let message = DidCommMessage {
            id: row.data.message_id.clone(),
            type_: row.data.type_.clone(),
            from: row.data.from_did.clone(),
            to: Some(row.data.to_dids.clone()),
            thread: dbn_messages::decorators::ThreadDecorator { thid: row.data.thread_id.clone(), pthid: None },
            created_time: Some(row.data.created_at.timestamp()),
            body: row.data.body.clone(),
            attachments: vec![],
        };

        self.encrypt_and_deliver(&row.id, &message, &connection.data.my_did, &connection.data.their_did, &their_endpoint).await
    }

    /// Decrypts an inbound JWE, parses it as a plaintext DIDComm message, attempts
    /// connection correlation, and dispatches it via the [`ProtocolRegistry`]. A
    /// missing connection is not fatal — handshake messages establish one.
    pub async fn route_inbound(&self, jwe: Value, recipient_did: &str) -> Result<(), CoreError> {
        let decrypted = self
            .kms
            .decrypt(DecryptRequest { did: recipient_did.to_string(), jwe })
            .await
            .map_err(CoreError::RoutingFailed)?;

        let message = DidCommMessage::from_json_str(&decrypted.plaintext)?;

        let connection_id = match &message.from {
            Some(their_did) => self.connections.find_by_pair(recipient_did, their_did)?.map(|record| record.id),
            None => None,
        };

        let context = MessageContext::inbound(connection_id);
        self.registry.route(message, context).await
    }
}
