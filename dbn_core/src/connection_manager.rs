use std::{sync::Arc, time::Instant};

use dbn_kms::KmsClient;
use dbn_messages::{
    protocols::{trust_ping::PingBody, types},
    DidCommMessage, OobService, OutOfBandInvitation,
};
use dbn_storage::{
    ConnectionRecordData, ConnectionRepository, ConnectionRole, ConnectionState, Record,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    capability::{discover_capabilities, Capabilities},
    error::CoreError,
    router::MessageRouter,
};

pub struct CreateInvitationParams {
    pub my_did_method: String,
    pub label: Option<String>,
    pub goal: Option<String>,
    pub goal_code: Option<String>,
    pub target_did: Option<String>,
}

pub struct CreatedInvitation {
    pub connection: Record<ConnectionRecordData, dbn_storage::ConnectionRecordTagKeys>,
    pub invitation: OutOfBandInvitation,
    pub invitation_url: String,
}

pub struct AcceptInvitationParams {
    pub invitation: String,
    pub my_did: String,
    pub label: Option<String>,
}

pub struct PingResult {
    pub success: bool,
    pub response_time_ms: Option<u128>,
}

/// Orchestrates peer-DID creation, the out-of-band invitation lifecycle, and the
/// connection handshake state machine. The strict half of the two-layer state
/// validation described on [`ConnectionState::can_transition_to`] — unlike the
/// repository's advisory `update_state`, a caller here gets a hard error on an
/// illegal transition.
pub struct ConnectionManager {
    connections: Arc<ConnectionRepository>,
    kms: Arc<dyn KmsClient>,
    router: Arc<MessageRouter>,
    agent_endpoint: url::Url,
    agent_label: String,
    connections_protocol: String,
}

impl ConnectionManager {
    pub fn new(
        connections: Arc<ConnectionRepository>,
        kms: Arc<dyn KmsClient>,
        router: Arc<MessageRouter>,
        agent_endpoint: url::Url,
        agent_label: String,
    ) -> Self {
        Self {
            connections,
            kms,
            router,
            agent_endpoint,
            agent_label,
            connections_protocol: dbn_messages::protocols::uris::CONNECTIONS_1_0.to_string(),
        }
    }

    async fn create_peer_did(&self, method: &str) -> Result<String, CoreError> {
        let options = json!({
            "services": [{
                "type": "DIDCommMessaging",
                "serviceEndpoint": self.agent_endpoint.to_string(),
            }]
        });
        let created = self.kms.create_did(method, options).await.map_err(CoreError::PeerDidCreationFailed)?;
        Ok(created.did)
    }

    pub async fn create_invitation(&self, params: CreateInvitationParams) -> Result<CreatedInvitation, CoreError> {
        let correlation_id = Uuid::new_v4().to_string();
        let my_did = self.create_peer_did(&params.my_did_method).await?;

        let service = OobService::Inline(dbn_messages::oob::InlineService {
            id: format!("{my_did}#didcomm"),
            type_: "DIDCommMessaging".to_string(),
            service_endpoint: json!(self.agent_endpoint.to_string()),
            protocols: vec![self.connections_protocol.clone()],
        });
        let mut invitation = OutOfBandInvitation::new(service, correlation_id.clone())
            .with_label(params.label.clone().or_else(|| Some(self.agent_label.clone())))
            .with_target(params.target_did.clone());
        invitation.goal = params.goal.clone();
        invitation.goal_code = params.goal_code.clone();
        let invitation_url = invitation.encode_url().map_err(CoreError::InvalidInvitation)?;

        let their_did = params.target_did.clone().unwrap_or_default();
        let mut data = ConnectionRecordData::new(my_did, their_did, ConnectionRole::Inviter, ConnectionState::Invited);
        data.invitation = Some(invitation.clone());
        data.invitation_url = Some(invitation_url.clone());
        data.metadata.correlation_id = Some(correlation_id);
        data.metadata.invitation_type = Some(if params.target_did.is_some() {
            dbn_storage::connection::InvitationType::Targeted
        } else {
            dbn_storage::connection::InvitationType::Open
        });

        let connection = self.connections.create(data)?;
        info!("Created invitation `{}` for connection `{}`", invitation.id, connection.id);
        Ok(CreatedInvitation { connection, invitation, invitation_url })
    }

    pub async fn accept_invitation(&self, params: AcceptInvitationParams) -> Result<Record<ConnectionRecordData, dbn_storage::ConnectionRecordTagKeys>, CoreError> {
        let invitation = OutOfBandInvitation::decode(&params.invitation).map_err(CoreError::InvalidInvitation)?;

        if let Some(target) = &invitation.target_did {
            if target != &params.my_did {
                return Err(CoreError::InvitationNotForYou);
            }
        }

        let service = invitation.services.first().ok_or(CoreError::InvalidInvitation(dbn_messages::OobError::MissingOobParam))?;
        let their_did = service.their_did().to_string();

        let (capabilities, fell_back_to_inline) = self.resolve_service_capabilities(service).await?;

        if self.connections.find_by_pair(&params.my_did, &their_did)?.is_some() {
            return Err(CoreError::ConnectionAlreadyExists);
        }

        let my_did = self.create_peer_did("peer").await?;

        let mut data = ConnectionRecordData::new(my_did.clone(), their_did.clone(), ConnectionRole::Invitee, ConnectionState::Requested);
        data.their_endpoint = capabilities.endpoint.clone();
        data.their_protocols = capabilities.protocols;
        data.their_services = capabilities.services;
        data.their_label = invitation.label.clone().or(params.label.clone());
        data.metadata.correlation_id = invitation.correlation_id.clone().or_else(|| Some(Uuid::new_v4().to_string()));
        if fell_back_to_inline {
            debug!("Falling back to inline service block for connection to `{}`", their_did);
        }

        let connection = self.connections.create(data)?;

        if connection.data.their_endpoint.is_some() {
            let request = DidCommMessage::new(
                types::CONNECTION_REQUEST,
                json!({
                    "label": params.label.clone().unwrap_or_else(|| self.agent_label.clone()),
                    "invitation_id": invitation.id,
                    "did_doc": { "id": my_did, "service": [] },
                }),
            )
            .from_did(my_did.clone())
            .to_did(their_did.clone());

            if let Err(err) = self.router.route_outbound(request, &connection.id, true).await {
                warn!("Outbound connection request to `{}` failed, connection stays `requested`: {}", their_did, err);
                let mut record = self.connections.get(&connection.id)?.ok_or_else(|| CoreError::ConnectionNotFound(connection.id.clone()))?;
                record.data.outbound_request_failed = true;
                self.connections.add_or_update(record)?;
            }
        }

        self.connections.get(&connection.id)?.ok_or_else(|| CoreError::ConnectionNotFound(connection.id))
    }

    async fn resolve_service_capabilities(&self, service: &OobService) -> Result<(Capabilities, bool), CoreError> {
        match service {
            OobService::Did(did) => {
                let capabilities = discover_capabilities(&self.kms, did).await.map_err(CoreError::DidResolutionFailed)?;
                Ok((capabilities, false))
            }
            OobService::Inline(inline) => {
                match discover_capabilities(&self.kms, &inline.id).await {
                    Ok(capabilities) if capabilities.endpoint.is_some() => Ok((capabilities, false)),
                    _ => {
                        let endpoint = inline.service_endpoint.as_str().map(str::to_string);
                        Ok((Capabilities { endpoint, protocols: inline.protocols.clone(), services: vec![] }, true))
                    }
                }
            }
        }
    }

    pub fn get_connection(&self, id: &str) -> Result<Option<Record<ConnectionRecordData, dbn_storage::ConnectionRecordTagKeys>>, CoreError> {
        Ok(self.connections.get(id)?)
    }

    pub fn list_connections(&self) -> Result<Vec<Record<ConnectionRecordData, dbn_storage::ConnectionRecordTagKeys>>, CoreError> {
        Ok(self.connections.list()?)
    }

    /// Strict state transition, rejecting anything `ConnectionState::can_transition_to`
    /// disallows. This is the layer `retryMessage`/handshake handlers call through
    /// when *they* require correctness; the repository's own `update_state` stays
    /// advisory for callers tolerating out-of-order protocol messages.
    pub fn update_connection_state(&self, id: &str, next: ConnectionState) -> Result<(), CoreError> {
        let connection = self.connections.get(id)?.ok_or_else(|| CoreError::ConnectionNotFound(id.to_string()))?;
        if !connection.data.state.can_transition_to(next) {
            return Err(CoreError::ConnectionNotActive(id.to_string()));
        }
        self.connections.update_state(id, next)?;
        Ok(())
    }

    pub async fn refresh_capabilities(&self, id: &str) -> Result<(), CoreError> {
        let connection = self.connections.get(id)?.ok_or_else(|| CoreError::ConnectionNotFound(id.to_string()))?;
        if connection.data.their_did.is_empty() {
            return Err(CoreError::ConnectionNotFound(id.to_string()));
        }
        let capabilities = discover_capabilities(&self.kms, &connection.data.their_did).await.map_err(CoreError::DidResolutionFailed)?;
        self.connections.update_capabilities(id, capabilities.endpoint, capabilities.protocols, capabilities.services)?;
        Ok(())
    }

    pub async fn delete_connection(&self, id: &str) -> Result<(), CoreError> {
        let connection = self.connections.get(id)?.ok_or_else(|| CoreError::ConnectionNotFound(id.to_string()))?;
        if let Err(err) = self.kms.revoke_did(&connection.data.my_did).await {
            warn!("Failed to revoke peer DID `{}` during connection deletion: {}", connection.data.my_did, err);
        }
        self.connections.delete(id)?;
        Ok(())
    }

    pub async fn ping(&self, id: &str) -> Result<PingResult, CoreError> {
        let connection = self.connections.get(id)?.ok_or_else(|| CoreError::ConnectionNotFound(id.to_string()))?;
        if !connection.data.state.is_transmittable() {
            return Err(CoreError::ConnectionNotActive(id.to_string()));
        }

        let ping = DidCommMessage::new(types::TRUST_PING, json!(PingBody { comment: None, response_requested: true }))
            .from_did(connection.data.my_did.clone())
            .to_did(connection.data.their_did.clone());

        let start = Instant::now();
        match self.router.route_outbound(ping, id, false).await {
            Ok(()) => Ok(PingResult { success: true, response_time_ms: Some(start.elapsed().as_millis()) }),
            Err(_) => Ok(PingResult { success: false, response_time_ms: None }),
        }
    }
}
