use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use dbn_core::{
    connection_manager::{AcceptInvitationParams, ConnectionManager, CreateInvitationParams},
    error::CoreError,
    registry::ProtocolRegistry,
    router::MessageRouter,
    EventEmitter,
};
use dbn_kms::{CreatedDid, DecryptRequest, DecryptResponse, DidDocument as KmsDidDocument, EncryptRequest, EncryptResponse, KmsClient, KmsError};
use dbn_messages::DidCommMessage;
use dbn_storage::{ConnectionRepository, ConnectionState, MessageRepository, MessageState};
use serde_json::json;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use url::Url;

/// Stands in for a real KMS: `encrypt`/`decrypt` are the identity function on the
/// plaintext (wrapped in a JSON envelope so the shape still resembles a JWE), and
/// `create_did`/`resolve_did_document` hand out deterministic `did:test:N` values with
/// an inline `DIDCommMessaging` service pointing at whatever endpoint was passed in
/// `options`. `encrypt_should_fail` lets a test force a KMS-side failure.
struct FakeKms {
    counter: AtomicUsize,
    endpoints: std::sync::Mutex<std::collections::HashMap<String, String>>,
    encrypt_should_fail: std::sync::atomic::AtomicBool,
}

impl FakeKms {
    fn new() -> Self {
        Self { counter: AtomicUsize::new(0), endpoints: std::sync::Mutex::new(std::collections::HashMap::new()), encrypt_should_fail: std::sync::atomic::AtomicBool::new(false) }
    }

    fn fail_next_encrypt(&self) {
        self.encrypt_should_fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl KmsClient for FakeKms {
    async fn create_did(&self, method: &str, options: serde_json::Value) -> Result<CreatedDid, KmsError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let did = format!("did:test:{method}-{n}");
        let endpoint = options
            .get("services")
            .and_then(|s| s.as_array())
            .and_then(|arr| arr.first())
            .and_then(|s| s.get("serviceEndpoint"))
            .and_then(|e| e.as_str())
            .unwrap_or_default()
            .to_string();
        self.endpoints.lock().expect("mutex").insert(did.clone(), endpoint);
        Ok(CreatedDid { id: did.clone(), did, method: method.to_string(), method_id: n.to_string(), status: "finished".to_string(), metadata: json!({}) })
    }

    async fn resolve_did_document(&self, did: &str) -> Result<KmsDidDocument, KmsError> {
        let endpoint = self.endpoints.lock().expect("mutex").get(did).cloned().unwrap_or_default();
        Ok(KmsDidDocument {
            id: did.to_string(),
            service: vec![json!({"id": format!("{did}#didcomm"), "type": "DIDCommMessaging", "serviceEndpoint": endpoint})],
        })
    }

    async fn revoke_did(&self, _did: &str) -> Result<(), KmsError> {
        Ok(())
    }

    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptResponse, KmsError> {
        if self.encrypt_should_fail.swap(false, Ordering::SeqCst) {
            return Err(KmsError::EncryptionFailed("forced test failure".to_string()));
        }
        Ok(EncryptResponse { jwe: json!({"plaintext": request.plaintext}), kid: "test-kid".to_string(), from: request.from })
    }

    async fn decrypt(&self, request: DecryptRequest) -> Result<DecryptResponse, KmsError> {
        let plaintext = request.jwe.get("plaintext").and_then(|v| v.as_str()).ok_or_else(|| KmsError::DecryptionFailed("missing plaintext".to_string()))?;
        Ok(DecryptResponse { plaintext: plaintext.to_string(), header: json!({}), kid: "test-kid".to_string() })
    }
}

/// Accepts exactly `expected_requests` HTTP requests, responding `200 {}` to each, then
/// shuts down. Used in place of a mocking crate since all we need is "the peer
/// endpoint is reachable and returns success."
async fn spawn_accepting_server(expected_requests: usize) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        for _ in 0..expected_requests {
            let Ok((mut socket, _)) = listener.accept().await else { return };
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let body = b"{}";
            let response = format!("HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n", body.len());
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.write_all(body).await;
        }
    });
    Url::parse(&format!("http://{addr}")).expect("valid url")
}

struct Harness {
    connections: Arc<ConnectionRepository>,
    messages: Arc<MessageRepository>,
    kms: Arc<FakeKms>,
    router: Arc<MessageRouter>,
    manager: Arc<ConnectionManager>,
}

impl Harness {
    fn new(agent_endpoint: Url) -> (Self, Arc<FakeKms>) {
        let connections = Arc::new(ConnectionRepository::new());
        let messages = Arc::new(MessageRepository::new());
        let fake_kms = Arc::new(FakeKms::new());
        let kms: Arc<dyn KmsClient> = fake_kms.clone();
        let registry = Arc::new(ProtocolRegistry::new());
        let router = Arc::new(MessageRouter::new(
            connections.clone(),
            messages.clone(),
            kms.clone(),
            registry,
            std::time::Duration::from_secs(5),
            dbn_messages::protocols::uris::CONNECTIONS_1_0.to_string(),
        ));
        let manager = Arc::new(ConnectionManager::new(connections.clone(), kms.clone(), router.clone(), agent_endpoint, "test-agent".to_string()));
        (Self { connections, messages, kms: fake_kms.clone(), router, manager }, fake_kms)
    }
}

fn invitation_params(target: Option<&str>) -> CreateInvitationParams {
    CreateInvitationParams { my_did_method: "peer".to_string(), label: Some("Inviter".to_string()), goal: None, goal_code: None, target_did: target.map(str::to_string) }
}

#[tokio::test]
async fn targeted_handshake_request_is_delivered_and_connection_advances() {
    let endpoint = spawn_accepting_server(1).await;
    let (inviter, _) = Harness::new(endpoint.clone());

    // Invitee resolves the inviter's target DID via the same fake KMS instance, so
    // build it with a KMS shared between "both sides" by sharing the Arc<FakeKms>.
    let invitee_endpoint = spawn_accepting_server(0).await;
    let connections = Arc::new(ConnectionRepository::new());
    let messages = Arc::new(MessageRepository::new());
    let kms: Arc<dyn KmsClient> = inviter.kms.clone();
    let registry = Arc::new(ProtocolRegistry::new());
    let router = Arc::new(MessageRouter::new(connections.clone(), messages.clone(), kms.clone(), registry, std::time::Duration::from_secs(5), dbn_messages::protocols::uris::CONNECTIONS_1_0.to_string()));
    let invitee_manager = ConnectionManager::new(connections.clone(), kms.clone(), router, invitee_endpoint, "invitee-agent".to_string());

    let target_did = inviter.kms.create_did("peer", json!({"services": []})).await.unwrap().did;
    let created = inviter.manager.create_invitation(invitation_params(Some(&target_did))).await.expect("invitation created");
    assert_eq!(created.connection.data.state, ConnectionState::Invited);

    let accepted = invitee_manager
        .accept_invitation(AcceptInvitationParams { invitation: created.invitation_url, my_did: target_did, label: Some("Invitee".to_string()) })
        .await
        .expect("invitation accepted");
    assert_eq!(accepted.data.state.normalize(), ConnectionState::Requested);
}

#[tokio::test]
async fn accept_invitation_rejects_wrong_target() {
    let endpoint = spawn_accepting_server(0).await;
    let (inviter, _) = Harness::new(endpoint);
    let real_target = inviter.kms.create_did("peer", json!({"services": []})).await.unwrap().did;
    let created = inviter.manager.create_invitation(invitation_params(Some(&real_target))).await.unwrap();

    let err = inviter
        .manager
        .accept_invitation(AcceptInvitationParams { invitation: created.invitation_url, my_did: "did:test:someone-else".to_string(), label: None })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvitationNotForYou));
}

#[tokio::test]
async fn route_outbound_rejects_send_before_active() {
    let endpoint = spawn_accepting_server(0).await;
    let (harness, _) = Harness::new(endpoint);
    let created = harness.manager.create_invitation(invitation_params(None)).await.unwrap();

    let message = DidCommMessage::new(dbn_messages::protocols::types::BASIC_MESSAGE, json!({"content": "hi"}));
    let err = harness.router.route_outbound(message, &created.connection.id, false).await.unwrap_err();
    assert!(matches!(err, CoreError::ConnectionNotActive(_)));
}

#[tokio::test]
async fn encryption_failure_is_recorded_as_failed_message() {
    let endpoint = spawn_accepting_server(0).await;
    let (harness, fake_kms) = Harness::new(endpoint.clone());
    let created = harness.manager.create_invitation(invitation_params(None)).await.unwrap();
    harness.connections.update_state(&created.connection.id, ConnectionState::Complete).unwrap();
    harness.connections.update_capabilities(&created.connection.id, Some(endpoint.to_string()), vec![], vec![]).unwrap();

    fake_kms.fail_next_encrypt();
    let message = DidCommMessage::new(dbn_messages::protocols::types::BASIC_MESSAGE, json!({"content": "hi"}));
    let message_id = message.id.clone();
    let err = harness.router.route_outbound(message, &created.connection.id, false).await.unwrap_err();
    assert!(matches!(err, CoreError::DeliveryFailed(_)));

    let row = harness.messages.find_by_message_id(&message_id).unwrap().expect("row recorded");
    assert!(matches!(row.data.state, MessageState::Failed));
}

#[tokio::test]
async fn retry_of_failed_message_succeeds_once_peer_is_reachable() {
    let endpoint = spawn_accepting_server(1).await;
    let (harness, fake_kms) = Harness::new(endpoint.clone());
    let created = harness.manager.create_invitation(invitation_params(None)).await.unwrap();
    harness.connections.update_state(&created.connection.id, ConnectionState::Complete).unwrap();
    harness.connections.update_capabilities(&created.connection.id, Some(endpoint.to_string()), vec![], vec![]).unwrap();

    fake_kms.fail_next_encrypt();
    let message = DidCommMessage::new(dbn_messages::protocols::types::BASIC_MESSAGE, json!({"content": "hi"}));
    let message_id = message.id.clone();
    harness.router.route_outbound(message, &created.connection.id, false).await.unwrap_err();

    harness.router.retry_message(&message_id).await.expect("retry succeeds");
    let row = harness.messages.find_by_message_id(&message_id).unwrap().expect("row recorded");
    assert!(matches!(row.data.state, MessageState::Sent));
    assert_eq!(row.data.retry_count, 1);
}

#[tokio::test]
async fn inbound_basic_message_reaches_the_event_bus() {
    let connections = Arc::new(ConnectionRepository::new());
    let messages = Arc::new(MessageRepository::new());
    let fake_kms = Arc::new(FakeKms::new());
    let kms: Arc<dyn KmsClient> = fake_kms.clone();

    let events = Arc::new(dbn_core::BasicMessageEventBus::new());
    let receiver = events.register_event_receiver();

    let registry = Arc::new(ProtocolRegistry::new().register(
        dbn_messages::protocols::types::BASIC_MESSAGE,
        Box::new(dbn_core::handlers::BasicMessageHandler::new(messages.clone(), events.clone())),
    ));
    let router = MessageRouter::new(connections, messages, kms, registry, std::time::Duration::from_secs(5), dbn_messages::protocols::uris::CONNECTIONS_1_0.to_string());

    let plaintext = DidCommMessage::new(dbn_messages::protocols::types::BASIC_MESSAGE, json!({"content": "hello there"}))
        .from_did("did:test:sender")
        .to_did("did:test:recipient")
        .to_json_string()
        .unwrap();
    let jwe = json!({"plaintext": plaintext});

    router.route_inbound(jwe, "did:test:recipient").await.expect("routes to the basic message handler");

    let event = receiver.try_recv().expect("event delivered");
    assert_eq!(event.content, "hello there");
    assert_eq!(event.from_did.as_deref(), Some("did:test:sender"));
}
