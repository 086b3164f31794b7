use std::sync::Arc;

use dbn_kms::{HttpKmsClient, KmsClient};
use dbn_storage::{ConnectionRepository, MessageRepository};

use crate::{
    config::CoreConfig,
    connection_manager::ConnectionManager,
    events::BasicMessageEventBus,
    handlers::{BasicMessageHandler, ConnectionProtocolHandler, TrustPingHandler},
    registry::ProtocolRegistry,
    router::MessageRouter,
};

/// The composition root: owns every collaborator behind an `Arc` and wires the
/// built-in protocol handlers into a [`ProtocolRegistry`] at construction time.
/// There is no global or thread-local state anywhere in this crate; everything a
/// caller needs flows through this struct.
pub struct DbnFramework {
    pub config: CoreConfig,
    pub connections: Arc<ConnectionRepository>,
    pub messages: Arc<MessageRepository>,
    pub kms: Arc<dyn KmsClient>,
    pub router: Arc<MessageRouter>,
    pub connection_manager: Arc<ConnectionManager>,
    pub basic_message_events: Arc<BasicMessageEventBus>,
}

impl DbnFramework {
    pub fn initialize(config: CoreConfig) -> Self {
        info!("Initializing DIDComm core with agent label `{}`", config.agent_label);

        let kms: Arc<dyn KmsClient> = Arc::new(HttpKmsClient::with_timeout(config.kms_base_url.clone(), config.http_timeout));
        let connections = Arc::new(ConnectionRepository::new());
        let messages = Arc::new(MessageRepository::new());
        let basic_message_events = Arc::new(BasicMessageEventBus::new());

        // Handlers need a router to send auto-responses (connection response/ack,
        // trust ping pong) through, but the router needs a populated registry to
        // dispatch inbound messages to those same handlers. Break the cycle with a
        // throwaway router built against an empty registry just for handler
        // construction, then build the real router once the registry is whole.
        let bootstrap_router = Arc::new(MessageRouter::new(
            connections.clone(),
            messages.clone(),
            kms.clone(),
            Arc::new(ProtocolRegistry::new()),
            config.http_timeout,
            config.allow_handshake_protocol.clone(),
        ));

        let registry = Arc::new(
            ProtocolRegistry::new()
                .register(
                    dbn_messages::protocols::types::CONNECTION_REQUEST,
                    Box::new(ConnectionProtocolHandler::new(connections.clone(), messages.clone(), bootstrap_router.clone())),
                )
                .register(
                    dbn_messages::protocols::types::CONNECTION_RESPONSE,
                    Box::new(ConnectionProtocolHandler::new(connections.clone(), messages.clone(), bootstrap_router.clone())),
                )
                .register(
                    dbn_messages::protocols::types::CONNECTION_ACK,
                    Box::new(ConnectionProtocolHandler::new(connections.clone(), messages.clone(), bootstrap_router.clone())),
                )
                .register(
                    dbn_messages::protocols::types::TRUST_PING,
                    Box::new(TrustPingHandler::new(connections.clone(), messages.clone(), bootstrap_router.clone())),
                )
                .register(
                    dbn_messages::protocols::types::BASIC_MESSAGE,
                    Box::new(BasicMessageHandler::new(messages.clone(), basic_message_events.clone())),
                ),
        );

        let router = Arc::new(MessageRouter::new(
            connections.clone(),
            messages.clone(),
            kms.clone(),
            registry,
            config.http_timeout,
            config.allow_handshake_protocol.clone(),
        ));

        let connection_manager = Arc::new(ConnectionManager::new(
            connections.clone(),
            kms.clone(),
            router.clone(),
            config.agent_endpoint.clone(),
            config.agent_label.clone(),
        ));

        Self { config, connections, messages, kms, router, connection_manager, basic_message_events }
    }
}
