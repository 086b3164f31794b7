use dbn_kms::KmsError;
use dbn_messages::{MessageError, OobError};
use dbn_storage::{RepositoryError, StorageError};
use thiserror::Error;

/// The top-level error enum for the core. Every variant maps 1:1 to a wire error
/// code via [`CoreError::code`]. Lower layers (`RepositoryError`, `KmsError`,
/// `MessageError`) each own their own enum and are wrapped here with `#[source]`
/// rather than collapsed, since this is the outermost seam a consumer sees.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("failed to create a peer DID")]
    PeerDidCreationFailed(#[source] KmsError),
    #[error("invalid out-of-band invitation")]
    InvalidInvitation(#[source] OobError),
    #[error("invitation is not addressed to this DID")]
    InvitationNotForYou,
    #[error("failed to resolve peer DID document")]
    DidResolutionFailed(#[source] KmsError),
    #[error("a connection already exists for this (myDid, theirDid) pair")]
    ConnectionAlreadyExists,
    #[error("connection `{0}` not found")]
    ConnectionNotFound(String),
    #[error("connection `{0}` is not in a state that permits this operation")]
    ConnectionNotActive(String),
    #[error("connection `{0}` has no known endpoint")]
    NoEndpoint(String),
    #[error("a message already exists with messageId `{0}`")]
    MessageAlreadyExists(String),
    #[error("message `{0}` is not in a state that permits this operation")]
    InvalidMessageState(String),
    #[error("message is malformed: {0}")]
    InvalidMessage(String),
    #[error("no protocol handler registered for message type `{0}`")]
    HandlerNotFound(String),
    #[error("failed to route inbound message")]
    RoutingFailed(#[source] KmsError),
    #[error("failed to deliver message")]
    DeliveryFailed(String),
    #[error("delivery timed out")]
    DeliveryTimeout,
    #[error("storage error")]
    Storage(#[source] RepositoryError),
    #[error("message codec error")]
    Message(#[source] MessageError),
}

impl CoreError {
    /// The machine-readable error code a REST binding would surface verbatim in its
    /// `{success:false, error:{code, message}}` response body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PeerDidCreationFailed(_) => "PEER_DID_CREATION_FAILED",
            Self::InvalidInvitation(_) => "INVALID_INVITATION",
            Self::InvitationNotForYou => "INVITATION_NOT_FOR_YOU",
            Self::DidResolutionFailed(_) => "DID_RESOLUTION_FAILED",
            Self::ConnectionAlreadyExists => "CONNECTION_ALREADY_EXISTS",
            Self::ConnectionNotFound(_) => "CONNECTION_NOT_FOUND",
            Self::ConnectionNotActive(_) => "CONNECTION_NOT_ACTIVE",
            Self::NoEndpoint(_) => "NO_ENDPOINT",
            Self::MessageAlreadyExists(_) => "MESSAGE_ALREADY_EXISTS",
            Self::InvalidMessageState(_) => "INVALID_MESSAGE_STATE",
            Self::InvalidMessage(_) => "INVALID_MESSAGE",
            Self::HandlerNotFound(_) => "HANDLER_NOT_FOUND",
            Self::RoutingFailed(_) => "ROUTING_FAILED",
            Self::DeliveryFailed(_) => "DELIVERY_FAILED",
            Self::DeliveryTimeout => "DELIVERY_TIMEOUT",
            Self::Storage(_) => "INTERNAL",
            Self::Message(_) => "INVALID_MESSAGE",
        }
    }
}

impl From<RepositoryError> for CoreError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::ConnectionAlreadyExists => Self::ConnectionAlreadyExists,
            RepositoryError::MessageAlreadyExists(id) => Self::MessageAlreadyExists(id),
            RepositoryError::NotFound(id) => Self::ConnectionNotFound(id),
            other => Self::Storage(other),
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        Self::Storage(RepositoryError::GetFailed(err))
    }
}

impl From<MessageError> for CoreError {
    fn from(err: MessageError) -> Self {
        Self::Message(err)
    }
}
