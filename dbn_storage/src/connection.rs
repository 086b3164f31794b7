use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dbn_messages::OutOfBandInvitation;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ConnectionRecordTagKeys {
    MyDid,
    TheirDid,
    InvitationId,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionRole {
    Inviter,
    Invitee,
}

/// `active`/`completed` are read-time aliases of the canonical `Complete`; writers
/// always persist `Complete`, and [`ConnectionState::normalize`] collapses a record
/// read from storage written by an older alias onto the canonical set.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Invited,
    Requested,
    Responded,
    Complete,
    Active,
    Completed,
    Error,
}

impl ConnectionState {
    #[must_use]
    pub fn normalize(self) -> Self {
        match self {
            Self::Active | Self::Completed => Self::Complete,
            other => other,
        }
    }

    /// Whether a connection in this state may be used as the target of an outbound
    /// message that doesn't belong to the handshake protocol itself.
    pub fn is_transmittable(self) -> bool {
        matches!(self.normalize(), Self::Complete)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self.normalize(), Self::Complete | Self::Error)
    }

    /// Whether `next` is a legal transition from `self`, per the handshake state
    /// machine. The repository's `update_state` uses this only for an advisory
    /// warning; `ConnectionManager` uses it to reject invalid requests outright.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{Complete, Error, Invited, Requested, Responded};
        let (from, to) = (self.normalize(), next.normalize());
        if from == to {
            return true;
        }
        matches!(
            (from, to),
            (Invited, Requested)
                | (Requested, Responded)
                | (Responded, Complete)
                | (Invited | Requested | Responded, Error)
                | (Error, Invited | Requested)
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InvitationType {
    #[default]
    Open,
    Targeted,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionMetadata {
    pub correlation_id: Option<String>,
    pub invitation_type: Option<InvitationType>,
    #[serde(default)]
    pub notes: HashMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecordData {
    pub my_did: String,
    pub their_did: String,
    pub role: ConnectionRole,
    pub state: ConnectionState,
    pub their_label: Option<String>,
    pub their_endpoint: Option<String>,
    #[serde(default)]
    pub their_protocols: Vec<String>,
    #[serde(default)]
    pub their_services: Vec<serde_json::Value>,
    pub invitation: Option<OutOfBandInvitation>,
    pub invitation_url: Option<String>,
    #[serde(default)]
    pub metadata: ConnectionMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_active_at: Option<DateTime<Utc>>,
    /// Set when `state == Error`; non-enforced elsewhere in the record.
    #[serde(default)]
    pub outbound_request_failed: bool,
}

impl ConnectionRecordData {
    pub fn new(my_did: String, their_did: String, role: ConnectionRole, state: ConnectionState) -> Self {
        let now = Utc::now();
        Self {
            my_did,
            their_did,
            role,
            state,
            their_label: None,
            their_endpoint: None,
            their_protocols: vec![],
            their_services: vec![],
            invitation: None,
            invitation_url: None,
            metadata: ConnectionMetadata::default(),
            created_at: now,
            updated_at: now,
            last_active_at: None,
            outbound_request_failed: false,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn mark_active(&mut self) {
        self.touch();
        self.last_active_at = Some(self.updated_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_and_completed_normalize_to_complete() {
        assert_eq!(ConnectionState::Active.normalize(), ConnectionState::Complete);
        assert_eq!(ConnectionState::Completed.normalize(), ConnectionState::Complete);
    }

    #[test]
    fn valid_handshake_transitions_are_allowed() {
        assert!(ConnectionState::Invited.can_transition_to(ConnectionState::Requested));
        assert!(ConnectionState::Requested.can_transition_to(ConnectionState::Responded));
        assert!(ConnectionState::Responded.can_transition_to(ConnectionState::Complete));
        assert!(!ConnectionState::Invited.can_transition_to(ConnectionState::Complete));
    }

    #[test]
    fn error_state_permits_operator_retry() {
        assert!(ConnectionState::Error.can_transition_to(ConnectionState::Invited));
        assert!(ConnectionState::Error.can_transition_to(ConnectionState::Requested));
        assert!(!ConnectionState::Error.can_transition_to(ConnectionState::Complete));
    }

    #[test]
    fn complete_is_terminal() {
        assert!(ConnectionState::Complete.is_terminal());
        assert!(!ConnectionState::Complete.can_transition_to(ConnectionState::Requested));
    }
}
