use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    base::Storage,
    connection::{ConnectionRecordData, ConnectionRecordTagKeys, ConnectionState},
    error::RepositoryError,
    in_memory::InMemoryStorage,
    record::Record,
};

/// Stores and indexes [`ConnectionRecordData`] by id, `(myDid, theirDid)`, and
/// `invitationId`, enforcing `(myDid, theirDid)` uniqueness on create.
///
/// The store is hard-wired to [`InMemoryStorage`] since no other backend is in scope,
/// but the generic [`Storage`] trait itself stays backend-agnostic so a different
/// implementation can be swapped in without touching this repository's API.
pub struct ConnectionRepository {
    store: InMemoryStorage<ConnectionRecordData, ConnectionRecordTagKeys>,
}

impl Default for ConnectionRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRepository {
    pub fn new() -> Self {
        Self { store: InMemoryStorage::new() }
    }

    fn pair_tag(my_did: &str, their_did: &str) -> String {
        format!("{my_did}|{their_did}")
    }

    pub fn create(&self, data: ConnectionRecordData) -> Result<Record<ConnectionRecordData, ConnectionRecordTagKeys>, RepositoryError> {
        if self.find_by_pair(&data.my_did, &data.their_did)?.is_some() && !data.their_did.is_empty() {
            return Err(RepositoryError::ConnectionAlreadyExists);
        }
        let id = Uuid::new_v4().to_string();
        let mut tags = HashMap::new();
        tags.insert(ConnectionRecordTagKeys::MyDid, data.my_did.clone());
        tags.insert(ConnectionRecordTagKeys::TheirDid, data.their_did.clone());
        if let Some(correlation_id) = data.metadata.correlation_id.clone() {
            tags.insert(ConnectionRecordTagKeys::InvitationId, correlation_id);
        }
        let record = Record::new(id.clone(), data, Some(tags));
        trace!("Adding ConnectionRecord '{}' to storage", id);
        self.store.add_record(record.clone()).map_err(RepositoryError::AddOrUpdateFailed)?;
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<Option<Record<ConnectionRecordData, ConnectionRecordTagKeys>>, RepositoryError> {
        self.store.get_record(id).map_err(RepositoryError::GetFailed)
    }

    pub fn list(&self) -> Result<Vec<Record<ConnectionRecordData, ConnectionRecordTagKeys>>, RepositoryError> {
        self.store.get_all_records().map_err(RepositoryError::ListFailed)
    }

    pub fn find_by_pair(&self, my_did: &str, their_did: &str) -> Result<Option<Record<ConnectionRecordData, ConnectionRecordTagKeys>>, RepositoryError> {
        let by_my_did = self
            .store
            .search_records(&ConnectionRecordTagKeys::MyDid, my_did)
            .map_err(RepositoryError::SearchFailed)?;
        Ok(by_my_did.into_iter().find(|record| record.data.their_did == their_did))
    }

    pub fn find_by_invitation_id(&self, correlation_id: &str) -> Result<Vec<Record<ConnectionRecordData, ConnectionRecordTagKeys>>, RepositoryError> {
        self.store
            .search_records(&ConnectionRecordTagKeys::InvitationId, correlation_id)
            .map_err(RepositoryError::SearchFailed)
    }

    pub fn add_or_update(&self, record: Record<ConnectionRecordData, ConnectionRecordTagKeys>) -> Result<(), RepositoryError> {
        self.store.add_or_update_record(record).map_err(RepositoryError::AddOrUpdateFailed)
    }

    /// Advisory state transition: logs a warning on an invalid transition per the
    /// repository's state machine, but never rejects the write (out-of-order protocol
    /// messages under partial failure must still be tolerated). Strict enforcement
    /// lives in `ConnectionManager::update_connection_state`.
    pub fn update_state(&self, id: &str, next: ConnectionState) -> Result<(), RepositoryError> {
        let Some(mut record) = self.get(id)? else {
            return Err(RepositoryError::NotFound(id.to_string()));
        };
        if !record.data.state.can_transition_to(next) {
            warn!(
                "Connection '{}' transitioning {:?} -> {:?} is not a recognized handshake transition; persisting anyway",
                id, record.data.state, next
            );
        }
        record.data.state = next;
        record.data.touch();
        if matches!(next.normalize(), ConnectionState::Complete) {
            record.data.mark_active();
        }
        self.add_or_update(record)
    }

    pub fn update_peer_info(&self, id: &str, their_did: String, their_label: Option<String>) -> Result<(), RepositoryError> {
        let Some(mut record) = self.get(id)? else {
            return Err(RepositoryError::NotFound(id.to_string()));
        };
        record.data.their_did = their_did.clone();
        if their_label.is_some() {
            record.data.their_label = their_label;
        }
        record.data.touch();
        record.tags.insert(ConnectionRecordTagKeys::TheirDid, their_did);
        self.add_or_update(record)
    }

    pub fn update_capabilities(&self, id: &str, endpoint: Option<String>, protocols: Vec<String>, services: Vec<serde_json::Value>) -> Result<(), RepositoryError> {
        let Some(mut record) = self.get(id)? else {
            return Err(RepositoryError::NotFound(id.to_string()));
        };
        if let Some(endpoint) = endpoint {
            record.data.their_endpoint = Some(endpoint);
        }
        if !protocols.is_empty() {
            record.data.their_protocols = protocols;
        }
        if !services.is_empty() {
            record.data.their_services = services;
        }
        record.data.touch();
        self.add_or_update(record)
    }

    pub fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.store.delete_record(id).map_err(RepositoryError::DeleteFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionRole;

    fn test_data(my_did: &str, their_did: &str) -> ConnectionRecordData {
        ConnectionRecordData::new(my_did.to_string(), their_did.to_string(), ConnectionRole::Inviter, ConnectionState::Invited)
    }

    #[test]
    fn create_then_get_round_trips() {
        let repo = ConnectionRepository::new();
        let created = repo.create(test_data("did:a", "did:b")).unwrap();
        let fetched = repo.get(&created.id).unwrap().expect("record to exist");
        assert_eq!(fetched.data.my_did, "did:a");
    }

    #[test]
    fn duplicate_pair_is_rejected() {
        let repo = ConnectionRepository::new();
        repo.create(test_data("did:a", "did:b")).unwrap();
        let err = repo.create(test_data("did:a", "did:b")).unwrap_err();
        assert!(matches!(err, RepositoryError::ConnectionAlreadyExists));
    }

    #[test]
    fn open_invitations_with_empty_their_did_do_not_collide() {
        let repo = ConnectionRepository::new();
        repo.create(test_data("did:a", "")).unwrap();
        repo.create(test_data("did:a", "")).unwrap();
        assert_eq!(repo.list().unwrap().len(), 2);
    }

    #[test]
    fn update_state_persists_even_on_invalid_transition() {
        let repo = ConnectionRepository::new();
        let created = repo.create(test_data("did:a", "did:b")).unwrap();
        repo.update_state(&created.id, ConnectionState::Complete).unwrap();
        let fetched = repo.get(&created.id).unwrap().unwrap();
        assert_eq!(fetched.data.state.normalize(), ConnectionState::Complete);
    }

    #[test]
    fn find_by_pair_locates_existing_connection() {
        let repo = ConnectionRepository::new();
        repo.create(test_data("did:a", "did:b")).unwrap();
        assert!(repo.find_by_pair("did:a", "did:b").unwrap().is_some());
        assert!(repo.find_by_pair("did:a", "did:c").unwrap().is_none());
    }
}
