use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    base::Storage,
    error::RepositoryError,
    in_memory::InMemoryStorage,
    message::{MessageRecordData, MessageRecordTagKeys, MessageState},
    record::Record,
};

/// Stores [`MessageRecordData`] keyed by a local UUID, indexed additionally by the
/// DIDComm `messageId` (globally unique per sender), `connectionId`, and `threadId`.
///
/// Built on the same `Record`/`Storage` shape as
/// [`crate::connection_repository::ConnectionRepository`].
pub struct MessageRepository {
    store: InMemoryStorage<MessageRecordData, MessageRecordTagKeys>,
}

impl Default for MessageRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageRepository {
    pub fn new() -> Self {
        Self { store: InMemoryStorage::new() }
    }

    fn tags_for(data: &MessageRecordData) -> HashMap<MessageRecordTagKeys, String> {
        let mut tags = HashMap::new();
        tags.insert(MessageRecordTagKeys::MessageId, data.message_id.clone());
        if let Some(connection_id) = &data.connection_id {
            tags.insert(MessageRecordTagKeys::ConnectionId, connection_id.clone());
        }
        if let Some(thread_id) = &data.thread_id {
            tags.insert(MessageRecordTagKeys::ThreadId, thread_id.clone());
        }
        tags
    }

    /// Inserts a new row keyed by `messageId`. Fails with
    /// [`RepositoryError::MessageAlreadyExists`] if the `messageId` is already taken,
    /// enforcing the "Message row written at most once per `messageId`" invariant.
    pub fn create(&self, data: MessageRecordData) -> Result<Record<MessageRecordData, MessageRecordTagKeys>, RepositoryError> {
        if self.find_by_message_id(&data.message_id)?.is_some() {
            return Err(RepositoryError::MessageAlreadyExists(data.message_id.clone()));
        }
        let id = Uuid::new_v4().to_string();
        let tags = Self::tags_for(&data);
        let record = Record::new(id.clone(), data, Some(tags));
        trace!("Adding MessageRecord '{}' to storage", id);
        self.store.add_record(record.clone()).map_err(RepositoryError::AddOrUpdateFailed)?;
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<Option<Record<MessageRecordData, MessageRecordTagKeys>>, RepositoryError> {
        self.store.get_record(id).map_err(RepositoryError::GetFailed)
    }

    pub fn list(&self) -> Result<Vec<Record<MessageRecordData, MessageRecordTagKeys>>, RepositoryError> {
        self.store.get_all_records().map_err(RepositoryError::ListFailed)
    }

    pub fn find_by_message_id(&self, message_id: &str) -> Result<Option<Record<MessageRecordData, MessageRecordTagKeys>>, RepositoryError> {
        let matches = self
            .store
            .search_records(&MessageRecordTagKeys::MessageId, message_id)
            .map_err(RepositoryError::SearchFailed)?;
        Ok(matches.into_iter().next())
    }

    pub fn find_by_connection_id(&self, connection_id: &str) -> Result<Vec<Record<MessageRecordData, MessageRecordTagKeys>>, RepositoryError> {
        self.store
            .search_records(&MessageRecordTagKeys::ConnectionId, connection_id)
            .map_err(RepositoryError::SearchFailed)
    }

    fn add_or_update(&self, record: Record<MessageRecordData, MessageRecordTagKeys>) -> Result<(), RepositoryError> {
        self.store.add_or_update_record(record).map_err(RepositoryError::AddOrUpdateFailed)
    }

    pub fn mark_sent(&self, id: &str) -> Result<(), RepositoryError> {
        let Some(mut record) = self.get(id)? else {
            return Err(RepositoryError::NotFound(id.to_string()));
        };
        record.data.mark_sent();
        self.add_or_update(record)
    }

    pub fn mark_failed(&self, id: &str, error_message: impl Into<String>) -> Result<(), RepositoryError> {
        let Some(mut record) = self.get(id)? else {
            return Err(RepositoryError::NotFound(id.to_string()));
        };
        record.data.mark_failed(error_message);
        self.add_or_update(record)
    }

    pub fn set_connection_id(&self, id: &str, connection_id: impl Into<String>) -> Result<(), RepositoryError> {
        let Some(mut record) = self.get(id)? else {
            return Err(RepositoryError::NotFound(id.to_string()));
        };
        record.data.connection_id = Some(connection_id.into());
        record.tags.insert(MessageRecordTagKeys::ConnectionId, record.data.connection_id.clone().unwrap());
        self.add_or_update(record)
    }

    /// Used by `retryMessage`: bumps `retryCount` and resets the terminal `state` so
    /// the router can re-run delivery against the same row, regardless of the
    /// eventual outcome.
    pub fn increment_retry(&self, id: &str) -> Result<(), RepositoryError> {
        let Some(mut record) = self.get(id)? else {
            return Err(RepositoryError::NotFound(id.to_string()));
        };
        record.data.retry_count += 1;
        record.data.state = MessageState::Pending;
        self.add_or_update(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_data(message_id: &str) -> MessageRecordData {
        MessageRecordData::new_outbound(message_id.to_string(), "https://didcomm.org/basicmessage/2.0/message".to_string(), "did:a".to_string(), "did:b".to_string(), json!({"content": "hi"}))
    }

    #[test]
    fn create_then_find_by_message_id() {
        let repo = MessageRepository::new();
        repo.create(test_data("m1")).unwrap();
        let found = repo.find_by_message_id("m1").unwrap().expect("record to exist");
        assert_eq!(found.data.message_id, "m1");
    }

    #[test]
    fn duplicate_message_id_is_rejected() {
        let repo = MessageRepository::new();
        repo.create(test_data("m1")).unwrap();
        let err = repo.create(test_data("m1")).unwrap_err();
        assert!(matches!(err, RepositoryError::MessageAlreadyExists(ref id) if id == "m1"));
    }

    #[test]
    fn mark_failed_then_increment_retry_resets_to_pending() {
        let repo = MessageRepository::new();
        let created = repo.create(test_data("m1")).unwrap();
        repo.mark_failed(&created.id, "boom").unwrap();
        repo.increment_retry(&created.id).unwrap();
        let fetched = repo.get(&created.id).unwrap().unwrap();
        assert_eq!(fetched.data.retry_count, 1);
        assert!(matches!(fetched.data.state, MessageState::Pending));
    }
}
