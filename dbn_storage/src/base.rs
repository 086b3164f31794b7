use std::hash::Hash;

use serde::{de::DeserializeOwned, Serialize};

use crate::{error::StorageError, record::Record};

/// General-purpose storage providing CRUD-style operations over a generic [`Record`].
///
/// `TK` is the enum of valid tag keys for this record's secondary indexes.
pub trait Storage<D, TK>
where
    D: Serialize + DeserializeOwned + std::fmt::Debug,
    TK: Eq + Hash + Clone + std::fmt::Debug + Serialize + DeserializeOwned,
{
    /// Adds a record. Fails with [`StorageError::DuplicateRecord`] if `id` is already taken;
    /// use [`add_or_update_record`](Self::add_or_update_record) to upsert instead.
    fn add_record(&self, record: Record<D, TK>) -> Result<(), StorageError>;

    /// Adds or overwrites a record by id.
    fn add_or_update_record(&self, record: Record<D, TK>) -> Result<(), StorageError>;

    /// Overwrites an existing record. Fails with [`StorageError::RecordDoesNotExist`] if absent.
    fn update_record(&self, record: Record<D, TK>) -> Result<(), StorageError>;

    fn get_record(&self, id: &str) -> Result<Option<Record<D, TK>>, StorageError>;

    // TODO: pagination
    fn get_all_records(&self) -> Result<Vec<Record<D, TK>>, StorageError>;

    // TODO: pagination
    fn search_records(
        &self,
        tag_key: &TK,
        tag_value: &str,
    ) -> Result<Vec<Record<D, TK>>, StorageError>;

    fn delete_record(&self, id: &str) -> Result<(), StorageError>;
}
