use std::{collections::HashMap, hash::Hash, marker::PhantomData, sync::Mutex};

use serde::{de::DeserializeOwned, Serialize};

use crate::{base::Storage, error::StorageError, record::Record};

struct Table<TK> {
    records: HashMap<String, String>,
    tags: Vec<(TK, (String, String))>,
}

impl<TK> Table<TK> {
    fn new() -> Self {
        Self { records: HashMap::new(), tags: vec![] }
    }
}

/// A `Mutex`-guarded, in-process [`Storage`] implementation. Models the row-level
/// locking a real backing store would provide by serializing all access to the table
/// behind a single lock; fine for the connection/message volumes a single agent handles.
pub struct InMemoryStorage<D, TK>
where
    D: Serialize + DeserializeOwned + std::fmt::Debug,
    TK: Eq + Hash + Clone + std::fmt::Debug + Serialize + DeserializeOwned,
{
    table: Mutex<Table<TK>>,
    _phantom: PhantomData<D>,
}

impl<D, TK> InMemoryStorage<D, TK>
where
    D: Serialize + DeserializeOwned + std::fmt::Debug,
    TK: Eq + Hash + Clone + std::fmt::Debug + Serialize + DeserializeOwned,
{
    pub fn new() -> Self {
        Self { table: Mutex::new(Table::new()), _phantom: PhantomData }
    }

    fn add_keys(table: &mut Table<TK>, tags: HashMap<TK, String>, id: &str) {
        for (tag_key, tag_value) in tags {
            table.tags.push((tag_key, (tag_value, id.to_string())));
        }
    }

    fn remove_keys(table: &mut Table<TK>, id: &str) {
        table.tags.retain(|(_tag_key, (_tag_value, stored_id))| stored_id != id);
    }
}

impl<D, TK> Default for InMemoryStorage<D, TK>
where
    D: Serialize + DeserializeOwned + std::fmt::Debug,
    TK: Eq + Hash + Clone + std::fmt::Debug + Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<D, TK> Storage<D, TK> for InMemoryStorage<D, TK>
where
    D: Serialize + DeserializeOwned + std::fmt::Debug,
    TK: Eq + Hash + Clone + std::fmt::Debug + Serialize + DeserializeOwned,
{
    fn add_record(&self, record: Record<D, TK>) -> Result<(), StorageError> {
        let mut table = self.table.lock().expect("storage mutex poisoned");
        if table.records.contains_key(&record.id) {
            return Err(StorageError::DuplicateRecord(record.id.clone()));
        }
        let id = record.id.clone();
        let tags = record.tags.clone();
        table.records.insert(id.clone(), record.to_json_string()?);
        Self::add_keys(&mut table, tags, &id);
        Ok(())
    }

    fn add_or_update_record(&self, record: Record<D, TK>) -> Result<(), StorageError> {
        let mut table = self.table.lock().expect("storage mutex poisoned");
        let id = record.id.clone();
        let tags = record.tags.clone();
        table.records.insert(id.clone(), record.to_json_string()?);
        Self::remove_keys(&mut table, &id);
        Self::add_keys(&mut table, tags, &id);
        Ok(())
    }

    fn update_record(&self, record: Record<D, TK>) -> Result<(), StorageError> {
        let mut table = self.table.lock().expect("storage mutex poisoned");
        if !table.records.contains_key(&record.id) {
            return Err(StorageError::RecordDoesNotExist(record.id.clone()));
        }
        let id = record.id.clone();
        let tags = record.tags.clone();
        table.records.insert(id.clone(), record.to_json_string()?);
        Self::remove_keys(&mut table, &id);
        Self::add_keys(&mut table, tags, &id);
        Ok(())
    }

    fn get_record(&self, id: &str) -> Result<Option<Record<D, TK>>, StorageError> {
        let table = self.table.lock().expect("storage mutex poisoned");
        table.records.get(id).map(|raw| Record::from_json_str(raw)).transpose()
    }

    fn get_all_records(&self) -> Result<Vec<Record<D, TK>>, StorageError> {
        let table = self.table.lock().expect("storage mutex poisoned");
        table.records.values().map(|raw| Record::from_json_str(raw)).collect()
    }

    fn search_records(
        &self,
        tag_key: &TK,
        tag_value: &str,
    ) -> Result<Vec<Record<D, TK>>, StorageError> {
        let table = self.table.lock().expect("storage mutex poisoned");
        let matching_ids: Vec<String> = table
            .tags
            .iter()
            .filter(|(stored_tag_key, (stored_tag_value, _))| {
                stored_tag_key == tag_key && stored_tag_value == tag_value
            })
            .map(|(_, (_, id))| id.clone())
            .collect();
        matching_ids
            .into_iter()
            .filter_map(|id| table.records.get(&id).map(|raw| Record::from_json_str(raw)))
            .collect()
    }

    fn delete_record(&self, id: &str) -> Result<(), StorageError> {
        let mut table = self.table.lock().expect("storage mutex poisoned");
        table.records.remove(id);
        Self::remove_keys(&mut table, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap as Map;

    #[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
    enum TestTagKeys {
        TestKey,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestRecord {
        value: String,
    }

    #[test]
    fn add_and_read_record() {
        crate::test_init();
        let storage = InMemoryStorage::<TestRecord, TestTagKeys>::new();
        let record = Record::new("id1".to_string(), TestRecord { value: "foo".to_string() }, None);
        storage.add_record(record.clone()).unwrap();
        let retrieved = storage.get_record("id1").unwrap().expect("record to exist");
        assert_eq!(record, retrieved);
    }

    #[test]
    fn add_duplicate_is_rejected() {
        let storage = InMemoryStorage::<TestRecord, TestTagKeys>::new();
        let record = Record::new("id1".to_string(), TestRecord { value: "foo".to_string() }, None);
        storage.add_record(record.clone()).unwrap();
        assert!(matches!(storage.add_record(record), Err(StorageError::DuplicateRecord(_))));
    }

    #[test]
    fn update_nonexistent_is_rejected() {
        let storage = InMemoryStorage::<TestRecord, TestTagKeys>::new();
        let record = Record::new("id1".to_string(), TestRecord { value: "foo".to_string() }, None);
        assert!(matches!(storage.update_record(record), Err(StorageError::RecordDoesNotExist(_))));
    }

    #[test]
    fn search_records_by_tag() {
        let storage = InMemoryStorage::<TestRecord, TestTagKeys>::new();
        let mut tags = Map::new();
        tags.insert(TestTagKeys::TestKey, "v".to_string());
        let record = Record::new("id1".to_string(), TestRecord { value: "foo".to_string() }, Some(tags));
        storage.add_record(record.clone()).unwrap();
        let found = storage.search_records(&TestTagKeys::TestKey, "v").unwrap();
        assert_eq!(found, vec![record]);
    }

    #[test]
    fn delete_record_then_get_returns_none() {
        let storage = InMemoryStorage::<TestRecord, TestTagKeys>::new();
        let record = Record::new("id1".to_string(), TestRecord { value: "foo".to_string() }, None);
        storage.add_record(record).unwrap();
        storage.delete_record("id1").unwrap();
        assert_eq!(storage.get_record("id1").unwrap(), None);
    }
}
