use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("create record failed due to a record already existing with id `{0}`")]
    DuplicateRecord(String),
    #[error("record `{0}` does not exist")]
    RecordDoesNotExist(String),
    #[error("failed to serialize record")]
    Serialization(#[source] serde_json::Error),
    #[error("failed to deserialize record")]
    Deserialization(#[source] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("failed to add or update record")]
    AddOrUpdateFailed(#[source] StorageError),
    #[error("failed to get record")]
    GetFailed(#[source] StorageError),
    #[error("failed to list records")]
    ListFailed(#[source] StorageError),
    #[error("failed to search records")]
    SearchFailed(#[source] StorageError),
    #[error("failed to delete record")]
    DeleteFailed(#[source] StorageError),
    #[error("a connection already exists for this (myDid, theirDid) pair")]
    ConnectionAlreadyExists,
    #[error("a message already exists with messageId `{0}`")]
    MessageAlreadyExists(String),
    #[error("no record found with id `{0}`")]
    NotFound(String),
}
