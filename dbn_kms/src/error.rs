use thiserror::Error;

#[derive(Error, Debug)]
pub enum KmsError {
    #[error("KMS call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("KMS request failed")]
    Request(#[source] reqwest::Error),
    #[error("KMS returned a non-success status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode KMS response body")]
    Decode(#[source] serde_json::Error),
    #[error("DID creation failed: {0}")]
    DidCreationFailed(String),
    #[error("DID resolution failed for `{0}`")]
    DidResolutionFailed(String),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}
