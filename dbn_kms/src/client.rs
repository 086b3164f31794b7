use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KmsError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedDid {
    pub id: String,
    pub did: String,
    pub method: String,
    pub method_id: String,
    pub status: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidDocument {
    pub id: String,
    #[serde(default)]
    pub service: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EncryptRequest {
    pub to: String,
    pub plaintext: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptResponse {
    pub jwe: Value,
    pub kid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecryptRequest {
    pub did: String,
    pub jwe: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptResponse {
    pub plaintext: String,
    pub header: Value,
    pub kid: String,
}

/// The external key-management/DID service boundary. All operations are I/O-bound
/// and may fail with transient or permanent errors; callers treat both alike unless
/// otherwise noted. Every call is expected to honor a 30s hard timeout.
#[async_trait]
pub trait KmsClient: Send + Sync {
    async fn create_did(&self, method: &str, options: Value) -> Result<CreatedDid, KmsError>;
    async fn resolve_did_document(&self, did: &str) -> Result<DidDocument, KmsError>;
    async fn revoke_did(&self, did: &str) -> Result<(), KmsError>;
    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptResponse, KmsError>;
    async fn decrypt(&self, request: DecryptRequest) -> Result<DecryptResponse, KmsError>;
}
