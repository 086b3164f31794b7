use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde_json::{json, Value};
use url::Url;

use crate::{
    client::{CreatedDid, DecryptRequest, DecryptResponse, DidDocument, EncryptRequest, EncryptResponse, KmsClient},
    error::KmsError,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to the KMS over plain HTTP+JSON: a bare `reqwest::Client`, a fixed
/// `CONTENT_TYPE`/`USER_AGENT` pair, `debug!` logging around the request/response.
pub struct HttpKmsClient {
    base_url: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpKmsClient {
    pub fn new(base_url: Url) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: Url, timeout: Duration) -> Self {
        Self { base_url, client: reqwest::Client::new(), timeout }
    }

    fn endpoint(&self, path: &str) -> Url {
        self.base_url.join(path).unwrap_or_else(|_| self.base_url.clone())
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value, KmsError> {
        let endpoint = self.endpoint(path);
        debug!("Sending KMS request to `{}`", endpoint);
        let request = self
            .client
            .post(endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, "dbn-kms-client")
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| KmsError::Timeout(self.timeout))?
            .map_err(KmsError::Request)?;

        let status = response.status();
        debug!("Received KMS response with status `{}` from `{}`", status, endpoint);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KmsError::Status { status: status.as_u16(), body });
        }
        response.json::<Value>().await.map_err(KmsError::Request)
    }
}

#[async_trait]
impl KmsClient for HttpKmsClient {
    async fn create_did(&self, method: &str, options: Value) -> Result<CreatedDid, KmsError> {
        let body = self.post_json("dids", json!({ "method": method, "options": options })).await?;
        serde_json::from_value(body).map_err(KmsError::Decode)
    }

    async fn resolve_did_document(&self, did: &str) -> Result<DidDocument, KmsError> {
        let body = self.post_json("dids/resolve", json!({ "did": did })).await?;
        serde_json::from_value(body).map_err(KmsError::Decode)
    }

    async fn revoke_did(&self, did: &str) -> Result<(), KmsError> {
        self.post_json("dids/revoke", json!({ "did": did })).await?;
        Ok(())
    }

    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptResponse, KmsError> {
        let body = self.post_json("encrypt", serde_json::to_value(request).map_err(KmsError::Decode)?).await?;
        serde_json::from_value(body).map_err(KmsError::Decode)
    }

    async fn decrypt(&self, request: DecryptRequest) -> Result<DecryptResponse, KmsError> {
        let body = self.post_json("decrypt", serde_json::to_value(request).map_err(KmsError::Decode)?).await?;
        serde_json::from_value(body).map_err(KmsError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_relative_path_against_base() {
        crate::test_init();
        let client = HttpKmsClient::new(Url::parse("https://kms.example.com/api/").unwrap());
        assert_eq!(client.endpoint("dids").as_str(), "https://kms.example.com/api/dids");
    }

    #[test]
    fn default_timeout_is_thirty_seconds() {
        let client = HttpKmsClient::new(Url::parse("https://kms.example.com/").unwrap());
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);
    }
}
