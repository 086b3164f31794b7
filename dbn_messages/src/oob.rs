use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub const OOB_INVITATION_TYPE: &str = "https://didcomm.org/out-of-band/2.0/invitation";

#[derive(Error, Debug)]
pub enum OobError {
    #[error("invitation URL is missing the `_oob` query parameter")]
    MissingOobParam,
    #[error("invitation payload is not valid base64url")]
    InvalidBase64(#[source] base64::DecodeError),
    #[error("invitation payload is not valid JSON")]
    InvalidJson(#[source] serde_json::Error),
    #[error("invitation payload is not valid UTF-8")]
    InvalidUtf8(#[source] std::string::FromUtf8Error),
    #[error("`@type` is `{0}`, expected an out-of-band invitation")]
    WrongType(String),
}

/// An out-of-band invitation service entry. Either a bare DID to be resolved, or an
/// inline service block carried directly in the invitation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OobService {
    Did(String),
    Inline(InlineService),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InlineService {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub service_endpoint: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
}

impl OobService {
    /// The DID this service resolves to: the bare DID itself, or the portion of an
    /// inline service's `id` before the `#fragment`.
    pub fn their_did(&self) -> &str {
        match self {
            OobService::Did(did) => did,
            OobService::Inline(service) => {
                service.id.split_once('#').map_or(service.id.as_str(), |(did, _)| did)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutOfBandInvitation {
    #[serde(rename = "@type")]
    pub type_: String,
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_code: Option<String>,
    pub accept: Vec<String>,
    pub services: Vec<OobService>,
    #[serde(rename = "dbn:cid", skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(rename = "dbn:target", skip_serializing_if = "Option::is_none")]
    pub target_did: Option<String>,
}

impl OutOfBandInvitation {
    pub fn new(service: OobService, correlation_id: String) -> Self {
        Self {
            type_: OOB_INVITATION_TYPE.to_string(),
            id: Uuid::new_v4().to_string(),
            label: None,
            goal: None,
            goal_code: None,
            accept: vec!["didcomm/v2".to_string()],
            services: vec![service],
            correlation_id: Some(correlation_id),
            target_did: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    #[must_use]
    pub fn with_target(mut self, target_did: Option<String>) -> Self {
        self.target_did = target_did;
        self
    }

    /// Base64url-encodes this invitation and wraps it as `https://didcomm.org/oob?_oob=...`.
    pub fn encode_url(&self) -> Result<String, OobError> {
        let json = serde_json::to_vec(self).map_err(OobError::InvalidJson)?;
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json);
        Ok(format!("https://didcomm.org/oob?_oob={encoded}"))
    }

    /// Parses an invitation from either its encoded URL form or a raw JSON object,
    /// validating `@type` along the way.
    pub fn decode(input: &str) -> Result<Self, OobError> {
        let json_str = if let Some((_, encoded)) = input.split_once("_oob=") {
            let encoded = encoded.split('&').next().unwrap_or(encoded);
            let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
                .decode(encoded)
                .map_err(OobError::InvalidBase64)?;
            String::from_utf8(bytes).map_err(OobError::InvalidUtf8)?
        } else {
            input.to_string()
        };

        let invitation: OutOfBandInvitation =
            serde_json::from_str(&json_str).map_err(OobError::InvalidJson)?;

        if invitation.type_ != OOB_INVITATION_TYPE {
            return Err(OobError::WrongType(invitation.type_));
        }
        Ok(invitation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_correlation_and_target() {
        let service = OobService::Inline(InlineService {
            id: "did:peer:abc#didcomm".to_string(),
            type_: "DIDCommMessaging".to_string(),
            service_endpoint: serde_json::json!("https://alice.example/didcomm"),
            protocols: vec!["https://didcomm.org/basicmessage/2.0".to_string()],
        });
        let invitation = OutOfBandInvitation::new(service, "corr-1".to_string())
            .with_target(Some("did:web:e.com:bob".to_string()));

        let url = invitation.encode_url().expect("encodes");
        let decoded = OutOfBandInvitation::decode(&url).expect("decodes");

        assert_eq!(decoded, invitation);
        assert_eq!(decoded.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(decoded.target_did.as_deref(), Some("did:web:e.com:bob"));
    }

    #[test]
    fn decode_rejects_wrong_type() {
        let raw = serde_json::json!({
            "@type": "https://didcomm.org/connections/1.0/request",
            "@id": "x",
            "accept": [],
            "services": [],
        })
        .to_string();
        let err = OutOfBandInvitation::decode(&raw).unwrap_err();
        assert!(matches!(err, OobError::WrongType(_)));
    }

    #[test]
    fn their_did_strips_fragment_for_inline_service() {
        let service = OobService::Inline(InlineService {
            id: "did:peer:abc#didcomm".to_string(),
            type_: "DIDCommMessaging".to_string(),
            service_endpoint: serde_json::json!("https://alice.example/didcomm"),
            protocols: vec![],
        });
        assert_eq!(service.their_did(), "did:peer:abc");
    }
}
