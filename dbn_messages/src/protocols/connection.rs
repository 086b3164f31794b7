use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A service endpoint as it appears in a DID Document: a bare URL, a list of URLs
/// (first one wins), or an object carrying the URL under one of a few common keys.
/// All three shapes normalize identically via [`ServiceEndpoint::first_url`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ServiceEndpoint {
    Url(String),
    Urls(Vec<String>),
    Object(ServiceEndpointObject),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceEndpointObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "serviceEndpoint", skip_serializing_if = "Option::is_none")]
    pub service_endpoint: Option<String>,
}

impl ServiceEndpoint {
    pub fn first_url(&self) -> Option<&str> {
        match self {
            ServiceEndpoint::Url(url) => Some(url.as_str()),
            ServiceEndpoint::Urls(urls) => urls.first().map(String::as_str),
            ServiceEndpoint::Object(obj) => obj
                .uri
                .as_deref()
                .or(obj.url.as_deref())
                .or(obj.service_endpoint.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub service_endpoint: ServiceEndpoint,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
}

/// The set of service `type` values capability discovery treats as a DIDComm inbox.
pub fn is_didcomm_service_type(type_: &str) -> bool {
    type_ == "DIDCommMessaging" || type_.contains("DIDComm") || type_ == "MessagingService"
}

/// A minimal, non-normative DID Document: only the fields capability discovery and
/// the connection protocol's fast path actually read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DidDocument {
    pub id: String,
    #[serde(default)]
    pub service: Vec<Service>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionRequestBody {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invitation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionBlock>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "did_doc")]
    pub did_doc: Option<DidDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionBlock {
    #[serde(rename = "did_doc", alias = "didDoc", skip_serializing_if = "Option::is_none")]
    pub did_doc: Option<DidDocument>,
}

impl ConnectionRequestBody {
    /// Checks both places an inline DID Document can appear on a connection request:
    /// `did_doc` directly, or nested under `connection.did_doc`. Attachment scanning
    /// is handled separately by the caller, since attachments live on the envelope
    /// rather than in this body.
    pub fn inline_did_document(&self) -> Option<&DidDocument> {
        self.did_doc
            .as_ref()
            .or_else(|| self.connection.as_ref().and_then(|c| c.did_doc.as_ref()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionResponseBody {
    pub label: String,
    pub did_doc: DidDocument,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionAckBody {
    pub status: String,
}

impl ConnectionAckBody {
    pub fn ok() -> Self {
        Self { status: "OK".to_string() }
    }
}

/// Recursively scans an arbitrary JSON value for any `{serviceEndpoint|endpoint|uri|url}`
/// string that looks like an `http(s)://` URL. Used as a last-resort endpoint
/// inference when a DID Document doesn't parse cleanly into `DidDocument::service`.
pub fn scan_for_endpoint(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            for key in ["serviceEndpoint", "endpoint", "uri", "url"] {
                if let Some(Value::String(candidate)) = map.get(key) {
                    if candidate.starts_with("http://") || candidate.starts_with("https://") {
                        return Some(candidate.clone());
                    }
                }
            }
            map.values().find_map(scan_for_endpoint)
        }
        Value::Array(items) => items.iter().find_map(scan_for_endpoint),
        _ => None,
    }
}
