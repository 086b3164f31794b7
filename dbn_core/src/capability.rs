use std::sync::Arc;

use dbn_kms::KmsClient;
use dbn_messages::protocols::connection::is_didcomm_service_type;
use serde_json::Value;

/// The endpoint/protocols/services a peer DID advertises, as extracted from its
/// resolved DID Document.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub endpoint: Option<String>,
    pub protocols: Vec<String>,
    pub services: Vec<Value>,
}

/// `discoverCapabilities(did)`: resolves a DID Document via the KMS and extracts the
/// DIDComm-relevant subset of it.
pub async fn discover_capabilities(kms: &Arc<dyn KmsClient>, did: &str) -> Result<Capabilities, dbn_kms::KmsError> {
    let document = kms.resolve_did_document(did).await?;
    Ok(capabilities_from_services(&document.service))
}

pub fn capabilities_from_services(services: &[Value]) -> Capabilities {
    let mut endpoint = None;
    let mut protocols = vec![];
    let mut matching_services = vec![];

    for service in services {
        let type_ = service.get("type").and_then(Value::as_str).unwrap_or_default();
        if !is_didcomm_service_type(type_) {
            continue;
        }
        matching_services.push(service.clone());
        if endpoint.is_none() {
            endpoint = extract_endpoint(service);
        }
        if let Some(service_protocols) = service.get("protocols").and_then(Value::as_array) {
            for protocol in service_protocols {
                if let Some(protocol) = protocol.as_str() {
                    if !protocols.iter().any(|p: &String| p == protocol) {
                        protocols.push(protocol.to_string());
                    }
                }
            }
        }
    }

    Capabilities { endpoint, protocols, services: matching_services }
}

fn extract_endpoint(service: &Value) -> Option<String> {
    let endpoint = service.get("serviceEndpoint")?;
    match endpoint {
        Value::String(s) => Some(s.clone()),
        Value::Array(values) => values.iter().find_map(Value::as_str).map(str::to_string),
        Value::Object(_) => ["uri", "url", "serviceEndpoint"]
            .iter()
            .find_map(|key| endpoint.get(key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

/// `supportsProtocol(did, protocol)`: discovery followed by set-membership; any
/// resolution error is swallowed and reported as unsupported.
pub async fn supports_protocol(kms: &Arc<dyn KmsClient>, did: &str, protocol: &str) -> bool {
    match discover_capabilities(kms, did).await {
        Ok(capabilities) => capabilities.protocols.iter().any(|p| p == protocol),
        Err(err) => {
            warn!("Capability discovery failed for `{}` while checking protocol support: {}", did, err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_endpoint_protocols_and_filters_non_didcomm_services() {
        let services = vec![
            json!({"id": "#didcomm", "type": "DIDCommMessaging", "serviceEndpoint": "https://agent.example.com", "protocols": ["https://didcomm.org/basicmessage/2.0"]}),
            json!({"id": "#other", "type": "LinkedDomains", "serviceEndpoint": "https://example.com"}),
        ];
        let capabilities = capabilities_from_services(&services);
        assert_eq!(capabilities.endpoint.as_deref(), Some("https://agent.example.com"));
        assert_eq!(capabilities.protocols, vec!["https://didcomm.org/basicmessage/2.0".to_string()]);
        assert_eq!(capabilities.services.len(), 1);
    }

    #[test]
    fn endpoint_normalizes_object_and_array_shapes() {
        let object_endpoint = json!({"type": "DIDCommMessaging", "serviceEndpoint": {"uri": "https://a.example.com"}});
        assert_eq!(extract_endpoint(&object_endpoint), Some("https://a.example.com".to_string()));

        let array_endpoint = json!({"type": "DIDCommMessaging", "serviceEndpoint": ["https://b.example.com", "https://c.example.com"]});
        assert_eq!(extract_endpoint(&array_endpoint), Some("https://b.example.com".to_string()));
    }
}
