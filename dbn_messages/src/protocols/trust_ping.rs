use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PingBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default = "default_response_requested")]
    pub response_requested: bool,
}

fn default_response_requested() -> bool {
    true
}

impl Default for PingBody {
    fn default() -> Self {
        Self { comment: None, response_requested: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PingResponseBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl PingResponseBody {
    pub fn pong() -> Self {
        Self { comment: Some("Pong".to_string()) }
    }
}
