use serde::{Deserialize, Serialize};

/// The `thid`/`pthid` threading decorator, flattened directly onto the containing
/// message rather than nested, matching how the `~thread` fields appear on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThreadDecorator {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pthid: Option<String>,
}

impl ThreadDecorator {
    pub fn is_empty(&self) -> bool {
        self.thid.is_none() && self.pthid.is_none()
    }
}
