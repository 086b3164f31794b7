use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BasicMessageBody {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "~l10n")]
    pub l10n: Option<L10n>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct L10n {
    pub locale: String,
}

impl BasicMessageBody {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), lang: None, l10n: None }
    }

    /// The effective language tag: the modern `lang` header if present, else the
    /// legacy `~l10n.locale` decorator.
    pub fn effective_lang(&self) -> Option<&str> {
        self.lang.as_deref().or_else(|| self.l10n.as_ref().map(|l10n| l10n.locale.as_str()))
    }

    /// `content` validated as present and non-empty, per the non-empty-string
    /// requirement for a basic message body.
    pub fn non_empty_content(&self) -> Option<&str> {
        self.content.as_deref().filter(|content| !content.is_empty())
    }
}
