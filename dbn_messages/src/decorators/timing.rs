use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The `~timing` decorator, as described by
/// <https://github.com/hyperledger/aries-rfcs/blob/main/features/0032-message-timing/README.md>.
///
/// Not required by any of the three built-in protocols, but carried through for
/// messages that attach it so downstream tooling (retry schedulers, audit logs) can
/// read it without the core having to special-case it away.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Timing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_milli: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_until_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_timing_serializes_to_empty_object() {
        let timing = Timing::default();
        let value = serde_json::to_value(&timing).expect("serializes");
        assert_eq!(value, json!({}));
    }

    #[test]
    fn extended_timing_round_trips() {
        let timing = Timing {
            delay_milli: Some(10),
            ..Timing::default()
        };
        let encoded = serde_json::to_string(&timing).expect("serializes");
        let decoded: Timing = serde_json::from_str(&encoded).expect("parses");
        assert_eq!(timing, decoded);
    }
}
