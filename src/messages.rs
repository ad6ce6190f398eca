//! Message contract between the popup/background and the page blocker.

use crate::config::PartialSettings;
use crate::error::MessageError;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    GetStatus,
    UpdateSettings {
        #[serde(default)]
        settings: PartialSettings,
    },
    ResetStats,
}

impl Request {
    pub const ACTIONS: [&'static str; 3] = ["getStatus", "updateSettings", "resetStats"];

    pub fn parse(value: &Value) -> Result<Self, MessageError> {
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| MessageError::Malformed("missing action".to_string()))?;
        if !Self::ACTIONS.contains(&action) {
            return Err(MessageError::UnknownAction);
        }
        serde_json::from_value(value.clone()).map_err(|e| MessageError::Malformed(e.to_string()))
    }
}

/// Answer to `getStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub blocked: u64,
    pub enabled: bool,
}

pub fn success() -> Value {
    json!({ "success": true })
}

pub fn failure(error: impl std::fmt::Display) -> Value {
    json!({ "success": false, "error": error.to_string() })
}
