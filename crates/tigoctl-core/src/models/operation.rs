//! Pending operations and acceptance results.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Body sent to confirm a pending operation.
#[derive(Debug, Clone, Serialize)]
pub struct StatusPatch {
    pub op: &'static str,
    pub path: &'static str,
    pub value: &'static str,
}

impl StatusPatch {
    pub const CONFIRM: StatusPatch = StatusPatch {
        op: "REPLACE",
        path: "status",
        value: "confirm",
    };
}

/// Amounts arrive as either JSON numbers or strings depending on the operation type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Number(n) if n.fract() == 0.0 => write!(f, "{}", *n as i64),
            Amount::Number(n) => write!(f, "{}", n),
            Amount::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// An operation waiting for the account holder's approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<MetadataEntry>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PendingOperation {
    /// The operation's reference, if present and non-empty.
    pub fn reference(&self) -> Option<&str> {
        self.pending_reference.as_deref().filter(|r| !r.is_empty())
    }

    /// Text of the `notificationText` metadata entry.
    pub fn notification_text(&self) -> Option<&str> {
        self.metadata
            .iter()
            .find(|m| m.key == "notificationText")
            .and_then(|m| m.value.as_str())
    }

    /// "PYG 15000", "15000" or "N/A"
    pub fn amount_display(&self) -> String {
        match (&self.currency, &self.amount) {
            (Some(currency), Some(amount)) => format!("{} {}", currency, amount),
            (None, Some(amount)) => amount.to_string(),
            _ => "N/A".to_string(),
        }
    }
}

/// Response to a successful acceptance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
