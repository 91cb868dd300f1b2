use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_REPORTING_YEAR: &str = "2023";
pub const ALL_STATES: &str = "US";
pub const DEFAULT_DATA_SOURCE: &str = "E";

// Dashboards send some fields as JSON numbers and others as strings
fn deserialize_stringish<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

/// JSON body accepted by the POST analytics routes. Unknown fields are ignored.
#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    #[serde(default, deserialize_with = "deserialize_stringish")]
    pub reporting_year: Option<String>,

    #[serde(default, deserialize_with = "deserialize_stringish")]
    pub state: Option<String>,

    #[serde(default, deserialize_with = "deserialize_stringish")]
    pub data_source: Option<String>,

    #[serde(default, deserialize_with = "deserialize_stringish")]
    pub page_number: Option<String>,

    #[serde(default, deserialize_with = "deserialize_stringish")]
    pub sector1: Option<String>,
}

impl RequestBody {
    pub fn reporting_year(&self) -> String {
        self.reporting_year
            .clone()
            .unwrap_or_else(|| DEFAULT_REPORTING_YEAR.to_string())
    }

    /// State filter; `None` when absent, empty, or `US` (all states).
    pub fn state_filter(&self) -> Option<String> {
        match self.state.as_deref() {
            None | Some("") | Some(ALL_STATES) => None,
            Some(s) => Some(s.to_string()),
        }
    }

    pub fn data_source(&self) -> String {
        match self.data_source.as_deref() {
            None | Some("") => DEFAULT_DATA_SOURCE.to_string(),
            Some(s) => s.to_string(),
        }
    }

    pub fn sector1(&self) -> Option<String> {
        self.sector1.clone().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub text: String,
    #[serde(rename = "type")]
    pub message_type: u16,
}

/// `{ "result": ..., "messages": [...] }`; `result` is omitted on errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    pub messages: Vec<Message>,
}

impl<T> Envelope<T> {
    pub fn ok(result: T) -> Self {
        Self {
            result: Some(result),
            messages: Vec::new(),
        }
    }
}

impl Envelope<serde_json::Value> {
    pub fn error(status: u16, text: impl Into<String>) -> Self {
        Self {
            result: None,
            messages: vec![Message {
                text: text.into(),
                message_type: status,
            }],
        }
    }
}
