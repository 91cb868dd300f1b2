//! Structured metadata attached to errors for logging.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorContext {
    /// GHGP-1001: which snapshot failed to materialize
    Dataset { table: String, key: String },

    /// GHGP-2001
    Route { method: String, path: String },

    /// GHGP-3001/3002
    Parameter {
        name: String,
        value: Option<String>,
    },

    /// GHGP-4001
    Entity { entity: String, id: String },

    /// Column missing from a snapshot schema
    FieldNotFound {
        field: String,
        available_fields: Vec<String>,
    },

    Generic {
        #[serde(flatten)]
        data: std::collections::HashMap<String, serde_json::Value>,
    },
}
