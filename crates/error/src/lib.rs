//! # ghgp-error
//!
//! Unified error type for the GHGP analytics API.
//!
//! Every stage (snapshot cache, compiler, engine, shaper) returns a
//! [`GhgpError`]. Only the router turns one into a transport status and the
//! response envelope, using [`GhgpError::http_status`].
//!
//! - Numeric error codes (GHGP-XXXX) grouped by range
//! - Structured context for logs
//! - Optional hints for callers

mod code;
mod context;
mod convert;

pub use code::{ErrorCategory, ErrorCode};
pub use context::ErrorContext;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The error type shared by every GHGP crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GhgpError {
    /// Numeric error code (e.g., "GHGP-1001")
    pub code: ErrorCode,

    /// Human-readable message, surfaced verbatim in the response envelope
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl GhgpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            hint: None,
        }
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// A remote dataset could not be materialized locally.
    pub fn dataset_unavailable(table: &str, key: &str, cause: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::DatasetUnavailable,
            format!("Failed to download {}: {}", key, cause),
        )
        .with_context(ErrorContext::Dataset {
            table: table.to_string(),
            key: key.to_string(),
        })
    }

    /// Listing, head or presign against the object store failed.
    pub fn remote_store(key: &str, cause: impl fmt::Display) -> Self {
        let mut data = std::collections::HashMap::new();
        data.insert(
            "key".to_string(),
            serde_json::Value::String(key.to_string()),
        );
        Self::new(ErrorCode::RemoteStoreFailure, cause.to_string())
            .with_context(ErrorContext::Generic { data })
    }

    pub fn route_not_found(method: &str, path: &str) -> Self {
        Self::new(
            ErrorCode::RouteNotFound,
            format!("Route not found: {} {}", method, path),
        )
        .with_context(ErrorContext::Route {
            method: method.to_string(),
            path: path.to_string(),
        })
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// A required query or path parameter is absent.
    pub fn missing_parameter(name: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MissingParameter, message).with_context(ErrorContext::Parameter {
            name: name.to_string(),
            value: None,
        })
    }

    pub fn not_found(entity: &str, id: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EntityNotFound, message).with_context(ErrorContext::Entity {
            entity: entity.to_string(),
            id: id.to_string(),
        })
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalPanic, message)
    }

    /// Transport status for this error; the envelope's message `type`.
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::warn!("Failed to serialize GhgpError: {}", e);
            format!(
                r#"{{"code":"{}","message":"Serialization failed"}}"#,
                self.code
            )
        })
    }
}

impl fmt::Display for GhgpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (Hint: {})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for GhgpError {}

pub type Result<T> = std::result::Result<T, GhgpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let err = GhgpError::new(ErrorCode::InvalidInput, "Invalid filename").with_hint("use .csv");

        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert_eq!(err.message, "Invalid filename");
        assert_eq!(err.hint.as_deref(), Some("use .csv"));
        assert!(err.context.is_none());
    }

    #[test]
    fn test_display() {
        let err = GhgpError::route_not_found("GET", "/api/nope");
        assert_eq!(err.to_string(), "[GHGP-2001] Route not found: GET /api/nope");

        let err = GhgpError::invalid_input("Invalid filename").with_hint("drop the path");
        assert_eq!(
            err.to_string(),
            "[GHGP-3001] Invalid filename (Hint: drop the path)"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GhgpError::dataset_unavailable("T", "k", "boom").http_status(),
            500
        );
        assert_eq!(GhgpError::route_not_found("GET", "/").http_status(), 404);
        assert_eq!(GhgpError::invalid_input("x").http_status(), 400);
        assert_eq!(
            GhgpError::missing_parameter("id", "Missing facility id").http_status(),
            400
        );
        assert_eq!(
            GhgpError::not_found("facility", "1", "Facility not found").http_status(),
            404
        );
        assert_eq!(GhgpError::internal("x").http_status(), 500);
    }

    #[test]
    fn test_dataset_unavailable_message_keeps_cause() {
        let err = GhgpError::dataset_unavailable(
            "PUB_DIM_SECTOR",
            "prefix/ghg.PUB_DIM_SECTOR.parquet",
            "connection reset",
        );
        assert_eq!(
            err.message,
            "Failed to download prefix/ghg.PUB_DIM_SECTOR.parquet: connection reset"
        );
        match err.context {
            Some(ErrorContext::Dataset { table, .. }) => assert_eq!(table, "PUB_DIM_SECTOR"),
            _ => panic!("Expected dataset context"),
        }
    }
}
