use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric error codes following the GHGP-XXXX format.
///
/// ## Code Ranges
/// - **1000-1999**: Remote storage / snapshot errors
/// - **2000-2999**: Routing errors
/// - **3000-3999**: Request input errors
/// - **4000-4999**: Entity lookup errors
/// - **5000-5999**: Internal/System errors
///
/// Codes are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
#[non_exhaustive]
pub enum ErrorCode {
    /// GHGP-1001: Dataset could not be fetched into the local snapshot
    DatasetUnavailable = 1001,
    /// GHGP-1002: Listing / head / presign against the object store failed
    RemoteStoreFailure = 1002,

    /// GHGP-2001: No route for (verb, path)
    RouteNotFound = 2001,

    /// GHGP-3001: Malformed parameter or body
    InvalidInput = 3001,
    /// GHGP-3002: Required parameter missing
    MissingParameter = 3002,

    /// GHGP-4001: State, facility or file does not exist
    EntityNotFound = 4001,

    /// GHGP-5001: Query execution failed in the engine
    QueryExecution = 5001,
    /// GHGP-5002: Query exceeded its time budget
    QueryTimeout = 5002,
    /// GHGP-5003: Serialization/deserialization failed
    SerializationFailed = 5003,
    /// GHGP-5004: Unexpected internal state
    InternalPanic = 5004,

    /// GHGP-9999: Unknown/unclassified error
    Unknown = 9999,
}

impl ErrorCode {
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Formatted code string (e.g., "GHGP-3001")
    pub fn as_str(&self) -> String {
        format!("GHGP-{:04}", self.as_u16())
    }

    pub fn category(&self) -> ErrorCategory {
        match self.as_u16() {
            1000..=1999 => ErrorCategory::Storage,
            2000..=2999 => ErrorCategory::Routing,
            3000..=3999 => ErrorCategory::Input,
            4000..=4999 => ErrorCategory::Entity,
            _ => ErrorCategory::Internal,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self.category() {
            ErrorCategory::Routing | ErrorCategory::Entity => 404,
            ErrorCategory::Input => 400,
            ErrorCategory::Storage | ErrorCategory::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> String {
        code.as_str()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        let num: u16 = s
            .strip_prefix("GHGP-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| "Invalid format".to_string())?;
        Self::try_from(num).map_err(|_| "Unknown code".to_string())
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(n: u16) -> std::result::Result<Self, Self::Error> {
        match n {
            1001 => Ok(Self::DatasetUnavailable),
            1002 => Ok(Self::RemoteStoreFailure),
            2001 => Ok(Self::RouteNotFound),
            3001 => Ok(Self::InvalidInput),
            3002 => Ok(Self::MissingParameter),
            4001 => Ok(Self::EntityNotFound),
            5001 => Ok(Self::QueryExecution),
            5002 => Ok(Self::QueryTimeout),
            5003 => Ok(Self::SerializationFailed),
            5004 => Ok(Self::InternalPanic),
            9999 => Ok(Self::Unknown),
            _ => Err(format!("Unknown error code: {}", n)),
        }
    }
}

/// High-level error category, drives the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorCategory {
    Storage,
    Routing,
    Input,
    Entity,
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_formatting() {
        assert_eq!(ErrorCode::DatasetUnavailable.as_str(), "GHGP-1001");
        assert_eq!(ErrorCode::InvalidInput.as_str(), "GHGP-3001");
        assert_eq!(ErrorCode::Unknown.as_str(), "GHGP-9999");
    }

    #[test]
    fn test_error_code_parsing() {
        assert_eq!(
            ErrorCode::try_from("GHGP-4001".to_string()).unwrap(),
            ErrorCode::EntityNotFound
        );
        assert!(ErrorCode::try_from("STRANGE".to_string()).is_err());
        assert!(ErrorCode::try_from("GHGP-0000".to_string()).is_err());
        assert!(ErrorCode::try_from("GHGP-ABC".to_string()).is_err());
    }

    #[test]
    fn test_categories_drive_status() {
        assert_eq!(ErrorCode::DatasetUnavailable.category(), ErrorCategory::Storage);
        assert_eq!(ErrorCode::RouteNotFound.http_status(), 404);
        assert_eq!(ErrorCode::EntityNotFound.http_status(), 404);
        assert_eq!(ErrorCode::MissingParameter.http_status(), 400);
        assert_eq!(ErrorCode::QueryTimeout.http_status(), 500);
        assert_eq!(ErrorCode::Unknown.category(), ErrorCategory::Internal);
    }
}
