//! Unified error types for the deferred delivery engine
//!
//! This module defines error types that:
//! - Are serializable so a UI layer can display them
//! - Separate validation failures from delivery and storage failures
//! - Map third-party errors to a small set of variants

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine error type for managers, schedulers and the record store
///
/// All errors are serializable so they can be forwarded to the frontend.
/// Messages should be user-friendly and actionable.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "message")]
pub enum OutboxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for OutboxError {
    fn from(err: std::io::Error) -> Self {
        OutboxError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for OutboxError {
    fn from(err: toml::de::Error) -> Self {
        OutboxError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for OutboxError {
    fn from(err: serde_json::Error) -> Self {
        OutboxError::Parse(err.to_string())
    }
}

impl From<rusqlite::Error> for OutboxError {
    fn from(err: rusqlite::Error) -> Self {
        OutboxError::Storage(err.to_string())
    }
}

impl From<r2d2::Error> for OutboxError {
    fn from(err: r2d2::Error) -> Self {
        OutboxError::Storage(err.to_string())
    }
}

impl From<String> for OutboxError {
    fn from(err: String) -> Self {
        OutboxError::Other(err)
    }
}

impl From<&str> for OutboxError {
    fn from(err: &str) -> Self {
        OutboxError::Other(err.to_string())
    }
}

/// Result type alias using OutboxError
pub type Result<T> = std::result::Result<T, OutboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serializes_with_type_tag() {
        let err = OutboxError::InvalidInput("scheduled time is in the past".to_string());
        let json = serde_json::to_value(&err).unwrap();

        assert_eq!(json["type"], "InvalidInput");
        assert_eq!(json["message"], "scheduled time is in the past");
    }

    #[test]
    fn test_display_is_user_facing() {
        let err = OutboxError::Delivery("smtp timeout".to_string());
        assert_eq!(err.to_string(), "Delivery failed: smtp timeout");
    }
}
