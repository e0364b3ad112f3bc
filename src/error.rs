use std::{io, sync::mpsc::SendError};

use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

use crate::{event::GraphEvent, schema::EdgeKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum TetherError {
    #[error("Notification channel error: {0}")]
    Channel(String),
    #[error("The implicit relationship '{field}' on a '{resource_type}' resource cannot be read or updated directly")]
    ImplicitUpdate {
        resource_type: String,
        field: String,
    },
    #[error("Invalid relationship payload for <{resource_type}>.{field}: {reason}")]
    InvalidPayload {
        resource_type: String,
        field: String,
        reason: String,
    },
    #[error("Cannot remove '{value}' from <{resource_type}>.{field}: {reason}")]
    InvalidRemoval {
        resource_type: String,
        field: String,
        value: String,
        reason: String,
    },
    #[error("File System error: {0}")]
    Io(String),
    #[error("You can only '{op}' on a {expected} relationship. <{resource_type}>.{field} is a {actual}")]
    KindMismatch {
        op: String,
        resource_type: String,
        field: String,
        expected: EdgeKind,
        actual: EdgeKind,
    },
    #[error("Cannot merge '{from}' into '{into}': {reason}")]
    MergeConflict {
        from: String,
        into: String,
        reason: String,
    },
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("The <{resource_type}>.{field} relationship expects '{expected}' resources but received a '{received}' and is not polymorphic")]
    PolymorphismViolation {
        resource_type: String,
        field: String,
        expected: String,
        received: String,
    },
    #[error("Schema mismatch for <{resource_type}>.{field}: {reason}")]
    SchemaMismatch {
        resource_type: String,
        field: String,
        reason: String,
    },
    #[error("No relationship definition for <{resource_type}>.{field}")]
    SchemaMissing {
        resource_type: String,
        field: String,
    },
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

impl TetherError {
    pub fn schema_missing<T: Into<String>, F: Into<String>>(resource_type: T, field: F) -> Self {
        TetherError::SchemaMissing {
            resource_type: resource_type.into(),
            field: field.into(),
        }
    }

    /// True for the programmer-error class of failures (wrong edge kind, unknown field, bad
    /// schema) as opposed to data conditions a caller may want to recover from.
    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            TetherError::KindMismatch { .. }
                | TetherError::ImplicitUpdate { .. }
                | TetherError::SchemaMissing { .. }
                | TetherError::SchemaMismatch { .. }
                | TetherError::PolymorphismViolation { .. }
        )
    }
}

impl From<toml::de::Error> for TetherError {
    fn from(src: toml::de::Error) -> TetherError {
        TetherError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for TetherError {
    fn from(src: toml::ser::Error) -> TetherError {
        TetherError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for TetherError {
    fn from(src: JsonError) -> TetherError {
        TetherError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<uuid::Error> for TetherError {
    fn from(src: uuid::Error) -> TetherError {
        TetherError::Serialization(format!("UUID conversion failed: {src}"))
    }
}

impl From<io::Error> for TetherError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => TetherError::NotFound(format!("{x}")),
            _ => TetherError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<SendError<GraphEvent>> for TetherError {
    fn from(x: SendError<GraphEvent>) -> Self {
        TetherError::Channel(format!(
            "Channel update send Error, could not transmit graph event {:?}",
            x.0
        ))
    }
}
