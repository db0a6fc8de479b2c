//! # Hubsim - local CRM API emulator
//!
//! Single-process stand-in for a CRM platform's REST API, backed by SQLite.
//!
//! Hubsim provides:
//! - A schema-less object store: objects plus arbitrary string properties with history
//! - Typed, labelled associations between objects with best-effort mirrored edges
//! - A search compiler turning filter groups, sorts and paging into SQL
//! - Property, schema, pipeline, owner and list metadata stores
//! - An axum HTTP layer shaped like the upstream REST API

pub mod model;
pub mod storage;
pub mod server;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use model::{
    AssociationCategory, AssociationSpec, AssociationType, BatchResult, CrmObject, ObjectType,
    Page,
};
pub use storage::{Session, Store};

/// Result type alias for hubsim operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for hubsim operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound { kind, id: id.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Map a unique-constraint failure to `Conflict`, pass everything else through.
    pub(crate) fn conflict_on_unique(err: rusqlite::Error, message: impl Into<String>) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::Conflict(message.into())
            }
            other => Error::Storage(other),
        }
    }
}
