//! Error types for the replication routing graph.
//!
//! Most failure modes of the routing pipeline are not errors at all: stale
//! references and contradictory class configuration are logged and the
//! operation degrades to a no-op. The variants below cover the cases where a
//! caller handed the graph something it cannot work with.

use crate::types::{ClassId, ConnectionId, EntityId};

/// Errors returned by graph and registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RepGraphError {
    #[error("Unknown class: {0:?}")]
    UnknownClass(ClassId),

    #[error("Unknown class name: {0}")]
    UnknownClassName(String),

    #[error("Class already registered: {0}")]
    DuplicateClass(String),

    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    #[error("Connection already registered: {0}")]
    DuplicateConnection(ConnectionId),

    #[error("Entity not networked: {0}")]
    UnknownEntity(EntityId),

    #[error("Entity already networked: {0}")]
    DuplicateEntity(EntityId),

    #[error("Bucket count must be at least 1, got {0}")]
    InvalidBucketCount(usize),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigValidationError),
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
