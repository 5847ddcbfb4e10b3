//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic input failures. Broker and transport
/// failures belong to `jobwire-broker` / `jobwire-infra`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A required field was absent or blank.
    ///
    /// The message is part of the HTTP contract (`{"error": "userId is required"}`).
    #[error("{0} is required")]
    MissingField(&'static str),
}

impl DomainError {
    pub fn missing(field: &'static str) -> Self {
        Self::MissingField(field)
    }
}
