//! # Error Taxonomy
//!
//! Unified error handling for every component of the fabric. One enum per the
//! taxonomy in the design spec, following the same shape as a typical client
//! error type in this codebase: one variant per failure kind, `#[from]`
//! conversions where a dependency error maps 1:1, and helper constructors for
//! variants with structured fields.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TaskmeshError>;

/// Comprehensive error type for the messaging and task-execution fabric.
#[derive(Debug, Error)]
pub enum TaskmeshError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("queue stopped")]
    QueueStopped,

    #[error("queue empty")]
    QueueEmpty,

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("conversion error: cannot convert {from} to {to}")]
    ConversionError { from: String, to: String },

    #[error("null access: value {name} is null")]
    NullAccess { name: String },

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("circuit open for {0}")]
    CircuitOpen(String),

    #[error("service degraded: {service} ({reason})")]
    ServiceDegraded { service: String, reason: String },

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("bus is not running (state: {0})")]
    BusNotRunning(String),

    #[error("no handler registered for {0}")]
    NoHandler(String),

    #[error("container parse error: {0}")]
    ParseError(String),

    #[error("container is in an invalid state and rejects further operations")]
    ContainerInvalid,

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskmeshError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conversion(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::ConversionError {
            from: from.into(),
            to: to.into(),
        }
    }

    /// A stable, machine-readable code for the error kind. Consumers that need
    /// to key off error category (not message text) use this.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::InvalidState(_) => "invalid_state",
            Self::QueueStopped => "queue_stopped",
            Self::QueueEmpty => "queue_empty",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::ConversionError { .. } => "conversion_error",
            Self::NullAccess { .. } => "null_access",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::CircuitOpen(_) => "circuit_open",
            Self::ServiceDegraded { .. } => "service_degraded",
            Self::OperationFailed(_) => "operation_failed",
            Self::ResourceExhausted(_) => "resource_exhausted",
            Self::BusNotRunning(_) => "bus_not_running",
            Self::NoHandler(_) => "no_handler",
            Self::ParseError(_) => "parse_error",
            Self::ContainerInvalid => "container_invalid",
            Self::ConfigError(_) => "config_error",
            Self::Io(_) => "io_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_stable_per_variant() {
        assert_eq!(TaskmeshError::QueueEmpty.code(), "queue_empty");
        assert_eq!(
            TaskmeshError::invalid_argument("x").code(),
            "invalid_argument"
        );
        assert_eq!(
            TaskmeshError::conversion("string", "int").code(),
            "conversion_error"
        );
    }

    #[test]
    fn display_messages_are_human_readable() {
        let err = TaskmeshError::NoHandler("work".into());
        assert_eq!(err.to_string(), "no handler registered for work");
    }
}
