//! Unified error type.

use http::StatusCode;
use thiserror::Error;

/// Shorthand for results whose error is [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by hearth's fallible operations.
///
/// Expected control flow (404, 405, redirects, validation envelopes) is
/// expressed as a [`Response`](crate::Response), not as an `Error`. This type
/// covers failures: a broken route table, an action nobody registered, an
/// unguarded mass mutation, or the database going away.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration: {0}")]
    Config(String),

    #[error("invalid route `{pattern}`: {reason}")]
    InvalidRoute { pattern: String, reason: String },

    #[error("route named `{0}` not found")]
    UnknownRoute(String),

    /// A route references a controller, action or middleware that was never
    /// registered.
    #[error("{kind} not found: {name}")]
    Resolution { kind: &'static str, name: String },

    #[error("{operation} operation requires a WHERE clause to prevent mass {operation}s")]
    UnsafeMutation { operation: &'static str },

    #[error("invalid SQL identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("{0} not found")]
    ModelNotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("handler panicked: {0}")]
    Panic(String),
}

impl Error {
    pub(crate) fn resolution(kind: &'static str, name: impl Into<String>) -> Self {
        Self::Resolution { kind, name: name.into() }
    }

    pub(crate) fn invalid_route(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRoute { pattern: pattern.to_owned(), reason: reason.into() }
    }

    /// Short, stable name of the variant. Used as the `kind` field when the
    /// error is logged.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Config(_) => "config",
            Self::InvalidRoute { .. } => "invalid_route",
            Self::UnknownRoute(_) => "unknown_route",
            Self::Resolution { .. } => "resolution",
            Self::UnsafeMutation { .. } => "unsafe_mutation",
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::ModelNotFound(_) => "model_not_found",
            Self::Validation(_) => "validation",
            Self::Database(_) => "database",
            Self::Persistence(_) => "persistence",
            Self::Json(_) => "json",
            Self::Panic(_) => "panic",
        }
    }

    /// HTTP status used when this error reaches the top-level handler.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ModelNotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsafe_mutation_message_names_the_operation() {
        let err = Error::UnsafeMutation { operation: "delete" };
        assert_eq!(
            err.to_string(),
            "delete operation requires a WHERE clause to prevent mass deletes"
        );
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn client_facing_kinds_map_to_4xx() {
        assert_eq!(Error::ModelNotFound("tags".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::Validation("name is required".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::resolution("middleware", "nope").kind(), "resolution");
    }
}
