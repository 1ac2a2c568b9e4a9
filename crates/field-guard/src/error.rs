use policy_finder::PolicyError;
use thiserror::Error;

/// Message surfaced to clients when a strict gate denies a field.
pub const NOT_AUTHORIZED_MESSAGE: &str = "You're not authorized to do this";

/// A user-visible execution error.
///
/// The execution engine reports these in the response's error list and keeps
/// resolving the rest of the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error a strict gate raises on denial.
    pub fn not_authorized() -> Self {
        Self::new(NOT_AUTHORIZED_MESSAGE)
    }
}

/// Errors raised while resolving a field.
#[derive(Debug, Error)]
pub enum FieldError {
    /// User-visible failure; does not abort the request.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// No policy or scope could be found, or a policy query is undefined.
    /// Indicates a schema defect rather than a denial.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Failure from a resolver or a user-supplied callable, passed through
    /// as-is.
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// Soft denial raised by a gate nested inside an after-scope. The
    /// after-scope resolves it to null; it never leaves an instrumented
    /// resolver.
    #[error("field access denied")]
    Denied,
}

impl FieldError {
    /// Whether this is the denial raised by a strict gate.
    pub fn is_not_authorized(&self) -> bool {
        matches!(self, Self::Execution(e) if e.message == NOT_AUTHORIZED_MESSAGE)
    }
}

/// Configuration errors detected while wrapping a field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstrumentError {
    #[error("invalid value passed to `{option}` on field `{field}`: expected :infer_scope, a scope function or a policy type, got {found}")]
    InvalidScopeSpec {
        field: String,
        option: String,
        found: String,
    },

    #[error("invalid value passed to `{option}` on field `{field}`: expected true, a query name or a predicate, got {found}")]
    InvalidAuthorizeSpec {
        field: String,
        option: String,
        found: String,
    },

    #[error("invalid value passed to `{option}` on field `{field}`: expected {expected}, got {found}")]
    InvalidOption {
        field: String,
        option: String,
        expected: String,
        found: String,
    },

    #[error("field `{field}` sets both `{first}` and `{second}`")]
    ConflictingOptions {
        field: String,
        first: String,
        second: String,
    },
}

/// Result type alias for field resolution
pub type Result<T> = std::result::Result<T, FieldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_authorized_message() {
        let err = FieldError::from(ExecutionError::not_authorized());
        assert_eq!(err.to_string(), "You're not authorized to do this");
        assert!(err.is_not_authorized());
    }

    #[test]
    fn other_errors_pass_through() {
        let err = FieldError::from(anyhow::anyhow!("database unavailable"));
        assert_eq!(err.to_string(), "database unavailable");
        assert!(!err.is_not_authorized());
    }

    #[test]
    fn invalid_scope_message_names_field() {
        let err = InstrumentError::InvalidScopeSpec {
            field: "posts".into(),
            option: "after_scope".into(),
            found: "the string \"invalid value\"".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("`after_scope`"), "{msg}");
        assert!(msg.contains("`posts`"), "{msg}");
    }
}
