//! Policy lookup and evaluation errors

use thiserror::Error;

/// Errors raised while locating or evaluating a policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// No policy matches the subject by convention.
    #[error("unable to find policy for {subject}")]
    NotFound { subject: String },

    /// The policy exists but declares no nested scope.
    #[error("{policy} does not define a Scope")]
    ScopeNotDefined { policy: String },

    /// The policy has no predicate with the requested name.
    #[error("{policy} does not define query `{query}`")]
    UndefinedQuery { policy: String, query: String },

    /// Failure raised by a hand-written policy or scope implementation.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PolicyError {
    /// Create a not-found error describing `subject`.
    pub fn not_found(subject: impl Into<String>) -> Self {
        Self::NotFound {
            subject: subject.into(),
        }
    }

    /// Create a missing-scope error for `policy`.
    pub fn scope_not_defined(policy: impl Into<String>) -> Self {
        Self::ScopeNotDefined {
            policy: policy.into(),
        }
    }

    /// Create an undefined-query error.
    pub fn undefined_query(policy: impl Into<String>, query: impl Into<String>) -> Self {
        Self::UndefinedQuery {
            policy: policy.into(),
            query: query.into(),
        }
    }
}

/// Result type alias for policy operations
pub type Result<T> = std::result::Result<T, PolicyError>;
