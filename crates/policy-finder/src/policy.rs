use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;

/// Shared handle to a policy type.
pub type PolicyRef = Arc<dyn PolicyType>;

/// Shared handle to a scope type.
pub type ScopeRef = Arc<dyn ScopeType>;

/// A policy type: a factory for per-check [`Policy`] instances.
///
/// Instances are constructed with the current user and the record being
/// authorized, evaluated once and dropped. Implementors must not keep
/// per-request state on the type itself.
pub trait PolicyType: Send + Sync {
    /// Name of the policy type (e.g. `"PostPolicy"`).
    fn name(&self) -> &str;

    /// Build a policy instance for a single check.
    fn instantiate(&self, user: Option<&Value>, record: &Value) -> Box<dyn Policy>;

    /// The nested scope type, if the policy declares one.
    fn scope(&self) -> Option<ScopeRef>;
}

/// A policy instance bound to a user and a record.
pub trait Policy {
    /// Evaluate the predicate named `query` (e.g. `"update?"`).
    fn query(&self, query: &str) -> Result<bool>;
}

/// A scope type nested inside a policy.
pub trait ScopeType: Send + Sync {
    /// Build a scope instance that narrows `subject` for `user`.
    fn instantiate(&self, user: Option<&Value>, subject: &Value) -> Box<dyn Scope>;
}

/// A scope instance bound to a user and a subject.
pub trait Scope {
    /// Produce the narrowed subject.
    fn resolve(&self) -> Result<Value>;
}

/// Locates the policy that governs a subject.
///
/// The subject is whatever the caller wants to authorize or scope: a record,
/// a list of records or a model name. How a subject maps to a policy is up to
/// the implementation.
pub trait PolicyLookup: Send + Sync {
    /// Find the policy for `subject`.
    fn policy_for(&self, subject: &Value) -> Result<PolicyRef>;

    /// Find the scope for `subject`: the nested scope of its policy.
    fn scope_for(&self, subject: &Value) -> Result<ScopeRef> {
        let policy = self.policy_for(subject)?;
        scope_of(&policy)
    }
}

/// Return the nested scope of `policy`, or a `ScopeNotDefined` error.
pub fn scope_of(policy: &PolicyRef) -> Result<ScopeRef> {
    policy
        .scope()
        .ok_or_else(|| crate::PolicyError::scope_not_defined(policy.name()))
}

/// Append the `?` predicate suffix to `name` unless it is already there.
pub fn query_name(name: &str) -> String {
    if name.ends_with('?') {
        name.to_string()
    } else {
        format!("{name}?")
    }
}

impl fmt::Debug for dyn PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyType")
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_name_appends_suffix_once() {
        assert_eq!(query_name("update"), "update?");
        assert_eq!(query_name("update?"), "update?");
    }
}
