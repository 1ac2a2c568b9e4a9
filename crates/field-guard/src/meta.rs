//! Field metadata: the declarative options attached to a field at schema
//! definition time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use policy_finder::{PolicyRef, PolicyType};
use serde_json::Value;

use crate::field::{Arguments, Context};

/// Metadata attached to a field, by option name.
pub type Metadata = BTreeMap<String, Meta>;

/// `(parent, arguments, context) -> allowed?`
pub type PredicateFn =
    Arc<dyn Fn(&Value, &Arguments, &Context) -> anyhow::Result<bool> + Send + Sync>;

/// `(parent, arguments, context) -> record`
pub type RecordFn =
    Arc<dyn Fn(&Value, &Arguments, &Context) -> anyhow::Result<Value> + Send + Sync>;

/// `(record, arguments, context) -> policy type`
pub type PolicyFn =
    Arc<dyn Fn(&Value, &Arguments, &Context) -> anyhow::Result<PolicyRef> + Send + Sync>;

/// `(subject, arguments, context) -> narrowed subject`
pub type ScopeFn =
    Arc<dyn Fn(&Value, &Arguments, &Context) -> anyhow::Result<Value> + Send + Sync>;

/// Option names understood by the [`Instrumenter`](crate::Instrumenter).
pub mod keys {
    /// Soft gate: denial resolves the field to null.
    pub const AUTHORIZE: &str = "authorize";
    /// Strict gate: denial raises an execution error.
    pub const AUTHORIZE_STRICT: &str = "authorize!";
    pub const RECORD: &str = "record";
    pub const POLICY: &str = "policy";
    pub const BEFORE_SCOPE: &str = "before_scope";
    /// Deprecated spelling of [`BEFORE_SCOPE`].
    pub const SCOPE: &str = "scope";
    pub const AFTER_SCOPE: &str = "after_scope";
    /// Per-field override of the context key holding the current user.
    pub const CURRENT_USER: &str = "current_user";
}

/// Symbol requesting scope inference from the subject's policy.
pub const INFER_SCOPE: &str = "infer_scope";

/// A single metadata value.
///
/// Options accept several forms (a flag, a name, a function, a policy type),
/// so metadata is stored untyped and validated when the field is wrapped.
#[derive(Clone)]
pub enum Meta {
    Flag(bool),
    /// An identifier, such as a query name or `infer_scope`.
    Symbol(String),
    /// Free text.
    Text(String),
    Json(Value),
    Predicate(PredicateFn),
    Record(RecordFn),
    PolicyFn(PolicyFn),
    Policy(PolicyRef),
    Scope(ScopeFn),
}

impl Meta {
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    /// The `infer_scope` symbol.
    pub fn infer_scope() -> Self {
        Self::Symbol(INFER_SCOPE.to_string())
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Value, &Arguments, &Context) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    pub fn record_fn<F>(f: F) -> Self
    where
        F: Fn(&Value, &Arguments, &Context) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::Record(Arc::new(f))
    }

    pub fn policy_fn<F>(f: F) -> Self
    where
        F: Fn(&Value, &Arguments, &Context) -> anyhow::Result<PolicyRef> + Send + Sync + 'static,
    {
        Self::PolicyFn(Arc::new(f))
    }

    pub fn scope_fn<F>(f: F) -> Self
    where
        F: Fn(&Value, &Arguments, &Context) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::Scope(Arc::new(f))
    }

    pub fn policy(policy: PolicyRef) -> Self {
        Self::Policy(policy)
    }

    /// Human-readable description used in configuration errors.
    pub fn describe(&self) -> String {
        match self {
            Self::Flag(b) => b.to_string(),
            Self::Symbol(s) => format!("the symbol :{s}"),
            Self::Text(s) => format!("the string {s:?}"),
            Self::Json(v) => format!("the value {v}"),
            Self::Predicate(_) => "a predicate function".to_string(),
            Self::Record(_) => "a record function".to_string(),
            Self::PolicyFn(_) => "a policy function".to_string(),
            Self::Policy(p) => format!("the policy {}", p.name()),
            Self::Scope(_) => "a scope function".to_string(),
        }
    }
}

impl fmt::Debug for Meta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl From<bool> for Meta {
    fn from(flag: bool) -> Self {
        Self::Flag(flag)
    }
}

impl From<&str> for Meta {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Meta {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for Meta {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<PolicyRef> for Meta {
    fn from(policy: PolicyRef) -> Self {
        Self::Policy(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_finder::PolicyDef;
    use serde_json::json;

    #[test]
    fn conversions() {
        assert!(matches!(Meta::from(true), Meta::Flag(true)));
        assert!(matches!(Meta::from("create"), Meta::Text(s) if s == "create"));
        assert!(matches!(Meta::from(json!({"id": 1})), Meta::Json(_)));
        assert!(matches!(Meta::infer_scope(), Meta::Symbol(s) if s == INFER_SCOPE));
        let policy = PolicyDef::new("PostPolicy").into_ref();
        assert!(matches!(Meta::from(policy), Meta::Policy(_)));
    }

    #[test]
    fn describe_values() {
        assert_eq!(Meta::from("invalid value").describe(), "the string \"invalid value\"");
        assert_eq!(Meta::symbol("create").describe(), "the symbol :create");
        assert_eq!(
            Meta::scope_fn(|v, _, _| Ok(v.clone())).describe(),
            "a scope function"
        );
        assert_eq!(
            Meta::policy(PolicyDef::new("PostPolicy").into_ref()).describe(),
            "the policy PostPolicy"
        );
    }
}
