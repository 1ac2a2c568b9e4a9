use std::collections::HashMap;

use serde_json::Value;
use tracing::trace;

use crate::error::{PolicyError, Result};
use crate::policy::{PolicyLookup, PolicyRef, PolicyType};

/// Default object key naming a record's type.
pub const DEFAULT_TYPE_FIELD: &str = "__typename";

/// Default suffix appended to a model name to form its policy name.
pub const DEFAULT_SUFFIX: &str = "Policy";

/// Convention-based [`PolicyLookup`]: `Post` records are governed by the
/// registered `PostPolicy`.
///
/// The model name is derived from the subject:
///
/// * a string is a model name; `snake_case` names are camelized
///   (`"scope_test"` becomes `ScopeTest`),
/// * an object names its model in the type field (default `__typename`),
/// * an array uses the model of its first element.
///
/// Anything else has no model and fails with [`PolicyError::NotFound`].
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: HashMap<String, PolicyRef>,
    type_field: String,
    suffix: String,
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyRegistry {
    /// Empty registry using the default conventions.
    pub fn new() -> Self {
        Self {
            policies: HashMap::new(),
            type_field: DEFAULT_TYPE_FIELD.to_string(),
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }

    /// Read model names from `field` instead of `__typename`.
    pub fn with_type_field(mut self, field: impl Into<String>) -> Self {
        self.type_field = field.into();
        self
    }

    /// Use `suffix` instead of `Policy` when forming policy names.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Register a policy under its own name.
    pub fn register(mut self, policy: PolicyRef) -> Self {
        self.insert(policy);
        self
    }

    /// Register a policy under its own name, replacing any previous one.
    pub fn insert(&mut self, policy: PolicyRef) {
        self.policies.insert(policy.name().to_string(), policy);
    }

    /// Look up a policy by its exact name.
    pub fn get(&self, name: &str) -> Option<&PolicyRef> {
        self.policies.get(name)
    }

    /// Number of registered policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether no policies are registered.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Derive the model name of `subject`, if it has one.
    pub fn model_name(&self, subject: &Value) -> Option<String> {
        match subject {
            Value::String(name) if !name.is_empty() => Some(camelize(name)),
            Value::Object(map) => map
                .get(&self.type_field)
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .map(camelize),
            Value::Array(items) => items.first().and_then(|first| self.model_name(first)),
            _ => None,
        }
    }

    /// The policy name the convention assigns to `subject`.
    pub fn policy_name(&self, subject: &Value) -> Option<String> {
        self.model_name(subject)
            .map(|model| format!("{model}{}", self.suffix))
    }
}

impl PolicyLookup for PolicyRegistry {
    fn policy_for(&self, subject: &Value) -> Result<PolicyRef> {
        let Some(name) = self.policy_name(subject) else {
            return Err(PolicyError::not_found(describe(subject)));
        };
        trace!(policy = %name, "looking up policy by convention");
        self.policies
            .get(&name)
            .cloned()
            .ok_or_else(|| PolicyError::not_found(name))
    }
}

/// Convert `snake_case` into `CamelCase`; names without underscores only get
/// their first letter upcased.
fn camelize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for part in name.split('_').filter(|p| !p.is_empty()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Short description of a subject for error messages.
fn describe(subject: &Value) -> String {
    match subject {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(n) => format!("the number {n}"),
        Value::String(_) => "an empty model name".to_string(),
        Value::Array(items) if items.is_empty() => "an empty list".to_string(),
        Value::Array(_) => "a list of untyped values".to_string(),
        Value::Object(_) => "an untyped object".to_string(),
    }
}
