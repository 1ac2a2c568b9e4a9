use std::fmt;
use std::sync::Arc;

use policy_finder::{scope_of, PolicyLookup, PolicyRef, ScopeRef};
use serde_json::Value;
use tracing::trace;

use crate::error::Result;
use crate::field::{Arguments, Context};
use crate::spec::PolicySpec;

/// Picks the policy (or scope) type for a record.
///
/// Explicit configuration wins; otherwise the injected [`PolicyLookup`] is
/// asked. Records wrapping a model (objects carrying the model key) are
/// looked up by that model rather than by themselves.
#[derive(Clone)]
pub struct PolicyResolver {
    lookup: Arc<dyn PolicyLookup>,
    model_key: String,
}

impl PolicyResolver {
    pub fn new(lookup: Arc<dyn PolicyLookup>, model_key: impl Into<String>) -> Self {
        Self {
            lookup,
            model_key: model_key.into(),
        }
    }

    /// The value policies are looked up from: the record's model if it has
    /// one, else the record itself.
    pub fn lookup_key<'a>(&self, record: &'a Value) -> &'a Value {
        record
            .as_object()
            .and_then(|map| map.get(&self.model_key))
            .unwrap_or(record)
    }

    /// Resolve the policy type for `record` according to `spec`.
    ///
    /// Lookup failures propagate; they are never treated as a denial.
    pub fn resolve(
        &self,
        spec: &PolicySpec,
        record: &Value,
        arguments: &Arguments,
        context: &Context,
    ) -> Result<PolicyRef> {
        match spec {
            PolicySpec::Literal(policy) => Ok(Arc::clone(policy)),
            PolicySpec::Computed(f) => Ok(f(record, arguments, context)?),
            PolicySpec::Named(name) => {
                trace!(model = %name, "looking up named policy");
                Ok(self.lookup.policy_for(&Value::String(name.clone()))?)
            }
            PolicySpec::Inferred => Ok(self.lookup.policy_for(self.lookup_key(record))?),
        }
    }

    /// Infer the scope type for `subject` from its policy.
    pub fn infer_scope(&self, subject: &Value) -> Result<ScopeRef> {
        Ok(self.lookup.scope_for(self.lookup_key(subject))?)
    }

    /// The nested scope of an explicit policy.
    pub fn scope_of(&self, policy: &PolicyRef) -> Result<ScopeRef> {
        Ok(scope_of(policy)?)
    }
}

impl fmt::Debug for PolicyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyResolver")
            .field("model_key", &self.model_key)
            .finish_non_exhaustive()
    }
}
