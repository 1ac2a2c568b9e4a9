use std::fmt;
use std::sync::Arc;

use policy_finder::{query_name, Policy, PolicyType};
use serde_json::Value;
use tracing::debug;

use crate::error::{ExecutionError, FieldError, Result};
use crate::field::{resolver, Arguments, Context, Resolver};
use crate::meta::PredicateFn;
use crate::policy::PolicyResolver;
use crate::spec::{Authorize, FieldAuthSpec, PolicySpec, RecordSpec};

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Permitted,
    Denied,
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Self::Permitted
        } else {
            Self::Denied
        }
    }
}

/// What a gate evaluates, resolved once at wrap time.
enum Check {
    Predicate(PredicateFn),
    Query(String),
}

/// Pre-resolution authorization check for one field.
///
/// On denial the inner resolver is never called. A soft gate then resolves
/// the field to null; a strict gate raises "You're not authorized to do
/// this" as an [`ExecutionError`].
pub struct AuthorizationGate {
    field: String,
    check: Check,
    raise_on_deny: bool,
    defer_denial: bool,
    record: RecordSpec,
    policy: PolicySpec,
    policies: PolicyResolver,
    current_user_key: String,
}

impl AuthorizationGate {
    pub fn new(
        field: impl Into<String>,
        spec: FieldAuthSpec,
        policies: PolicyResolver,
        current_user_key: impl Into<String>,
    ) -> Self {
        let field = field.into();
        let check = match spec.authorize {
            Authorize::Inferred => Check::Query(query_name(&underscore(&field))),
            Authorize::Query(query) => Check::Query(query_name(&query)),
            Authorize::Predicate(predicate) => Check::Predicate(predicate),
        };
        Self {
            field,
            check,
            raise_on_deny: spec.raise_on_deny,
            defer_denial: false,
            record: spec.record,
            policy: spec.policy,
            policies,
            current_user_key: current_user_key.into(),
        }
    }

    /// The policy query this gate evaluates, if it consults a policy.
    pub fn query(&self) -> Option<&str> {
        match &self.check {
            Check::Query(query) => Some(query),
            Check::Predicate(_) => None,
        }
    }

    pub fn raises_on_deny(&self) -> bool {
        self.raise_on_deny
    }

    /// Report soft denials as [`FieldError::Denied`] instead of null, for an
    /// enclosing after-scope to resolve.
    pub(crate) fn deferring_denial(mut self) -> Self {
        self.defer_denial = true;
        self
    }

    /// Decide whether the field may resolve for this parent.
    ///
    /// Errors from record/policy functions, policy lookup or the policy
    /// itself propagate; only a falsy answer counts as a denial.
    pub fn evaluate(&self, parent: &Value, arguments: &Arguments, context: &Context) -> Result<Decision> {
        let query = match &self.check {
            Check::Predicate(predicate) => {
                let decision = Decision::from(predicate(parent, arguments, context)?);
                debug!(field = %self.field, ?decision, "predicate gate evaluated");
                return Ok(decision);
            }
            Check::Query(query) => query,
        };

        let record = match &self.record {
            RecordSpec::Inferred => parent.clone(),
            RecordSpec::Literal(record) => record.clone(),
            RecordSpec::Computed(f) => f(parent, arguments, context)?,
        };
        let policy = self.policies.resolve(&self.policy, &record, arguments, context)?;

        let user = context.get(&self.current_user_key);
        let decision = Decision::from(policy.instantiate(user, &record).query(query)?);
        debug!(
            field = %self.field,
            policy = policy.name(),
            query = %query,
            ?decision,
            "policy gate evaluated"
        );
        Ok(decision)
    }

    /// Run the check, then `inner` with the original arguments if permitted.
    pub fn resolve(
        &self,
        inner: &Resolver,
        parent: &Value,
        arguments: &Arguments,
        context: &Context,
    ) -> Result<Value> {
        match self.evaluate(parent, arguments, context)? {
            Decision::Permitted => inner(parent, arguments, context),
            Decision::Denied if self.raise_on_deny => {
                Err(ExecutionError::not_authorized().into())
            }
            Decision::Denied if self.defer_denial => Err(FieldError::Denied),
            Decision::Denied => Ok(Value::Null),
        }
    }

    /// Wrap `inner` behind this gate.
    pub fn wrap(self, inner: Resolver) -> Resolver {
        let gate = Arc::new(self);
        resolver(move |parent, arguments, context| gate.resolve(&inner, parent, arguments, context))
    }
}

impl fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("field", &self.field)
            .field("query", &self.query())
            .field("raise_on_deny", &self.raise_on_deny)
            .field("defer_denial", &self.defer_denial)
            .field("record", &self.record)
            .field("policy", &self.policy)
            .field("current_user_key", &self.current_user_key)
            .finish_non_exhaustive()
    }
}

/// `displayName` -> `display_name`, `HTTPServer` -> `http_server`.
fn underscore(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                out.push('_');
            }
        }
        out.extend(ch.to_lowercase());
    }
    out
}
