use std::fmt;
use std::sync::Arc;

use policy_finder::{Scope, ScopeRef, ScopeType};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{FieldError, Result};
use crate::field::{resolver, Arguments, Context, Resolver};
use crate::policy::PolicyResolver;
use crate::spec::{ScopeSlot, ScopeSpec};

/// Warning emitted when a field uses the deprecated `scope` option.
pub const SCOPE_DEPRECATION_MESSAGE: &str = "Using `scope` is deprecated and might be removed in \
the future. Please use `before_scope` or `after_scope` instead.";

/// A deprecated option was used on a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deprecation {
    pub field: String,
    pub message: &'static str,
}

/// Receives deprecation notices. Invoked once per resolution of an affected
/// field.
pub type DeprecationHook = Arc<dyn Fn(&Deprecation) + Send + Sync>;

/// Hook used when none is configured: log through `tracing`.
pub fn log_deprecation() -> DeprecationHook {
    Arc::new(|notice: &Deprecation| {
        warn!(field = %notice.field, "{}", notice.message);
    })
}

/// Narrows a subject (a parent before resolution, or a result after) with a
/// scope.
pub struct ScopeFilter {
    field: String,
    slot: ScopeSlot,
    spec: ScopeSpec,
    policies: PolicyResolver,
    current_user_key: String,
    deprecation: Option<DeprecationHook>,
}

impl ScopeFilter {
    pub fn new(
        field: impl Into<String>,
        slot: ScopeSlot,
        spec: ScopeSpec,
        policies: PolicyResolver,
        current_user_key: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            slot,
            spec,
            policies,
            current_user_key: current_user_key.into(),
            deprecation: None,
        }
    }

    /// Report every application of this filter through `hook`.
    pub fn with_deprecation(mut self, hook: DeprecationHook) -> Self {
        self.deprecation = Some(hook);
        self
    }

    pub fn slot(&self) -> ScopeSlot {
        self.slot
    }

    /// Narrow `subject`.
    ///
    /// Scope lookup failures propagate. An inferred scope leaves null and
    /// empty lists as they are, since neither names a model to infer from.
    pub fn apply(&self, subject: &Value, arguments: &Arguments, context: &Context) -> Result<Value> {
        if let Some(hook) = &self.deprecation {
            hook(&Deprecation {
                field: self.field.clone(),
                message: SCOPE_DEPRECATION_MESSAGE,
            });
        }

        let scope: ScopeRef = match &self.spec {
            ScopeSpec::Computed(f) => {
                debug!(field = %self.field, slot = %self.slot, "applying scope function");
                return Ok(f(subject, arguments, context)?);
            }
            ScopeSpec::Inferred if is_vacant(subject) => {
                debug!(field = %self.field, slot = %self.slot, "nothing to infer a scope from");
                return Ok(subject.clone());
            }
            ScopeSpec::Inferred => self.policies.infer_scope(subject)?,
            ScopeSpec::Policy(policy) => self.policies.scope_of(policy)?,
        };
        debug!(field = %self.field, slot = %self.slot, "applying policy scope");

        let user = context.get(&self.current_user_key);
        Ok(scope.instantiate(user, subject).resolve()?)
    }

    /// Wrap `inner` with this filter.
    ///
    /// A before filter hands the narrowed parent to `inner`. An after filter
    /// narrows whatever `inner` returns; a deferred soft denial from an inner
    /// gate becomes null without running the scope.
    pub fn wrap(self, inner: Resolver) -> Resolver {
        let filter = Arc::new(self);
        match filter.slot {
            ScopeSlot::Before => resolver(move |parent, arguments, context| {
                let scoped = filter.apply(parent, arguments, context)?;
                inner(&scoped, arguments, context)
            }),
            ScopeSlot::After => resolver(move |parent, arguments, context| {
                match inner(parent, arguments, context) {
                    Ok(value) => filter.apply(&value, arguments, context),
                    Err(FieldError::Denied) => Ok(Value::Null),
                    Err(err) => Err(err),
                }
            }),
        }
    }
}

fn is_vacant(subject: &Value) -> bool {
    match subject {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

impl fmt::Debug for ScopeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeFilter")
            .field("field", &self.field)
            .field("slot", &self.slot)
            .field("spec", &self.spec)
            .field("current_user_key", &self.current_user_key)
            .field("deprecated", &self.deprecation.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use policy_finder::{PolicyDef, PolicyRef, PolicyRegistry};
    use serde_json::json;

    use crate::field::resolvers;

    fn published(_user: Option<&Value>, posts: &Value) -> Value {
        let kept = posts
            .as_array()
            .map(|posts| {
                posts
                    .iter()
                    .filter(|post| post["published"] == true)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Value::Array(kept)
    }

    fn post_policy() -> PolicyRef {
        PolicyDef::new("PostPolicy").scope(published).into_ref()
    }

    fn policies() -> PolicyResolver {
        let registry = PolicyRegistry::new()
            .register(post_policy())
            .register(PolicyDef::new("CommentPolicy").into_ref());
        PolicyResolver::new(Arc::new(registry), "model")
    }

    fn posts() -> Value {
        json!([
            {"__typename": "Post", "title": "Post 1", "published": true},
            {"__typename": "Post", "title": "Post 2", "published": false},
            {"__typename": "Post", "title": "Post 3", "published": true},
            {"__typename": "Post", "title": "Post 4", "published": false},
            {"__typename": "Post", "title": "Post 5", "published": true},
        ])
    }

    fn filter(slot: ScopeSlot, spec: ScopeSpec) -> ScopeFilter {
        ScopeFilter::new("posts", slot, spec, policies(), "current_user")
    }

    fn titles(value: &Value) -> Vec<&str> {
        value
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|post| post.as_str().or_else(|| post["title"].as_str()))
            .collect()
    }

    #[test]
    fn before_scope_infers_from_items() {
        let resolve =
            filter(ScopeSlot::Before, ScopeSpec::Inferred).wrap(resolvers::property("title"));
        let value = resolve(&posts(), &Arguments::new(), &Context::new()).unwrap();
        assert_eq!(titles(&value), ["Post 1", "Post 3", "Post 5"]);
    }

    #[test]
    fn after_scope_infers_from_result() {
        let resolve = filter(ScopeSlot::After, ScopeSpec::Inferred).wrap(resolvers::identity());
        let value = resolve(&posts(), &Arguments::new(), &Context::new()).unwrap();
        assert_eq!(titles(&value), ["Post 1", "Post 3", "Post 5"]);
    }

    #[test]
    fn dataset_scope_uses_model_accessor() {
        let registry = PolicyRegistry::new().register(
            PolicyDef::new("PostPolicy")
                .scope(|_, dataset| json!({"model": dataset["model"], "where": {"published": true}}))
                .into_ref(),
        );
        let policies = PolicyResolver::new(Arc::new(registry), "model");
        let resolve = ScopeFilter::new(
            "posts",
            ScopeSlot::Before,
            ScopeSpec::Inferred,
            policies,
            "current_user",
        )
        .wrap(resolvers::identity());

        let dataset = json!({"model": "Post"});
        let value = resolve(&dataset, &Arguments::new(), &Context::new()).unwrap();
        assert_eq!(value, json!({"model": "Post", "where": {"published": true}}));
    }

    #[test]
    fn explicit_policy_scope() {
        let scope = ScopeSpec::Policy(post_policy());
        let resolve = filter(ScopeSlot::After, scope).wrap(resolvers::identity());
        // Items without a type name would defeat inference.
        let untyped = json!([{"title": "a", "published": true}, {"title": "b"}]);
        let value = resolve(&untyped, &Arguments::new(), &Context::new()).unwrap();
        assert_eq!(titles(&value), ["a"]);
    }

    #[test]
    fn scope_function_receives_subject_and_context() {
        let scope = ScopeSpec::Computed(Arc::new(
            |posts: &Value, _: &Arguments, ctx: &Context| -> anyhow::Result<Value> {
                let limit = ctx.get("limit").and_then(Value::as_u64).unwrap_or(1) as usize;
                Ok(Value::Array(
                    posts.as_array().into_iter().flatten().take(limit).cloned().collect(),
                ))
            },
        ));
        let resolve = filter(ScopeSlot::Before, scope).wrap(resolvers::property("title"));
        let ctx = Context::new().with("limit", json!(2));
        let value = resolve(&posts(), &Arguments::new(), &ctx).unwrap();
        assert_eq!(titles(&value), ["Post 1", "Post 2"]);
    }

    #[test]
    fn scope_sees_current_user() {
        let policy = PolicyDef::new("PostPolicy")
            .scope(|user, posts| {
                let author = user.and_then(|u| u["name"].as_str()).unwrap_or_default();
                Value::Array(
                    posts
                        .as_array()
                        .into_iter()
                        .flatten()
                        .filter(|post| post["author"] == author)
                        .cloned()
                        .collect(),
                )
            })
            .into_ref();
        let resolve = ScopeFilter::new(
            "posts",
            ScopeSlot::After,
            ScopeSpec::Policy(policy),
            policies(),
            "viewer",
        )
        .wrap(resolvers::identity());

        let subject = json!([{"title": "x", "author": "ada"}, {"title": "y", "author": "bob"}]);
        let ctx = Context::new().with("viewer", json!({"name": "ada"}));
        let value = resolve(&subject, &Arguments::new(), &ctx).unwrap();
        assert_eq!(titles(&value), ["x"]);
    }

    fn counting_scope() -> (ScopeSpec, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let scope = ScopeSpec::Computed(Arc::new(
            move |subject: &Value, _: &Arguments, _: &Context| -> anyhow::Result<Value> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(if subject.is_null() { json!([]) } else { subject.clone() })
            },
        ));
        (scope, calls)
    }

    #[test]
    fn after_scope_function_maps_null_result() {
        let (scope, calls) = counting_scope();
        let resolve = filter(ScopeSlot::After, scope).wrap(resolver(|_, _, _| Ok(Value::Null)));
        let value = resolve(&posts(), &Arguments::new(), &Context::new()).unwrap();
        assert_eq!(value, json!([]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn after_scope_turns_deferred_denial_into_null() {
        let (scope, calls) = counting_scope();
        let resolve =
            filter(ScopeSlot::After, scope).wrap(resolver(|_, _, _| Err(FieldError::Denied)));
        let value = resolve(&posts(), &Arguments::new(), &Context::new()).unwrap();
        assert_eq!(value, Value::Null);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn after_scope_passes_other_errors_through() {
        let (scope, calls) = counting_scope();
        let resolve = filter(ScopeSlot::After, scope)
            .wrap(resolver(|_, _, _| Err(anyhow::anyhow!("timeout").into())));
        let err = resolve(&posts(), &Arguments::new(), &Context::new()).unwrap_err();
        assert_eq!(err.to_string(), "timeout");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn inferred_scope_leaves_empty_lists_alone() {
        let (args, ctx) = (Arguments::new(), Context::new());
        for slot in [ScopeSlot::Before, ScopeSlot::After] {
            let filter = filter(slot, ScopeSpec::Inferred);
            assert_eq!(filter.slot(), slot);
            let resolve = filter.wrap(resolvers::identity());
            assert_eq!(resolve(&json!([]), &args, &ctx).unwrap(), json!([]), "{slot}");
            assert_eq!(resolve(&Value::Null, &args, &ctx).unwrap(), Value::Null, "{slot}");
        }
    }

    #[test]
    fn missing_scope_propagates() {
        let comments = json!([{"__typename": "Comment"}]);
        let resolve = filter(ScopeSlot::Before, ScopeSpec::Inferred).wrap(resolvers::identity());
        let err = resolve(&comments, &Arguments::new(), &Context::new()).unwrap_err();
        assert!(matches!(err, FieldError::Policy(_)), "{err}");
        assert_eq!(err.to_string(), "CommentPolicy does not define a Scope");
    }

    #[test]
    fn deprecation_hook_fires_per_application() {
        let notices = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notices);
        let hook: DeprecationHook = Arc::new(move |notice: &Deprecation| {
            assert_eq!(notice.field, "posts");
            assert_eq!(notice.message, SCOPE_DEPRECATION_MESSAGE);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let resolve = filter(ScopeSlot::Before, ScopeSpec::Inferred)
            .with_deprecation(hook)
            .wrap(resolvers::identity());

        for _ in 0..3 {
            resolve(&posts(), &Arguments::new(), &Context::new()).unwrap();
        }
        assert_eq!(notices.load(Ordering::SeqCst), 3);
    }
}
