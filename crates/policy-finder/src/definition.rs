use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{PolicyError, Result};
use crate::policy::{query_name, Policy, PolicyRef, PolicyType, Scope, ScopeRef, ScopeType};

type QueryFn = Arc<dyn Fn(Option<&Value>, &Value) -> bool + Send + Sync>;
type ResolveFn = Arc<dyn Fn(Option<&Value>, &Value) -> Value + Send + Sync>;

/// A policy type declared from closures.
///
/// ```rust
/// use policy_finder::{PolicyDef, PolicyType};
///
/// let policy = PolicyDef::new("PostPolicy")
///     .query("update", |user, post| user.is_some() && post["author"] == user.unwrap()["name"])
///     .scope(|_user, posts| posts.clone())
///     .into_ref();
/// assert_eq!(policy.name(), "PostPolicy");
/// ```
#[derive(Clone)]
pub struct PolicyDef {
    name: Arc<str>,
    queries: Arc<HashMap<String, QueryFn>>,
    scope: Option<ScopeRef>,
}

impl PolicyDef {
    /// Start a policy definition named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            queries: Arc::new(HashMap::new()),
            scope: None,
        }
    }

    /// Declare a predicate. `name` is stored with the `?` suffix, so
    /// `"update"` and `"update?"` register the same query.
    pub fn query<F>(mut self, name: &str, predicate: F) -> Self
    where
        F: Fn(Option<&Value>, &Value) -> bool + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.queries).insert(query_name(name), Arc::new(predicate));
        self
    }

    /// Declare the nested scope from a resolve closure.
    pub fn scope<F>(mut self, resolve: F) -> Self
    where
        F: Fn(Option<&Value>, &Value) -> Value + Send + Sync + 'static,
    {
        self.scope = Some(Arc::new(ScopeDef {
            resolve: Arc::new(resolve),
        }));
        self
    }

    /// Use an existing scope type as the nested scope.
    pub fn with_scope(mut self, scope: ScopeRef) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Finish the definition as a shareable [`PolicyRef`].
    pub fn into_ref(self) -> PolicyRef {
        Arc::new(self)
    }
}

impl fmt::Debug for PolicyDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut queries: Vec<&String> = self.queries.keys().collect();
        queries.sort();
        f.debug_struct("PolicyDef")
            .field("name", &self.name)
            .field("queries", &queries)
            .field("scope", &self.scope.is_some())
            .finish()
    }
}

impl PolicyType for PolicyDef {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self, user: Option<&Value>, record: &Value) -> Box<dyn Policy> {
        Box::new(DefinedPolicy {
            name: Arc::clone(&self.name),
            queries: Arc::clone(&self.queries),
            user: user.cloned(),
            record: record.clone(),
        })
    }

    fn scope(&self) -> Option<ScopeRef> {
        self.scope.clone()
    }
}

struct DefinedPolicy {
    name: Arc<str>,
    queries: Arc<HashMap<String, QueryFn>>,
    user: Option<Value>,
    record: Value,
}

impl Policy for DefinedPolicy {
    fn query(&self, query: &str) -> Result<bool> {
        let predicate = self
            .queries
            .get(query)
            .ok_or_else(|| PolicyError::undefined_query(&*self.name, query))?;
        Ok(predicate(self.user.as_ref(), &self.record))
    }
}

struct ScopeDef {
    resolve: ResolveFn,
}

impl ScopeType for ScopeDef {
    fn instantiate(&self, user: Option<&Value>, subject: &Value) -> Box<dyn Scope> {
        Box::new(DefinedScope {
            resolve: Arc::clone(&self.resolve),
            user: user.cloned(),
            subject: subject.clone(),
        })
    }
}

struct DefinedScope {
    resolve: ResolveFn,
    user: Option<Value>,
    subject: Value,
}

impl Scope for DefinedScope {
    fn resolve(&self) -> Result<Value> {
        Ok((self.resolve)(self.user.as_ref(), &self.subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post_policy() -> PolicyRef {
        PolicyDef::new("PostPolicy")
            .query("show", |_, post| post["published"] == json!(true))
            .query("update?", |user, post| {
                user.map(|u| u["name"] == post["author"]).unwrap_or(false)
            })
            .scope(|_, posts| match posts {
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .filter(|p| p["published"] == json!(true))
                        .cloned()
                        .collect(),
                ),
                other => other.clone(),
            })
            .into_ref()
    }

    #[test]
    fn query_sees_user_and_record() {
        let policy = post_policy();
        let ada = json!({"name": "ada"});
        let post = json!({"author": "ada", "published": false});

        let instance = policy.instantiate(Some(&ada), &post);
        assert!(instance.query("update?").unwrap());
        assert!(!instance.query("show?").unwrap());

        let anonymous = policy.instantiate(None, &post);
        assert!(!anonymous.query("update?").unwrap());
    }

    #[test]
    fn undefined_query_is_an_error() {
        let policy = post_policy();
        let err = policy
            .instantiate(None, &json!({}))
            .query("destroy?")
            .unwrap_err();
        assert!(
            matches!(&err, PolicyError::UndefinedQuery { policy, query } if policy == "PostPolicy" && query == "destroy?"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn scope_narrows_subject() {
        let scope = post_policy().scope().expect("scope declared");
        let posts = json!([
            {"title": "a", "published": true},
            {"title": "b", "published": false},
        ]);
        let resolved = scope.instantiate(None, &posts).resolve().unwrap();
        assert_eq!(resolved, json!([{"title": "a", "published": true}]));
    }

    #[test]
    fn policy_without_scope() {
        let policy = PolicyDef::new("UserPolicy").into_ref();
        assert!(policy.scope().is_none());
        let err = crate::policy::scope_of(&policy).err().expect("no scope");
        assert_eq!(err.to_string(), "UserPolicy does not define a Scope");
    }
}
