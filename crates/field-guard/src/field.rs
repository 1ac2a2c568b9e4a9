//! The slice of the execution engine the pipeline depends on: resolvers,
//! request contexts and fields carrying metadata.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::meta::{keys, Meta, Metadata};

/// Field arguments as supplied by the query.
pub type Arguments = serde_json::Map<String, Value>;

/// `(parent, arguments, context) -> field value`.
///
/// A resolver is immutable and may be invoked concurrently for unrelated
/// requests.
pub type Resolver = Arc<dyn Fn(&Value, &Arguments, &Context) -> Result<Value> + Send + Sync>;

/// Wrap a closure as a [`Resolver`].
pub fn resolver<F>(f: F) -> Resolver
where
    F: Fn(&Value, &Arguments, &Context) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Stock resolvers.
pub mod resolvers {
    use super::*;

    /// Read `name` from the parent object. List parents are mapped element
    /// by element; any other parent resolves to null.
    pub fn property(name: impl Into<String>) -> Resolver {
        let name = name.into();
        resolver(move |parent, _, _| Ok(read_property(parent, &name)))
    }

    fn read_property(parent: &Value, name: &str) -> Value {
        match parent {
            Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| read_property(item, name)).collect())
            }
            _ => Value::Null,
        }
    }

    /// Resolve to the parent itself.
    pub fn identity() -> Resolver {
        resolver(|parent, _, _| Ok(parent.clone()))
    }
}

/// Per-request context: string keys to values, e.g. the current user.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// A named resolution point with its resolver and definition-time metadata.
#[derive(Clone)]
pub struct Field {
    name: String,
    resolve: Resolver,
    metadata: Metadata,
}

impl Field {
    pub fn new(name: impl Into<String>, resolve: Resolver) -> Self {
        Self {
            name: name.into(),
            resolve,
            metadata: Metadata::new(),
        }
    }

    /// A field reading the property of the same name from its parent.
    pub fn property(name: impl Into<String>) -> Self {
        let name = name.into();
        let resolve = resolvers::property(name.clone());
        Self::new(name, resolve)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolve
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Attach a metadata value, replacing any previous value for `key`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Meta>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Re-derive this field with a different resolver; name and metadata are
    /// kept.
    pub fn with_resolver(&self, resolve: Resolver) -> Self {
        Self {
            name: self.name.clone(),
            resolve,
            metadata: self.metadata.clone(),
        }
    }

    /// Invoke the field's resolver.
    pub fn resolve(&self, parent: &Value, arguments: &Arguments, context: &Context) -> Result<Value> {
        (self.resolve)(parent, arguments, context)
    }

    // -- Declarative options ----------------------------------------------

    /// Soft authorization: `true` infers the query from the field name, a
    /// name selects the query, a predicate decides on its own.
    pub fn authorize(self, query: impl Into<Meta>) -> Self {
        self.with_metadata(keys::AUTHORIZE, query)
    }

    /// Strict authorization: like [`authorize`](Self::authorize) but denial
    /// raises an execution error.
    pub fn authorize_strict(self, query: impl Into<Meta>) -> Self {
        self.with_metadata(keys::AUTHORIZE_STRICT, query)
    }

    /// Record to authorize instead of the parent: a value or a record
    /// function.
    pub fn record(self, record: impl Into<Meta>) -> Self {
        self.with_metadata(keys::RECORD, record)
    }

    /// Policy to use instead of the record's own: a policy type, a model
    /// name or a policy function.
    pub fn policy(self, policy: impl Into<Meta>) -> Self {
        self.with_metadata(keys::POLICY, policy)
    }

    pub fn before_scope(self, scope: impl Into<Meta>) -> Self {
        self.with_metadata(keys::BEFORE_SCOPE, scope)
    }

    /// Deprecated alias of [`before_scope`](Self::before_scope).
    #[deprecated(note = "use `before_scope` or `after_scope` instead")]
    pub fn scope(self, scope: impl Into<Meta>) -> Self {
        self.with_metadata(keys::SCOPE, scope)
    }

    pub fn after_scope(self, scope: impl Into<Meta>) -> Self {
        self.with_metadata(keys::AFTER_SCOPE, scope)
    }

    /// Read the current user from `key` in the request context for this
    /// field only.
    pub fn current_user(self, key: impl Into<String>) -> Self {
        self.with_metadata(keys::CURRENT_USER, Meta::Symbol(key.into()))
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn property_reads_object_key() {
        let field = Field::property("title");
        let parent = json!({"title": "First Post", "text": "..."});
        let value = field.resolve(&parent, &Arguments::new(), &Context::new()).unwrap();
        assert_eq!(value, json!("First Post"));
    }

    #[test]
    fn property_maps_lists_and_defaults_to_null() {
        let resolve = resolvers::property("title");
        let ctx = Context::new();
        let args = Arguments::new();

        let list = json!([{"title": "a"}, {"title": "b"}, {}]);
        assert_eq!(resolve(&list, &args, &ctx).unwrap(), json!(["a", "b", null]));
        assert_eq!(resolve(&json!(7), &args, &ctx).unwrap(), Value::Null);
    }

    #[test]
    fn context_lookup() {
        let ctx = Context::new().with("current_user", json!({"name": "ada"}));
        assert_eq!(ctx.get("current_user"), Some(&json!({"name": "ada"})));
        assert_eq!(ctx.get("viewer"), None);
    }

    #[test]
    fn with_resolver_keeps_name_and_metadata() {
        let field = Field::property("title").authorize(true);
        let derived = field.with_resolver(resolvers::identity());

        assert_eq!(derived.name(), "title");
        assert!(derived.metadata().contains_key(keys::AUTHORIZE));
        let parent = json!({"title": "x"});
        assert_eq!(
            derived.resolve(&parent, &Arguments::new(), &Context::new()).unwrap(),
            parent
        );
    }

    #[test]
    #[allow(deprecated)]
    fn options_write_metadata_keys() {
        let field = Field::property("posts")
            .authorize_strict("index")
            .record(json!({"id": 1}))
            .policy("post")
            .scope(Meta::infer_scope())
            .after_scope(true)
            .current_user("viewer");

        let keys: Vec<&str> = field.metadata().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            ["after_scope", "authorize!", "current_user", "policy", "record", "scope"]
        );
    }
}
