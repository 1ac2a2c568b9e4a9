//! # field-guard
//!
//! Policy-based authorization for resolver pipelines. Fields declare, in
//! their metadata, whether resolution must be authorized by a policy query
//! and whether the parent (before) or the result (after) must be narrowed by
//! a policy scope. The [`Instrumenter`] reads that metadata once, when the
//! schema is built, and wraps each field's resolver accordingly.
//!
//! Policies themselves come from the `policy-finder` crate.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use field_guard::{Arguments, Context, Field, Instrumenter};
//! use policy_finder::{PolicyDef, PolicyRegistry};
//! use serde_json::{json, Value};
//!
//! let registry = PolicyRegistry::new().register(
//!     PolicyDef::new("PostPolicy")
//!         .query("title", |user, _post| user.is_some())
//!         .into_ref(),
//! );
//! let instrumenter = Instrumenter::new(Arc::new(registry));
//!
//! let title = instrumenter
//!     .instrument(&Field::property("title").authorize(true))
//!     .unwrap();
//!
//! let post = json!({"__typename": "Post", "title": "Hello"});
//! let args = Arguments::new();
//! assert_eq!(title.resolve(&post, &args, &Context::new()).unwrap(), Value::Null);
//!
//! let ctx = Context::new().with("current_user", json!({"name": "ada"}));
//! assert_eq!(title.resolve(&post, &args, &ctx).unwrap(), json!("Hello"));
//! ```

pub mod config;
mod error;
mod field;
mod gate;
mod instrumenter;
mod meta;
mod policy;
mod scope;
mod spec;

// Re-export primary public API at crate root.
pub use config::GuardConfig;
pub use error::{ExecutionError, FieldError, InstrumentError, Result, NOT_AUTHORIZED_MESSAGE};
pub use field::{resolver, resolvers, Arguments, Context, Field, Resolver};
pub use gate::{AuthorizationGate, Decision};
pub use instrumenter::Instrumenter;
pub use meta::{keys, Meta, Metadata, PolicyFn, PredicateFn, RecordFn, ScopeFn, INFER_SCOPE};
pub use policy::PolicyResolver;
pub use scope::{
    log_deprecation, Deprecation, DeprecationHook, ScopeFilter, SCOPE_DEPRECATION_MESSAGE,
};
pub use spec::{
    Authorize, BeforeScope, FieldAuthSpec, FieldSpecs, PolicySpec, RecordSpec, ScopeSlot,
    ScopeSpec,
};
