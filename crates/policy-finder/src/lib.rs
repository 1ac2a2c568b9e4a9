//! # policy-finder
//!
//! The policy side of field authorization. A *policy type* is constructed
//! per check with the current user and a record, and answers boolean
//! queries named `<name>?`. A policy may carry a nested *scope* type,
//! constructed with the current user and a subject, whose `resolve` narrows
//! that subject (typically a list of records).
//!
//! Callers never hardcode which policy governs which record; they go through
//! a [`PolicyLookup`]. [`PolicyRegistry`] is the stock implementation and
//! finds `PostPolicy` for `Post` records.
//!
//! ## Quick start
//!
//! ```rust
//! use policy_finder::{PolicyDef, PolicyLookup, PolicyRegistry, PolicyType};
//! use serde_json::json;
//!
//! let registry = PolicyRegistry::new().register(
//!     PolicyDef::new("PostPolicy")
//!         .query("show", |_user, post| post["published"] == json!(true))
//!         .into_ref(),
//! );
//!
//! let post = json!({"__typename": "Post", "published": true});
//! let policy = registry.policy_for(&post).unwrap();
//! assert!(policy.instantiate(None, &post).query("show?").unwrap());
//! ```

mod definition;
mod error;
mod policy;
mod registry;

pub use definition::PolicyDef;
pub use error::{PolicyError, Result};
pub use policy::{
    query_name, scope_of, Policy, PolicyLookup, PolicyRef, PolicyType, Scope, ScopeRef, ScopeType,
};
pub use registry::{PolicyRegistry, DEFAULT_SUFFIX, DEFAULT_TYPE_FIELD};
