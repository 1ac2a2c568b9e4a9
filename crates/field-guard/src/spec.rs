//! Typed authorization and scope specs, parsed from field metadata when the
//! field is wrapped.

use std::fmt;

use policy_finder::{PolicyRef, PolicyType};
use serde_json::Value;
use tracing::warn;

use crate::error::InstrumentError;
use crate::meta::{keys, Meta, Metadata, PolicyFn, PredicateFn, RecordFn, ScopeFn, INFER_SCOPE};

/// What the gate checks.
#[derive(Clone)]
pub enum Authorize {
    /// Query named after the field (`displayName` checks `display_name?`).
    Inferred,
    /// Explicit query name.
    Query(String),
    /// A predicate that decides on its own; no policy is consulted.
    Predicate(PredicateFn),
}

/// The record handed to the policy.
#[derive(Clone)]
pub enum RecordSpec {
    /// The field's parent.
    Inferred,
    Literal(Value),
    Computed(RecordFn),
}

/// The policy type used for the check.
#[derive(Clone)]
pub enum PolicySpec {
    /// Looked up from the record.
    Inferred,
    Literal(PolicyRef),
    /// Looked up from a model name, so `"post"` finds `PostPolicy`.
    Named(String),
    Computed(PolicyFn),
}

/// Everything the authorization gate of one field needs.
#[derive(Debug, Clone)]
pub struct FieldAuthSpec {
    pub authorize: Authorize,
    pub raise_on_deny: bool,
    pub record: RecordSpec,
    pub policy: PolicySpec,
}

impl FieldAuthSpec {
    /// Soft gate with inferred query, record and policy.
    pub fn inferred() -> Self {
        Self {
            authorize: Authorize::Inferred,
            raise_on_deny: false,
            record: RecordSpec::Inferred,
            policy: PolicySpec::Inferred,
        }
    }
}

/// How a scope filter narrows its subject.
#[derive(Clone)]
pub enum ScopeSpec {
    /// Use the nested scope of the subject's policy.
    Inferred,
    Computed(ScopeFn),
    /// Use the nested scope of this policy.
    Policy(PolicyRef),
}

/// Which side of the resolver a scope filter sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeSlot {
    /// Narrows the parent before resolution.
    Before,
    /// Narrows the resolver's result.
    After,
}

impl fmt::Display for ScopeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before => f.write_str(keys::BEFORE_SCOPE),
            Self::After => f.write_str(keys::AFTER_SCOPE),
        }
    }
}

/// Before-scope plus whether it was declared through the deprecated alias.
#[derive(Debug, Clone)]
pub struct BeforeScope {
    pub spec: ScopeSpec,
    pub deprecated: bool,
}

/// All specs declared on one field.
#[derive(Debug, Clone, Default)]
pub struct FieldSpecs {
    pub auth: Option<FieldAuthSpec>,
    pub before_scope: Option<BeforeScope>,
    pub after_scope: Option<ScopeSpec>,
    pub current_user_key: Option<String>,
}

impl FieldSpecs {
    /// Parse and validate the options in `metadata`.
    pub fn from_metadata(field: &str, metadata: &Metadata) -> Result<Self, InstrumentError> {
        let auth = parse_auth(field, metadata)?;
        let before_scope = parse_before_scope(field, metadata)?;
        let after_scope = metadata
            .get(keys::AFTER_SCOPE)
            .map(|meta| parse_scope(field, keys::AFTER_SCOPE, meta))
            .transpose()?
            .flatten();
        let current_user_key = metadata
            .get(keys::CURRENT_USER)
            .map(|meta| match meta {
                Meta::Symbol(key) | Meta::Text(key) if !key.is_empty() => Ok(key.clone()),
                other => Err(invalid_option(field, keys::CURRENT_USER, "a context key", other)),
            })
            .transpose()?;

        Ok(Self {
            auth,
            before_scope,
            after_scope,
            current_user_key,
        })
    }

    /// Whether the field declares neither a gate nor a scope.
    pub fn is_empty(&self) -> bool {
        self.auth.is_none() && self.before_scope.is_none() && self.after_scope.is_none()
    }
}

fn parse_auth(field: &str, metadata: &Metadata) -> Result<Option<FieldAuthSpec>, InstrumentError> {
    let soft = metadata
        .get(keys::AUTHORIZE)
        .map(|meta| parse_authorize(field, keys::AUTHORIZE, meta))
        .transpose()?
        .flatten();
    let strict = metadata
        .get(keys::AUTHORIZE_STRICT)
        .map(|meta| parse_authorize(field, keys::AUTHORIZE_STRICT, meta))
        .transpose()?
        .flatten();

    let (authorize, raise_on_deny) = match (soft, strict) {
        (Some(_), Some(_)) => {
            return Err(conflict(field, keys::AUTHORIZE, keys::AUTHORIZE_STRICT));
        }
        (Some(authorize), None) => (authorize, false),
        (None, Some(authorize)) => (authorize, true),
        (None, None) => {
            for key in [keys::RECORD, keys::POLICY] {
                if metadata.contains_key(key) {
                    warn!(field, option = key, "option has no effect without `authorize`");
                }
            }
            return Ok(None);
        }
    };

    let record = match metadata.get(keys::RECORD) {
        None => RecordSpec::Inferred,
        Some(meta) => parse_record(field, meta)?,
    };
    let policy = match metadata.get(keys::POLICY) {
        None => PolicySpec::Inferred,
        Some(meta) => parse_policy(field, meta)?,
    };

    Ok(Some(FieldAuthSpec {
        authorize,
        raise_on_deny,
        record,
        policy,
    }))
}

/// `false` disables the gate; `true` infers the query.
fn parse_authorize(
    field: &str,
    option: &str,
    meta: &Meta,
) -> Result<Option<Authorize>, InstrumentError> {
    match meta {
        Meta::Flag(false) => Ok(None),
        Meta::Flag(true) => Ok(Some(Authorize::Inferred)),
        Meta::Symbol(query) | Meta::Text(query) if !query.trim().is_empty() => {
            Ok(Some(Authorize::Query(query.clone())))
        }
        Meta::Predicate(predicate) => Ok(Some(Authorize::Predicate(predicate.clone()))),
        other => Err(InstrumentError::InvalidAuthorizeSpec {
            field: field.to_string(),
            option: option.to_string(),
            found: other.describe(),
        }),
    }
}

fn parse_record(field: &str, meta: &Meta) -> Result<RecordSpec, InstrumentError> {
    match meta {
        Meta::Record(f) => Ok(RecordSpec::Computed(f.clone())),
        Meta::Json(value) => Ok(RecordSpec::Literal(value.clone())),
        Meta::Symbol(text) | Meta::Text(text) => Ok(RecordSpec::Literal(Value::String(text.clone()))),
        Meta::Flag(flag) => Ok(RecordSpec::Literal(Value::Bool(*flag))),
        other => Err(invalid_option(field, keys::RECORD, "a record or a record function", other)),
    }
}

fn parse_policy(field: &str, meta: &Meta) -> Result<PolicySpec, InstrumentError> {
    match meta {
        Meta::Policy(policy) => Ok(PolicySpec::Literal(policy.clone())),
        Meta::PolicyFn(f) => Ok(PolicySpec::Computed(f.clone())),
        Meta::Symbol(name) | Meta::Text(name) if !name.trim().is_empty() => {
            Ok(PolicySpec::Named(name.clone()))
        }
        other => Err(invalid_option(
            field,
            keys::POLICY,
            "a policy type, a model name or a policy function",
            other,
        )),
    }
}

fn parse_before_scope(
    field: &str,
    metadata: &Metadata,
) -> Result<Option<BeforeScope>, InstrumentError> {
    match (metadata.get(keys::BEFORE_SCOPE), metadata.get(keys::SCOPE)) {
        (Some(_), Some(_)) => Err(conflict(field, keys::BEFORE_SCOPE, keys::SCOPE)),
        (Some(meta), None) => Ok(parse_scope(field, keys::BEFORE_SCOPE, meta)?
            .map(|spec| BeforeScope { spec, deprecated: false })),
        (None, Some(meta)) => Ok(parse_scope(field, keys::SCOPE, meta)?
            .map(|spec| BeforeScope { spec, deprecated: true })),
        (None, None) => Ok(None),
    }
}

/// Only `infer_scope` (or `true`), a scope function or a policy type are
/// accepted; `false` disables the filter.
fn parse_scope(field: &str, option: &str, meta: &Meta) -> Result<Option<ScopeSpec>, InstrumentError> {
    match meta {
        Meta::Flag(false) => Ok(None),
        Meta::Flag(true) => Ok(Some(ScopeSpec::Inferred)),
        Meta::Symbol(symbol) if symbol == INFER_SCOPE => Ok(Some(ScopeSpec::Inferred)),
        Meta::Scope(f) => Ok(Some(ScopeSpec::Computed(f.clone()))),
        Meta::Policy(policy) => Ok(Some(ScopeSpec::Policy(policy.clone()))),
        other => Err(InstrumentError::InvalidScopeSpec {
            field: field.to_string(),
            option: option.to_string(),
            found: other.describe(),
        }),
    }
}

fn invalid_option(field: &str, option: &str, expected: &str, found: &Meta) -> InstrumentError {
    InstrumentError::InvalidOption {
        field: field.to_string(),
        option: option.to_string(),
        expected: expected.to_string(),
        found: found.describe(),
    }
}

fn conflict(field: &str, first: &str, second: &str) -> InstrumentError {
    InstrumentError::ConflictingOptions {
        field: field.to_string(),
        first: first.to_string(),
        second: second.to_string(),
    }
}

impl fmt::Debug for Authorize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inferred => f.write_str("Inferred"),
            Self::Query(q) => f.debug_tuple("Query").field(q).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl fmt::Debug for RecordSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inferred => f.write_str("Inferred"),
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl fmt::Debug for PolicySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inferred => f.write_str("Inferred"),
            Self::Literal(p) => f.debug_tuple("Literal").field(&p.name()).finish(),
            Self::Named(n) => f.debug_tuple("Named").field(n).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl fmt::Debug for ScopeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inferred => f.write_str("Inferred"),
            Self::Computed(_) => f.write_str("Computed(..)"),
            Self::Policy(p) => f.debug_tuple("Policy").field(&p.name()).finish(),
        }
    }
}
