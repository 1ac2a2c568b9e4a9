use std::fmt;
use std::sync::Arc;

use policy_finder::PolicyLookup;
use tracing::{debug, trace};

use crate::config::GuardConfig;
use crate::error::InstrumentError;
use crate::field::{Field, Resolver};
use crate::gate::AuthorizationGate;
use crate::meta::Metadata;
use crate::policy::PolicyResolver;
use crate::scope::{log_deprecation, Deprecation, DeprecationHook, ScopeFilter};
use crate::spec::{FieldSpecs, ScopeSlot};

// ---------------------------------------------------------------------------
// Instrumenter
// ---------------------------------------------------------------------------

/// Wraps field resolvers according to their authorization and scope
/// metadata.
///
/// Metadata is parsed and validated once per field, when the field is
/// wrapped, so configuration mistakes surface at schema build time rather
/// than on the first request. The layers always nest the same way:
///
/// ```text
/// after_scope( authorize( before_scope( resolver ) ) )
/// ```
///
/// so per request the gate runs first, then the before-scope, then the
/// original resolver, then the after-scope.
pub struct Instrumenter {
    lookup: Arc<dyn PolicyLookup>,
    policies: PolicyResolver,
    config: GuardConfig,
    on_deprecation: DeprecationHook,
}

impl fmt::Debug for Instrumenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumenter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Instrumenter {
    /// Create an instrumenter finding policies through `lookup`, with the
    /// default [`GuardConfig`].
    pub fn new(lookup: Arc<dyn PolicyLookup>) -> Self {
        let config = GuardConfig::default();
        Self {
            policies: PolicyResolver::new(Arc::clone(&lookup), config.model_key.clone()),
            lookup,
            config,
            on_deprecation: log_deprecation(),
        }
    }

    /// Replace the configuration. Affects fields wrapped afterwards.
    pub fn with_config(mut self, config: GuardConfig) -> Self {
        self.policies = PolicyResolver::new(Arc::clone(&self.lookup), config.model_key.clone());
        self.config = config;
        self
    }

    /// Route deprecation notices to `hook` instead of the log.
    pub fn on_deprecation<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Deprecation) + Send + Sync + 'static,
    {
        self.on_deprecation = Arc::new(hook);
        self
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Return `field` with its resolver wrapped per its metadata.
    pub fn instrument(&self, field: &Field) -> Result<Field, InstrumentError> {
        let resolve = self.wrap(field.name(), field.metadata(), Arc::clone(field.resolver()))?;
        Ok(field.with_resolver(resolve))
    }

    /// Instrument every field, stopping at the first configuration error.
    pub fn instrument_all<'a, I>(&self, fields: I) -> Result<Vec<Field>, InstrumentError>
    where
        I: IntoIterator<Item = &'a Field>,
    {
        fields.into_iter().map(|field| self.instrument(field)).collect()
    }

    /// Wrap `base` according to `metadata`.
    ///
    /// A field declaring no gate and no scope gets `base` back unchanged.
    pub fn wrap(
        &self,
        field: &str,
        metadata: &Metadata,
        base: Resolver,
    ) -> Result<Resolver, InstrumentError> {
        let specs = FieldSpecs::from_metadata(field, metadata)?;
        if specs.is_empty() {
            trace!(field, "no authorization metadata, resolver left as is");
            return Ok(base);
        }

        let user_key = specs
            .current_user_key
            .unwrap_or_else(|| self.config.current_user_key.clone());
        let has_before = specs.before_scope.is_some();
        let has_gate = specs.auth.is_some();
        let has_after = specs.after_scope.is_some();

        let mut resolve = base;

        if let Some(before) = specs.before_scope {
            let mut filter = ScopeFilter::new(
                field,
                ScopeSlot::Before,
                before.spec,
                self.policies.clone(),
                &user_key,
            );
            if before.deprecated {
                filter = filter.with_deprecation(Arc::clone(&self.on_deprecation));
            }
            resolve = filter.wrap(resolve);
        }

        if let Some(auth) = specs.auth {
            let mut gate = AuthorizationGate::new(field, auth, self.policies.clone(), &user_key);
            if has_after {
                gate = gate.deferring_denial();
            }
            resolve = gate.wrap(resolve);
        }

        if let Some(after) = specs.after_scope {
            resolve = ScopeFilter::new(
                field,
                ScopeSlot::After,
                after,
                self.policies.clone(),
                &user_key,
            )
            .wrap(resolve);
        }

        debug!(
            field,
            before_scope = has_before,
            authorize = has_gate,
            after_scope = has_after,
            current_user = %user_key,
            "field instrumented"
        );
        Ok(resolve)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
