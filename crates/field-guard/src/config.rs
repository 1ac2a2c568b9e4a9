use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Pipeline-wide settings, fixed when the [`Instrumenter`](crate::Instrumenter)
/// is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Request-context key holding the current user. Fields can override it
    /// with the `current_user` option.
    #[serde(default = "default_current_user_key")]
    pub current_user_key: String,
    /// Object key of the "model" accessor on dataset-like wrappers. When a
    /// record carries it, policies are looked up from the model instead.
    ///
    /// Any record with a property of this name is treated as a wrapper, so a
    /// `Car` with `"model": "Model S"` would be looked up as `Model SPolicy`.
    /// Pick a key that plain records never use when that can happen.
    #[serde(default = "default_model_key")]
    pub model_key: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            current_user_key: default_current_user_key(),
            model_key: default_model_key(),
        }
    }
}

impl GuardConfig {
    pub fn with_current_user_key(mut self, key: impl Into<String>) -> Self {
        self.current_user_key = key.into();
        self
    }

    pub fn with_model_key(mut self, key: impl Into<String>) -> Self {
        self.model_key = key.into();
        self
    }
}

fn default_current_user_key() -> String {
    "current_user".to_string()
}

fn default_model_key() -> String {
    "model".to_string()
}

/// Load a [`GuardConfig`] from a YAML file.
///
/// A missing file yields the defaults and a warning.
pub fn load(path: impl AsRef<Path>) -> Result<GuardConfig> {
    let path = path.as_ref();
    if !path.exists() {
        warn!(
            path = %path.display(),
            "guard configuration file not found; using defaults"
        );
        return Ok(GuardConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read guard config: {}", path.display()))?;
    load_from_str(&contents)
        .with_context(|| format!("failed to parse guard config: {}", path.display()))
}

/// Parse and validate a [`GuardConfig`] from a YAML string.
pub fn load_from_str(yaml: &str) -> Result<GuardConfig> {
    let config: GuardConfig =
        serde_yml::from_str(yaml).context("YAML deserialization failed")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &GuardConfig) -> Result<()> {
    if config.current_user_key.trim().is_empty() {
        bail!("current_user_key must not be empty");
    }
    if config.model_key.trim().is_empty() {
        bail!("model_key must not be empty");
    }
    Ok(())
}
