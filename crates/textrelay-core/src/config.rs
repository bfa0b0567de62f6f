//! Relay configuration
//!
//! Loaded once at construction; there is no hot reload. Credentials support
//! `${ENV_VAR}` / `$ENV_VAR` syntax so config files never carry secrets. A
//! credential that resolves to the empty string does not fail startup: the
//! registry skips that adapter with a warning.
//!
//! Example (relay.yml):
//!
//! ```yaml
//! family_order: [groq, openai, anthropic]
//!
//! adapters:
//!   - family: groq
//!     ordinal: 0
//!     kind: openai-compat
//!     credential: ${GROQ_API_KEY}
//!     base_url: https://api.groq.com/openai/v1
//!     model: llama-3.3-70b-versatile
//!     priority: 0
//!   - family: groq
//!     ordinal: 1
//!     kind: openai-compat
//!     credential: ${GROQ_API_KEY_2}
//!     base_url: https://api.groq.com/openai/v1
//!     model: llama-3.3-70b-versatile
//!     priority: 1
//!   - family: anthropic
//!     ordinal: 0
//!     kind: anthropic
//!     credential: ${ANTHROPIC_API_KEY}
//!     model: claude-3-5-haiku-latest
//!
//! cache:
//!   ttl_secs: 1800
//!   capacity: 2048
//!
//! invoke_timeout_secs: 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::types::{RelayError, RelayResult};

/// Which wire protocol an adapter speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions (OpenAI, Groq, Together, vLLM...).
    OpenaiCompat,
    /// Anthropic Messages API.
    Anthropic,
}

fn default_adapter_max_tokens() -> u32 {
    4096
}

/// One credentialed adapter against one upstream family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Family name, e.g. `groq`. Adapters sharing a family share an upstream
    /// API surface but hold distinct credentials.
    pub family: String,
    /// Instance number within the family; `(family, ordinal)` is unique.
    #[serde(default)]
    pub ordinal: u32,
    /// Wire protocol.
    pub kind: ProviderKind,
    /// API key; supports `${ENV_VAR}` expansion.
    #[serde(default)]
    pub credential: String,
    /// Endpoint override; each kind has a sensible default.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Order within the family, lower tried first.
    #[serde(default)]
    pub priority: u32,
    /// Capability limit; requests asking for more output tokens are clamped
    /// for this adapter only.
    #[serde(default = "default_adapter_max_tokens")]
    pub max_tokens: u32,
}

impl AdapterConfig {
    /// Stable identity used in logs, results, and the health surface.
    pub fn id(&self) -> String {
        format!("{}#{}", self.family, self.ordinal)
    }
}

fn default_invoke_timeout_secs() -> u64 {
    30
}

fn default_probe_timeout_secs() -> u64 {
    5
}

/// Root configuration for a relay instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub adapters: Vec<AdapterConfig>,
    /// Families are tried whole, in this order, before moving on; families
    /// not listed follow in first-appearance order. Never interleaved.
    #[serde(default)]
    pub family_order: Vec<String>,
    #[serde(default)]
    pub breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Per-adapter invoke timeout.
    #[serde(default = "default_invoke_timeout_secs")]
    pub invoke_timeout_secs: u64,
    /// Per-adapter probe timeout.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            adapters: Vec::new(),
            family_order: Vec::new(),
            breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            invoke_timeout_secs: default_invoke_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl RelayConfig {
    pub fn from_file(path: impl AsRef<Path>) -> RelayResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RelayError::Config(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> RelayResult<Self> {
        let mut config: Self = serde_yaml::from_str(content)
            .map_err(|e| RelayError::Config(format!("invalid config: {e}")))?;
        config.resolve_env_vars();
        Ok(config)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    fn resolve_env_vars(&mut self) {
        for adapter in &mut self.adapters {
            adapter.credential = resolve_env_var(&adapter.credential);
            if let Some(ref mut base_url) = adapter.base_url {
                *base_url = resolve_env_var(base_url);
            }
        }
    }
}

/// Expand `${VAR_NAME}` or `$VAR_NAME` from the environment. An unset
/// variable yields the empty string, which downstream registration treats as
/// a missing credential.
fn resolve_env_var(value: &str) -> String {
    let value = value.trim();

    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        return std::env::var(var_name).unwrap_or_default();
    }

    if value.starts_with('$') && !value.contains('{') {
        let var_name = &value[1..];
        return std::env::var(var_name).unwrap_or_default();
    }

    value.to_string()
}
