//! Provider registry
//!
//! Built once at startup and read-only afterwards. Families keep their
//! configured order; adapters within a family are sorted by declared priority
//! (ordinal breaks ties). An adapter whose credential resolves empty is
//! skipped with a warning rather than registered in a state where every call
//! would fail.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::{AdapterConfig, ProviderKind, RelayConfig};
use crate::provider::{
    AnthropicConfig, AnthropicProvider, OpenAiCompatConfig, OpenAiCompatProvider, TextProvider,
};
use crate::types::{RelayError, RelayResult};

/// A registered adapter: config, provider, and its breaker.
pub struct Adapter {
    config: AdapterConfig,
    id: String,
    provider: Arc<dyn TextProvider>,
    breaker: CircuitBreaker,
}

impl Adapter {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn family(&self) -> &str {
        &self.config.family
    }

    pub fn max_tokens(&self) -> u32 {
        self.config.max_tokens
    }

    pub fn provider(&self) -> &Arc<dyn TextProvider> {
        &self.provider
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

/// Adapter refused at registration, with the reason. Part of the startup
/// report so a misconfigured credential is visible instead of silently
/// propagating into runtime failures.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedAdapter {
    pub adapter: String,
    pub reason: String,
}

/// Registry of adapters grouped by family.
pub struct ProviderRegistry {
    families: Vec<(String, Vec<Arc<Adapter>>)>,
    skipped: Vec<SkippedAdapter>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field(
                "families",
                &self
                    .families
                    .iter()
                    .map(|(name, adapters)| (name.as_str(), adapters.len()))
                    .collect::<Vec<_>>(),
            )
            .field("skipped", &self.skipped)
            .finish()
    }
}

impl ProviderRegistry {
    /// Build from configuration, constructing HTTP providers per kind.
    pub fn from_config(config: &RelayConfig) -> RelayResult<Self> {
        let timeout_secs = config.invoke_timeout_secs;
        let entries = config
            .adapters
            .iter()
            .map(|adapter| {
                let provider = build_provider(adapter, timeout_secs);
                (adapter.clone(), provider)
            })
            .collect();
        Self::with_providers(entries, &config.breaker, &config.family_order)
    }

    /// Build from pre-constructed providers. This is the injection seam the
    /// test crates use; registration rules are identical to `from_config`.
    pub fn with_providers(
        entries: Vec<(AdapterConfig, Arc<dyn TextProvider>)>,
        breaker_config: &CircuitBreakerConfig,
        family_order: &[String],
    ) -> RelayResult<Self> {
        let mut families: Vec<(String, Vec<Arc<Adapter>>)> = Vec::new();
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();

        for (config, provider) in entries {
            let id = config.id();
            if !seen.insert((config.family.clone(), config.ordinal)) {
                return Err(RelayError::Config(format!(
                    "duplicate adapter identity {id}"
                )));
            }
            if config.credential.trim().is_empty() {
                warn!(adapter = %id, "skipping adapter with empty credential");
                skipped.push(SkippedAdapter {
                    adapter: id,
                    reason: "empty credential".to_string(),
                });
                continue;
            }

            info!(adapter = %id, model = %config.model, priority = config.priority, "adapter registered");
            let family = config.family.clone();
            let adapter = Arc::new(Adapter {
                id: id.clone(),
                provider,
                breaker: CircuitBreaker::new(id, breaker_config.clone()),
                config,
            });

            match families.iter_mut().find(|(name, _)| *name == family) {
                Some((_, members)) => members.push(adapter),
                None => families.push((family, vec![adapter])),
            }
        }

        for (_, members) in &mut families {
            members.sort_by_key(|a| (a.config.priority, a.config.ordinal));
        }
        sort_families(&mut families, family_order);

        Ok(Self { families, skipped })
    }

    /// Families in dispatch order, adapters within each in priority order.
    pub fn iter_families(&self) -> impl Iterator<Item = (&str, &[Arc<Adapter>])> {
        self.families
            .iter()
            .map(|(name, members)| (name.as_str(), members.as_slice()))
    }

    /// All adapters in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Adapter>> {
        self.families.iter().flat_map(|(_, members)| members.iter())
    }

    pub fn len(&self) -> usize {
        self.families.iter().map(|(_, members)| members.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn skipped(&self) -> &[SkippedAdapter] {
        &self.skipped
    }
}

fn build_provider(config: &AdapterConfig, timeout_secs: u64) -> Arc<dyn TextProvider> {
    match config.kind {
        ProviderKind::OpenaiCompat => {
            let mut provider_config = OpenAiCompatConfig::new(config.credential.clone())
                .with_model(config.model.clone())
                .with_timeout(timeout_secs);
            if let Some(base_url) = &config.base_url {
                provider_config = provider_config.with_base_url(base_url.clone());
            }
            Arc::new(OpenAiCompatProvider::with_config(provider_config))
        }
        ProviderKind::Anthropic => {
            let mut provider_config = AnthropicConfig::new(config.credential.clone())
                .with_model(config.model.clone())
                .with_timeout(timeout_secs);
            if let Some(base_url) = &config.base_url {
                provider_config = provider_config.with_base_url(base_url.clone());
            }
            Arc::new(AnthropicProvider::with_config(provider_config))
        }
    }
}

/// Reorder families: those named in `family_order` first, in that order,
/// then the rest in first-appearance order.
fn sort_families(families: &mut Vec<(String, Vec<Arc<Adapter>>)>, family_order: &[String]) {
    if family_order.is_empty() {
        return;
    }
    let mut ordered = Vec::with_capacity(families.len());
    for name in family_order {
        if let Some(pos) = families.iter().position(|(n, _)| n == name) {
            ordered.push(families.remove(pos));
        }
    }
    ordered.append(families);
    *families = ordered;
}
