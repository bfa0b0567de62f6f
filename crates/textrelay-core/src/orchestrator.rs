//! Relay orchestrator
//!
//! Owns the registry and the response cache, and runs the dispatch
//! algorithm: cache lookup, then ordered fallback over breaker-gated
//! adapters, then cache write. Adapters are tried strictly sequentially
//! within one call; the relay itself is safe for concurrent invocation.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::cache::{CacheConfig, CacheStats, CacheStore, ResponseCache};
use crate::circuit_breaker::{BreakerSnapshot, CircuitBreakerConfig};
use crate::config::{AdapterConfig, RelayConfig};
use crate::provider::TextProvider;
use crate::registry::{Adapter, ProviderRegistry, SkippedAdapter};
use crate::types::{
    GenerationRequest, GenerationResult, ProviderError, RelayError, RelayResult,
};

/// Per-adapter health view for operational tooling.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterHealth {
    pub adapter: String,
    pub family: String,
    #[serde(flatten)]
    pub breaker: BreakerSnapshot,
}

/// Outcome of one probe sweep entry.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub adapter: String,
    pub healthy: bool,
}

#[derive(Debug, Default)]
struct RelayMetrics {
    requests: AtomicU64,
    served: AtomicU64,
    exhausted: AtomicU64,
}

/// Aggregate dispatch counters.
#[derive(Debug, Clone, Serialize)]
pub struct RelayStats {
    pub requests: u64,
    pub served: u64,
    pub exhausted: u64,
}

/// Request-routing layer over a pool of interchangeable providers.
///
/// Explicitly constructed and dependency-injected; owns its adapter list and
/// breaker map, no process-wide state. Construct via [`Relay::new`] for
/// config-driven HTTP providers or [`Relay::builder`] to inject providers.
pub struct Relay {
    registry: ProviderRegistry,
    cache: Arc<ResponseCache>,
    invoke_timeout: Duration,
    probe_timeout: Duration,
    metrics: RelayMetrics,
}

impl Relay {
    pub fn new(config: RelayConfig) -> RelayResult<Self> {
        let registry = ProviderRegistry::from_config(&config)?;
        Ok(Self {
            registry,
            cache: Arc::new(ResponseCache::in_memory(&config.cache)),
            invoke_timeout: config.invoke_timeout(),
            probe_timeout: config.probe_timeout(),
            metrics: RelayMetrics::default(),
        })
    }

    pub fn builder() -> RelayBuilder {
        RelayBuilder::default()
    }

    /// Dispatch one request.
    ///
    /// Families are tried whole, in configured order; adapters within a
    /// family in priority order. The first success is cached (unless the
    /// caller opted out) and returned with provenance. When every adapter is
    /// skipped or fails, the call fails with [`RelayError::Exhausted`].
    pub async fn generate(&self, request: GenerationRequest) -> RelayResult<GenerationResult> {
        self.metrics.requests.fetch_add(1, Ordering::Relaxed);
        let fingerprint = request.fingerprint();

        if !request.no_cache
            && let Some(hit) = self.cache.lookup(&fingerprint).await
        {
            self.metrics.served.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }

        let mut attempted = 0usize;
        let mut skipped = 0usize;

        for (family, adapters) in self.registry.iter_families() {
            for adapter in adapters {
                if !adapter.breaker().try_acquire() {
                    debug!(request = %request.id, adapter = %adapter.id(), "breaker open, adapter skipped");
                    skipped += 1;
                    continue;
                }
                attempted += 1;

                match self.attempt(adapter, &request).await {
                    Ok(result) => {
                        adapter.breaker().record_success();
                        debug!(
                            request = %request.id,
                            adapter = %adapter.id(),
                            family,
                            latency_ms = result.latency_ms,
                            "request served"
                        );
                        if !request.no_cache {
                            // Fire and forget; a failed write never fails
                            // the request.
                            let cache = Arc::clone(&self.cache);
                            let value = result.clone();
                            let key = fingerprint.clone();
                            tokio::spawn(async move {
                                cache.store(&key, value).await;
                            });
                        }
                        self.metrics.served.fetch_add(1, Ordering::Relaxed);
                        return Ok(result);
                    }
                    Err(err) => {
                        adapter.breaker().record_failure();
                        match &err {
                            ProviderError::Unauthorized(_) => warn!(
                                request = %request.id,
                                adapter = %adapter.id(),
                                error = %err,
                                "credential rejected by upstream, check configuration"
                            ),
                            _ => warn!(
                                request = %request.id,
                                adapter = %adapter.id(),
                                error = %err,
                                "provider call failed, trying next adapter"
                            ),
                        }
                    }
                }
            }
        }

        self.metrics.exhausted.fetch_add(1, Ordering::Relaxed);
        warn!(request = %request.id, attempted, skipped, "every provider exhausted");
        Err(RelayError::Exhausted { attempted, skipped })
    }

    /// [`Relay::generate`] bounded by a caller-level deadline covering cache
    /// operations and all fallback attempts. On expiry the remaining
    /// attempts are abandoned.
    pub async fn generate_with_deadline(
        &self,
        request: GenerationRequest,
        deadline: Duration,
    ) -> RelayResult<GenerationResult> {
        match tokio::time::timeout(deadline, self.generate(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RelayError::DeadlineExceeded),
        }
    }

    async fn attempt(
        &self,
        adapter: &Adapter,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, ProviderError> {
        let effective = request.clamped(adapter.max_tokens());
        let started = Instant::now();

        let reply = match tokio::time::timeout(
            self.invoke_timeout,
            adapter.provider().invoke(&effective),
        )
        .await
        {
            Ok(outcome) => outcome?,
            Err(_) => {
                return Err(ProviderError::Timeout(format!(
                    "no reply within {:?}",
                    self.invoke_timeout
                )));
            }
        };

        Ok(GenerationResult {
            adapter: adapter.id().to_string(),
            text: reply.text,
            model: reply.model,
            usage: reply.usage,
            latency_ms: started.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
            metadata: HashMap::new(),
        })
    }

    /// Probe every registered adapter, feeding outcomes through the same
    /// breaker path as invokes. Intended for operational sweeps, not the
    /// request path.
    pub async fn probe_all(&self) -> Vec<ProbeReport> {
        let mut reports = Vec::with_capacity(self.registry.len());
        for adapter in self.registry.iter() {
            let outcome =
                tokio::time::timeout(self.probe_timeout, adapter.provider().probe()).await;
            let healthy = matches!(outcome, Ok(Ok(())));
            if healthy {
                adapter.breaker().record_success();
            } else {
                adapter.breaker().record_failure();
            }
            debug!(adapter = %adapter.id(), healthy, "probe completed");
            reports.push(ProbeReport {
                adapter: adapter.id().to_string(),
                healthy,
            });
        }
        reports
    }

    /// Current breaker state of every adapter.
    pub fn health(&self) -> Vec<AdapterHealth> {
        self.registry
            .iter()
            .map(|adapter| AdapterHealth {
                adapter: adapter.id().to_string(),
                family: adapter.family().to_string(),
                breaker: adapter.breaker().snapshot(),
            })
            .collect()
    }

    /// Adapters refused at registration.
    pub fn skipped_adapters(&self) -> &[SkippedAdapter] {
        self.registry.skipped()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            requests: self.metrics.requests.load(Ordering::Relaxed),
            served: self.metrics.served.load(Ordering::Relaxed),
            exhausted: self.metrics.exhausted.load(Ordering::Relaxed),
        }
    }

    pub fn adapter_count(&self) -> usize {
        self.registry.len()
    }
}

/// Builder for a relay with injected providers or a custom cache store.
#[derive(Default)]
pub struct RelayBuilder {
    entries: Vec<(AdapterConfig, Arc<dyn TextProvider>)>,
    family_order: Vec<String>,
    breaker: CircuitBreakerConfig,
    cache: CacheConfig,
    store: Option<Arc<dyn CacheStore>>,
    invoke_timeout: Option<Duration>,
    probe_timeout: Option<Duration>,
}

impl RelayBuilder {
    pub fn adapter(mut self, config: AdapterConfig, provider: Arc<dyn TextProvider>) -> Self {
        self.entries.push((config, provider));
        self
    }

    pub fn family_order(mut self, order: Vec<String>) -> Self {
        self.family_order = order;
        self
    }

    pub fn breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = config;
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = Some(timeout);
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> RelayResult<Relay> {
        let registry =
            ProviderRegistry::with_providers(self.entries, &self.breaker, &self.family_order)?;
        let cache = match self.store {
            Some(store) => ResponseCache::new(store, &self.cache),
            None => ResponseCache::in_memory(&self.cache),
        };
        let defaults = RelayConfig::default();
        Ok(Relay {
            registry,
            cache: Arc::new(cache),
            invoke_timeout: self.invoke_timeout.unwrap_or(defaults.invoke_timeout()),
            probe_timeout: self.probe_timeout.unwrap_or(defaults.probe_timeout()),
            metrics: RelayMetrics::default(),
        })
    }
}
