//! Core value types
//!
//! Defines the request/result pair exchanged with the relay, the request
//! fingerprint used as a cache key, and the two error taxonomies: per-provider
//! failures (swallowed by the dispatch loop) and terminal relay failures
//! (surfaced to the caller).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// A single text-generation request.
///
/// Immutable value, created per call and discarded after the call completes.
/// The `id` only exists for log correlation and never reaches an upstream.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Correlation id for logs.
    pub id: Uuid,
    /// Prompt text sent to the provider.
    pub prompt: String,
    /// Maximum output tokens requested by the caller.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Caller-supplied cache key. When set it replaces the computed
    /// fingerprint entirely.
    pub cache_key: Option<String>,
    /// Opt out of both cache lookup and cache write for this call.
    pub no_cache: bool,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            max_tokens: 1024,
            temperature: 0.7,
            cache_key: None,
            no_cache: false,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    /// Stable cache key for this request.
    ///
    /// A caller-supplied key wins. Otherwise the key is a SHA-256 over the
    /// trimmed prompt and the generation parameters, so semantically identical
    /// requests from different call sites converge on one cache slot.
    /// Temperature is rendered at fixed precision to keep the hash stable
    /// across float formatting differences.
    pub fn fingerprint(&self) -> String {
        if let Some(key) = &self.cache_key {
            return key.clone();
        }
        let mut hasher = Sha256::new();
        hasher.update(self.prompt.trim().as_bytes());
        hasher.update([0u8]);
        hasher.update(format!("{:.4}", self.temperature).as_bytes());
        hasher.update([0u8]);
        hasher.update(self.max_tokens.to_le_bytes());
        hex::encode(hasher.finalize())
    }

    /// Copy of this request with `max_tokens` clamped to an adapter's
    /// capability limit. Returns `self` unchanged when within the limit.
    pub(crate) fn clamped(&self, cap: u32) -> Self {
        let mut clamped = self.clone();
        if clamped.max_tokens > cap {
            clamped.max_tokens = cap;
        }
        clamped
    }
}

/// Token accounting reported by a provider for one call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A successful generation, with provenance.
///
/// Failures never take this shape; they are `RelayError` values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Adapter that served the call, as `family#ordinal`.
    pub adapter: String,
    /// Generated text.
    pub text: String,
    /// Model identifier reported by the upstream.
    pub model: String,
    /// Token accounting.
    #[serde(default)]
    pub usage: TokenUsage,
    /// Wall-clock latency of the serving call.
    pub latency_ms: u64,
    /// Completion timestamp.
    pub completed_at: DateTime<Utc>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Failure of a single provider call.
///
/// Recorded against the adapter's circuit breaker and swallowed by the
/// dispatch loop in favor of the next adapter; never surfaced to callers.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("upstream error (status {status:?}): {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Terminal outcome of a relay call, crossing the component boundary.
///
/// Callers see exactly one of: a successful `GenerationResult`, `Exhausted`,
/// or `DeadlineExceeded`. Individual provider failures only show up in logs.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// No adapter across all families could serve the request. Indicates
    /// total capacity exhaustion rather than a transient blip.
    #[error("no healthy provider available ({attempted} attempted, {skipped} skipped)")]
    Exhausted { attempted: usize, skipped: usize },
    /// Caller-level deadline elapsed mid-dispatch; remaining attempts were
    /// abandoned.
    #[error("deadline exceeded before any provider could answer")]
    DeadlineExceeded,
    /// Construction-time configuration problem.
    #[error("configuration error: {0}")]
    Config(String),
    /// The dispatch task died without producing a result.
    #[error("internal dispatch failure: {0}")]
    Internal(String),
}

pub type RelayResult<T> = Result<T, RelayError>;
