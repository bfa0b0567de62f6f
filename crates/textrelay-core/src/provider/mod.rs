//! Provider adapters
//!
//! A provider is one credentialed connection to one upstream text-generation
//! capability. The relay treats every provider as an opaque
//! `invoke(request) -> text` plus a cheap liveness probe; everything
//! provider-specific (wire format, auth headers, error mapping) lives behind
//! the [`TextProvider`] trait.

use async_trait::async_trait;

use crate::types::{GenerationRequest, ProviderResult, TokenUsage};

pub mod anthropic;
pub mod mock;
pub mod openai_compat;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use mock::MockProvider;
pub use openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};

/// Raw reply from a provider, before the relay attaches provenance.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    /// Generated text.
    pub text: String,
    /// Model identifier reported by the upstream.
    pub model: String,
    /// Token accounting, zeroed when the upstream does not report usage.
    pub usage: TokenUsage,
}

/// One upstream text-generation capability.
///
/// Implementations must be cheap to share (`Arc<dyn TextProvider>`) and must
/// map upstream failures into the [`crate::types::ProviderError`] taxonomy so
/// the dispatch loop can feed the circuit breaker uniformly.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Model this provider targets.
    fn model(&self) -> &str;

    /// Perform one generation call.
    async fn invoke(&self, request: &GenerationRequest) -> ProviderResult<ProviderReply>;

    /// Cheap liveness check, not a full generation. A probe failure counts
    /// exactly like an invoke failure for circuit-breaking purposes.
    async fn probe(&self) -> ProviderResult<()>;
}
