//! textrelay core
//!
//! A request-routing layer between an application and a pool of
//! interchangeable text-generation providers. One relay instance owns a
//! registry of credentialed adapters grouped into families, a circuit
//! breaker per adapter, and a fingerprint-keyed response cache; dispatch
//! walks the families in configured order and returns the first success, or
//! a single typed exhaustion/timeout error.
//!
//! ```rust,ignore
//! use textrelay_core::{GenerationRequest, Relay, RelayConfig};
//!
//! let relay = Relay::new(RelayConfig::from_file("relay.yml")?)?;
//! let result = relay
//!     .generate(GenerationRequest::new("Summarize this resume…"))
//!     .await?;
//! println!("{} answered: {}", result.adapter, result.text);
//! ```

pub mod bridge;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod types;

// Core surface
pub use orchestrator::{AdapterHealth, ProbeReport, Relay, RelayBuilder, RelayStats};
pub use types::{
    GenerationRequest, GenerationResult, ProviderError, ProviderResult, RelayError, RelayResult,
    TokenUsage,
};

// Configuration
pub use config::{AdapterConfig, ProviderKind, RelayConfig};

// Circuit breaker
pub use circuit_breaker::{
    BreakerMetricsSnapshot, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, State,
};

// Cache
pub use cache::{
    CacheBackendError, CacheConfig, CacheStats, CacheStore, MemoryStore, ResponseCache,
};

// Providers
pub use provider::{
    AnthropicConfig, AnthropicProvider, MockProvider, OpenAiCompatConfig, OpenAiCompatProvider,
    ProviderReply, TextProvider,
};

// Registry and blocking facade
pub use bridge::{BlockingRelay, CallBridge};
pub use registry::{ProviderRegistry, SkippedAdapter};
