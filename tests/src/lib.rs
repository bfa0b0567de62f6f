//! textrelay testing utilities
//!
//! Helpers for driving a relay against scripted providers without live API
//! calls: adapter config shorthand, mock wiring, and log initialization.

use std::sync::Arc;
use std::time::Duration;

use textrelay_core::{
    AdapterConfig, CircuitBreakerConfig, MockProvider, ProviderKind, Relay, RelayBuilder,
    TextProvider,
};

/// Install a fmt subscriber honoring `RUST_LOG`. Safe to call from every
/// test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Adapter config shorthand with a non-empty credential.
pub fn adapter_config(family: &str, ordinal: u32, priority: u32) -> AdapterConfig {
    AdapterConfig {
        family: family.to_string(),
        ordinal,
        kind: ProviderKind::OpenaiCompat,
        credential: "test-key".to_string(),
        base_url: None,
        model: "mock-model".to_string(),
        priority,
        max_tokens: 4096,
    }
}

/// Breaker config suited to fast tests: short cooldown, no jitter so timing
/// assertions stay deterministic.
pub fn test_breaker(threshold: u32, cooldown: Duration) -> CircuitBreakerConfig {
    CircuitBreakerConfig::new()
        .with_failure_threshold(threshold)
        .with_cooldown(cooldown)
        .with_jitter(Duration::ZERO)
}

/// Start a relay builder with the given mock adapters wired in, keeping the
/// mock handles callable for call-count assertions.
pub fn relay_with_mocks(adapters: Vec<(AdapterConfig, Arc<MockProvider>)>) -> RelayBuilder {
    let mut builder = Relay::builder();
    for (config, mock) in adapters {
        builder = builder.adapter(config, mock as Arc<dyn TextProvider>);
    }
    builder
}
