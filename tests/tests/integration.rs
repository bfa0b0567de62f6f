//! End-to-end dispatch behavior against scripted providers.

use std::sync::Arc;
use std::time::Duration;

use textrelay_testing::{adapter_config, init_tracing, relay_with_mocks, test_breaker};

use textrelay_core::{
    BlockingRelay, GenerationRequest, MockProvider, ProviderError, RelayError, State,
};

fn failures(relay: &textrelay_core::Relay, adapter: &str) -> u32 {
    relay
        .health()
        .into_iter()
        .find(|h| h.adapter == adapter)
        .map(|h| h.breaker.consecutive_failures)
        .unwrap_or_else(|| panic!("adapter {adapter} not registered"))
}

fn breaker_state(relay: &textrelay_core::Relay, adapter: &str) -> State {
    relay
        .health()
        .into_iter()
        .find(|h| h.adapter == adapter)
        .map(|h| h.breaker.state)
        .unwrap_or_else(|| panic!("adapter {adapter} not registered"))
}

#[tokio::test]
async fn cached_result_suppresses_second_call() -> anyhow::Result<()> {
    init_tracing();
    let mock = Arc::new(MockProvider::always_ok("cached answer"));
    let relay = relay_with_mocks(vec![(adapter_config("groq", 0, 0), Arc::clone(&mock))]).build()?;

    let first = relay
        .generate(GenerationRequest::new("identical prompt"))
        .await?;
    assert_eq!(first.text, "cached answer");
    assert_eq!(first.adapter, "groq#0");

    // The cache write is fire-and-forget; give it a moment to land.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = relay
        .generate(GenerationRequest::new("identical prompt"))
        .await?;
    assert_eq!(second.text, "cached answer");
    assert_eq!(mock.calls(), 1);
    assert_eq!(relay.cache_stats().hits, 1);
    Ok(())
}

#[tokio::test]
async fn no_cache_opt_out_always_reaches_the_adapter() -> anyhow::Result<()> {
    init_tracing();
    let mock = Arc::new(MockProvider::always_ok("fresh"));
    let relay = relay_with_mocks(vec![(adapter_config("groq", 0, 0), Arc::clone(&mock))]).build()?;

    relay
        .generate(GenerationRequest::new("prompt").without_cache())
        .await?;
    relay
        .generate(GenerationRequest::new("prompt").without_cache())
        .await?;
    assert_eq!(mock.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn fallback_returns_first_success_and_records_failures() -> anyhow::Result<()> {
    init_tracing();
    let broken_a = Arc::new(MockProvider::always_err(ProviderError::Upstream {
        status: Some(500),
        message: "boom".to_string(),
    }));
    let broken_b = Arc::new(MockProvider::always_err(ProviderError::RateLimited(
        "slow down".to_string(),
    )));
    let healthy = Arc::new(MockProvider::always_ok("third time lucky"));

    let relay = relay_with_mocks(vec![
        (adapter_config("groq", 0, 0), Arc::clone(&broken_a)),
        (adapter_config("groq", 1, 1), Arc::clone(&broken_b)),
        (adapter_config("groq", 2, 2), Arc::clone(&healthy)),
    ])
    .build()?;

    let result = relay.generate(GenerationRequest::new("prompt")).await?;
    assert_eq!(result.adapter, "groq#2");
    assert_eq!(result.text, "third time lucky");

    assert_eq!(broken_a.calls(), 1);
    assert_eq!(broken_b.calls(), 1);
    assert_eq!(failures(&relay, "groq#0"), 1);
    assert_eq!(failures(&relay, "groq#1"), 1);
    assert_eq!(failures(&relay, "groq#2"), 0);

    let stats = relay.stats();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.served, 1);
    assert_eq!(stats.exhausted, 0);
    Ok(())
}

#[tokio::test]
async fn families_are_tried_whole_in_configured_order() -> anyhow::Result<()> {
    init_tracing();
    let primary_0 = Arc::new(MockProvider::always_err(ProviderError::Network(
        "down".to_string(),
    )));
    let primary_1 = Arc::new(MockProvider::always_err(ProviderError::Network(
        "down".to_string(),
    )));
    let fallback = Arc::new(MockProvider::always_ok("served by fallback"));

    let relay = relay_with_mocks(vec![
        (adapter_config("fallback", 0, 0), Arc::clone(&fallback)),
        (adapter_config("primary", 0, 0), Arc::clone(&primary_0)),
        (adapter_config("primary", 1, 1), Arc::clone(&primary_1)),
    ])
    .family_order(vec!["primary".to_string(), "fallback".to_string()])
    .build()?;

    let result = relay.generate(GenerationRequest::new("prompt")).await?;
    assert_eq!(result.adapter, "fallback#0");
    // Both credentials of the primary family were tried before moving on.
    assert_eq!(primary_0.calls(), 1);
    assert_eq!(primary_1.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn breaker_opens_after_threshold_and_skips_the_adapter() -> anyhow::Result<()> {
    init_tracing();
    let broken = Arc::new(MockProvider::always_err(ProviderError::Upstream {
        status: Some(500),
        message: "boom".to_string(),
    }));
    let relay = relay_with_mocks(vec![(adapter_config("groq", 0, 0), Arc::clone(&broken))])
        .breaker(test_breaker(3, Duration::from_secs(60)))
        .build()?;

    for _ in 0..3 {
        let err = relay
            .generate(GenerationRequest::new("prompt").without_cache())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Exhausted { attempted: 1, .. }));
    }
    assert_eq!(broken.calls(), 3);
    assert_eq!(breaker_state(&relay, "groq#0"), State::Open);

    // Fourth call: the adapter is skipped entirely.
    let err = relay
        .generate(GenerationRequest::new("prompt").without_cache())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RelayError::Exhausted {
            attempted: 0,
            skipped: 1
        }
    ));
    assert_eq!(broken.calls(), 3);
    Ok(())
}

#[tokio::test]
async fn half_open_trial_recovers_after_cooldown() -> anyhow::Result<()> {
    init_tracing();
    let flaky = Arc::new(MockProvider::with_script(vec![Err(
        ProviderError::Upstream {
            status: Some(503),
            message: "briefly down".to_string(),
        },
    )]));
    let relay = relay_with_mocks(vec![(adapter_config("groq", 0, 0), Arc::clone(&flaky))])
        .breaker(test_breaker(1, Duration::from_millis(100)))
        .build()?;

    relay
        .generate(GenerationRequest::new("prompt").without_cache())
        .await
        .unwrap_err();
    assert_eq!(breaker_state(&relay, "groq#0"), State::Open);

    // Still cooling down: adapter must not be touched.
    relay
        .generate(GenerationRequest::new("prompt").without_cache())
        .await
        .unwrap_err();
    assert_eq!(flaky.calls(), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;

    // Cooldown elapsed: one trial call goes through and closes the circuit.
    let result = relay
        .generate(GenerationRequest::new("prompt").without_cache())
        .await?;
    assert_eq!(result.text, "mock reply");
    assert_eq!(flaky.calls(), 2);
    assert_eq!(breaker_state(&relay, "groq#0"), State::Closed);
    assert_eq!(failures(&relay, "groq#0"), 0);
    Ok(())
}

#[tokio::test]
async fn all_open_breakers_mean_exhausted_without_any_invocation() -> anyhow::Result<()> {
    init_tracing();
    let broken_a = Arc::new(MockProvider::always_err(ProviderError::Network(
        "down".to_string(),
    )));
    let broken_b = Arc::new(MockProvider::always_err(ProviderError::Network(
        "down".to_string(),
    )));
    let relay = relay_with_mocks(vec![
        (adapter_config("groq", 0, 0), Arc::clone(&broken_a)),
        (adapter_config("openai", 0, 0), Arc::clone(&broken_b)),
    ])
    .breaker(test_breaker(1, Duration::from_secs(60)))
    .build()?;

    relay
        .generate(GenerationRequest::new("prompt").without_cache())
        .await
        .unwrap_err();
    let calls_after_opening = broken_a.calls() + broken_b.calls();

    let err = relay
        .generate(GenerationRequest::new("prompt").without_cache())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RelayError::Exhausted {
            attempted: 0,
            skipped: 2
        }
    ));
    assert_eq!(broken_a.calls() + broken_b.calls(), calls_after_opening);
    Ok(())
}

#[tokio::test]
async fn empty_credential_adapter_is_excluded_and_never_invoked() -> anyhow::Result<()> {
    init_tracing();
    let unusable = Arc::new(MockProvider::always_ok("should never run"));
    let healthy = Arc::new(MockProvider::always_ok("served"));

    let mut unusable_config = adapter_config("groq", 0, 0);
    unusable_config.credential = String::new();

    let relay = relay_with_mocks(vec![
        (unusable_config, Arc::clone(&unusable)),
        (adapter_config("groq", 1, 1), Arc::clone(&healthy)),
    ])
    .build()?;

    assert_eq!(relay.adapter_count(), 1);
    assert_eq!(relay.skipped_adapters().len(), 1);
    assert_eq!(relay.skipped_adapters()[0].adapter, "groq#0");

    let result = relay.generate(GenerationRequest::new("prompt")).await?;
    assert_eq!(result.adapter, "groq#1");
    assert_eq!(unusable.calls(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failures_are_never_undercounted() -> anyhow::Result<()> {
    init_tracing();
    let broken = Arc::new(MockProvider::always_err(ProviderError::Upstream {
        status: Some(500),
        message: "boom".to_string(),
    }));
    let relay = Arc::new(
        relay_with_mocks(vec![(adapter_config("groq", 0, 0), Arc::clone(&broken))])
            .breaker(test_breaker(1000, Duration::from_secs(60)))
            .build()?,
    );

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move {
                let request = GenerationRequest::new(format!("prompt {i}")).without_cache();
                let _ = relay.generate(request).await;
            })
        })
        .collect();
    for task in tasks {
        task.await?;
    }

    assert_eq!(broken.calls(), 20);
    assert_eq!(failures(&relay, "groq#0"), 20);
    Ok(())
}

#[tokio::test]
async fn per_invoke_timeout_falls_through_to_the_next_adapter() -> anyhow::Result<()> {
    init_tracing();
    let slow = Arc::new(MockProvider::always_ok("too late").with_delay(Duration::from_millis(300)));
    let fast = Arc::new(MockProvider::always_ok("in time"));

    let relay = relay_with_mocks(vec![
        (adapter_config("groq", 0, 0), Arc::clone(&slow)),
        (adapter_config("groq", 1, 1), Arc::clone(&fast)),
    ])
    .invoke_timeout(Duration::from_millis(50))
    .build()?;

    let result = relay.generate(GenerationRequest::new("prompt")).await?;
    assert_eq!(result.adapter, "groq#1");
    assert_eq!(result.text, "in time");
    assert_eq!(failures(&relay, "groq#0"), 1);
    Ok(())
}

#[tokio::test]
async fn caller_deadline_abandons_remaining_attempts() -> anyhow::Result<()> {
    init_tracing();
    let slow = Arc::new(MockProvider::always_ok("too late").with_delay(Duration::from_millis(500)));
    let relay = relay_with_mocks(vec![(adapter_config("groq", 0, 0), Arc::clone(&slow))])
        .invoke_timeout(Duration::from_secs(5))
        .build()?;

    let err = relay
        .generate_with_deadline(GenerationRequest::new("prompt"), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::DeadlineExceeded));
    Ok(())
}

#[tokio::test]
async fn probes_feed_the_breakers() -> anyhow::Result<()> {
    init_tracing();
    let healthy = Arc::new(MockProvider::always_ok("fine"));
    let unhealthy = Arc::new(MockProvider::always_err(ProviderError::Network(
        "down".to_string(),
    )));

    let relay = relay_with_mocks(vec![
        (adapter_config("groq", 0, 0), Arc::clone(&healthy)),
        (adapter_config("openai", 0, 0), Arc::clone(&unhealthy)),
    ])
    .build()?;

    let reports = relay.probe_all().await;
    assert_eq!(reports.len(), 2);
    let healthy_report = reports.iter().find(|r| r.adapter == "groq#0").unwrap();
    let unhealthy_report = reports.iter().find(|r| r.adapter == "openai#0").unwrap();
    assert!(healthy_report.healthy);
    assert!(!unhealthy_report.healthy);
    assert_eq!(failures(&relay, "openai#0"), 1);
    // Probes are liveness checks, not generations.
    assert_eq!(healthy.calls(), 0);
    Ok(())
}

#[test]
fn blocking_generate_from_a_thread_that_owns_an_event_loop() {
    init_tracing();
    let mock = Arc::new(MockProvider::always_ok("bridged"));
    let relay = Arc::new(
        relay_with_mocks(vec![(adapter_config("groq", 0, 0), Arc::clone(&mock))])
            .build()
            .unwrap(),
    );
    let blocking = BlockingRelay::new(relay).unwrap();

    // A caller that already owns a runtime must be able to block on the
    // bridge without deadlock or a nested-runtime panic.
    let caller_runtime = tokio::runtime::Runtime::new().unwrap();
    let result = caller_runtime.block_on(async {
        blocking.generate(
            GenerationRequest::new("prompt"),
            Some(Duration::from_secs(5)),
        )
    });
    assert_eq!(result.unwrap().text, "bridged");

    // And from a plain thread with no loop at all.
    let result = blocking.generate(
        GenerationRequest::new("another prompt"),
        Some(Duration::from_secs(5)),
    );
    assert_eq!(result.unwrap().text, "bridged");
}

#[test]
fn blocking_generate_times_out_cleanly() {
    init_tracing();
    let slow = Arc::new(MockProvider::always_ok("too late").with_delay(Duration::from_secs(10)));
    let relay = Arc::new(
        relay_with_mocks(vec![(adapter_config("groq", 0, 0), slow)])
            .invoke_timeout(Duration::from_secs(30))
            .build()
            .unwrap(),
    );
    let blocking = BlockingRelay::new(relay).unwrap();

    let err = blocking
        .generate(
            GenerationRequest::new("prompt"),
            Some(Duration::from_millis(50)),
        )
        .unwrap_err();
    assert!(matches!(err, RelayError::DeadlineExceeded));
}
