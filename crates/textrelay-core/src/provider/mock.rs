//! Scripted in-memory provider
//!
//! Part of the library surface so downstream callers can drive a relay
//! without network access. Scripted outcomes are consumed front to back;
//! once the script is empty every call returns the default reply.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::{ProviderReply, TextProvider};
use crate::types::{GenerationRequest, ProviderError, ProviderResult, TokenUsage};

pub struct MockProvider {
    model: String,
    script: Mutex<VecDeque<ProviderResult<String>>>,
    default_reply: ProviderResult<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    probe_healthy: AtomicBool,
}

impl MockProvider {
    /// Provider that answers every call with `text`.
    pub fn always_ok(text: impl Into<String>) -> Self {
        Self {
            model: "mock-model".to_string(),
            script: Mutex::new(VecDeque::new()),
            default_reply: Ok(text.into()),
            delay: None,
            calls: AtomicUsize::new(0),
            probe_healthy: AtomicBool::new(true),
        }
    }

    /// Provider that fails every call with `error`.
    pub fn always_err(error: ProviderError) -> Self {
        Self {
            model: "mock-model".to_string(),
            script: Mutex::new(VecDeque::new()),
            default_reply: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
            probe_healthy: AtomicBool::new(false),
        }
    }

    /// Provider that plays `script` front to back, then falls back to a
    /// default successful reply.
    pub fn with_script(script: Vec<ProviderResult<String>>) -> Self {
        Self {
            model: "mock-model".to_string(),
            script: Mutex::new(script.into()),
            default_reply: Ok("mock reply".to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
            probe_healthy: AtomicBool::new(true),
        }
    }

    /// Sleep this long inside every invoke, to exercise timeout paths.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Number of invoke calls observed so far. Probes are not counted.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_probe_healthy(&self, healthy: bool) {
        self.probe_healthy.store(healthy, Ordering::SeqCst);
    }

    fn next_outcome(&self) -> ProviderResult<String> {
        let mut script = self.script.lock();
        script.pop_front().unwrap_or_else(|| self.default_reply.clone())
    }
}

#[async_trait]
impl TextProvider for MockProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, request: &GenerationRequest) -> ProviderResult<ProviderReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let text = self.next_outcome()?;
        // Rough 4-chars-per-token estimate, good enough for assertions.
        let prompt_tokens = (request.prompt.len() / 4) as u32;
        let completion_tokens = (text.len() / 4) as u32;
        Ok(ProviderReply {
            text,
            model: self.model.clone(),
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }

    async fn probe(&self) -> ProviderResult<()> {
        if self.probe_healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::Upstream {
                status: None,
                message: "mock probe unhealthy".to_string(),
            })
        }
    }
}
