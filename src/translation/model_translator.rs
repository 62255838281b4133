use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::{TextTranslator, TranslationError, DEFAULT_MAX_CONCURRENT_FIELDS};
use crate::pipeline::parser::strip_code_fences;
use crate::pipeline::provider::{ModelProvider, ModelRequest};
use crate::pipeline::resilience::{call_with_resilience, ResilienceError, RetryPolicy};
use crate::pipeline::Stage;

const TRANSLATION_SYSTEM_PROMPT: &str = "You translate patient-facing medical text. \
Translate the text you are given into the requested language. Keep numbers, units, \
dates, medicine names and lab test names exactly as written. Do not add, remove or \
explain anything. Reply with the translated text only.";

/// Translator backed by a model provider, retried under the shared policy.
pub struct ModelTranslator {
    provider: Arc<dyn ModelProvider>,
    policy: RetryPolicy,
    max_concurrent_fields: usize,
}

impl ModelTranslator {
    pub fn new(provider: Arc<dyn ModelProvider>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            policy,
            max_concurrent_fields: DEFAULT_MAX_CONCURRENT_FIELDS,
        }
    }

    pub fn with_max_concurrent_fields(mut self, limit: usize) -> Self {
        self.max_concurrent_fields = limit.max(1);
        self
    }

    fn request(text: &str, target_language: &str) -> ModelRequest {
        ModelRequest::new(
            TRANSLATION_SYSTEM_PROMPT,
            format!("Target language: {target_language}\n\nText:\n{text}"),
        )
        .with_temperature(0.0)
    }
}

#[async_trait]
impl TextTranslator for ModelTranslator {
    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, TranslationError> {
        let request = Self::request(text, target_language);
        let resolved = call_with_resilience(
            Stage::Translate,
            &self.policy,
            &self.provider,
            |provider, _| {
                let request = &request;
                async move { provider.generate(request).await }
            },
        )
        .await
        .map_err(ResilienceError::into_source)?;

        let translated = strip_code_fences(&resolved.value).trim();
        if translated.is_empty() {
            return Err(TranslationError::EmptyResult);
        }
        Ok(translated.to_string())
    }

    fn max_concurrent_fields(&self) -> usize {
        self.max_concurrent_fields
    }
}

/// Prefixes text with the target tag. Configured inputs fail.
#[derive(Debug)]
pub struct MockTranslator {
    failing: HashSet<String>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    max_concurrent_fields: usize,
}

impl Default for MockTranslator {
    fn default() -> Self {
        Self {
            failing: HashSet::new(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            max_concurrent_fields: DEFAULT_MAX_CONCURRENT_FIELDS,
        }
    }
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    pub fn with_max_concurrent_fields(mut self, limit: usize) -> Self {
        self.max_concurrent_fields = limit.max(1);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextTranslator for MockTranslator {
    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, TranslationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(text) {
            return Err(TranslationError::Rejected(text.to_string()));
        }
        Ok(format!("[{target_language}] {text}"))
    }

    fn max_concurrent_fields(&self) -> usize {
        self.max_concurrent_fields
    }
}
