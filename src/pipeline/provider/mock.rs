use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ModelProvider, ModelRequest, ProviderError};

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(String),
    Fail(ProviderError),
    /// Sleep, then abort. Used to trip the per-attempt timeout.
    Hang(Duration),
}

/// Mock provider replaying queued outcomes, then a default one.
///
/// Records every request it receives so tests can inspect prompts.
pub struct ScriptedProvider {
    name: String,
    images: bool,
    script: Mutex<VecDeque<Scripted>>,
    otherwise: Scripted,
    calls: AtomicUsize,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    /// Always answers `response`.
    pub fn replying(name: &str, response: &str) -> Self {
        Self::new(name, Scripted::Reply(response.to_string()))
    }

    /// Always fails with `error`.
    pub fn failing(name: &str, error: ProviderError) -> Self {
        Self::new(name, Scripted::Fail(error))
    }

    pub fn new(name: &str, otherwise: Scripted) -> Self {
        Self {
            name: name.to_string(),
            images: true,
            script: Mutex::new(VecDeque::new()),
            otherwise,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue outcomes served before the default.
    pub fn then(self, outcome: Scripted) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(outcome);
        self
    }

    pub fn text_only(mut self) -> Self {
        self.images = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_images(&self) -> bool {
        self.images
    }

    async fn generate(&self, request: &ModelRequest) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.clone());

        let next = self
            .script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.otherwise.clone());

        match next {
            Scripted::Reply(text) => Ok(text),
            Scripted::Fail(error) => Err(error),
            Scripted::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Err(ProviderError::Aborted("scripted hang elapsed".into()))
            }
        }
    }
}
