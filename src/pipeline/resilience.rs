//! Retry, timeout and fallback as data.
//!
//! A [`RetryPolicy`] names the attempt budget, the backoff curve, which
//! errors are worth retrying or handing to the next provider, and the
//! fallback providers. One routine, [`call_with_resilience`], applies any
//! policy to any model call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::provider::{ModelProvider, ProviderError};
use super::types::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    None,
    /// Wait `n * unit` after the n-th failed attempt.
    Linear { unit: Duration },
}

impl Backoff {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Linear { unit } => unit.saturating_mul(attempt),
        }
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    /// Attempts per provider, including the first.
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Hard deadline per attempt; the in-flight call is dropped on expiry.
    pub attempt_timeout: Duration,
    pub retryable: fn(&ProviderError) -> bool,
    /// Errors that end the current provider's turn at once and move on to
    /// the next provider in the chain.
    pub fall_through: fn(&ProviderError) -> bool,
    /// Tried in order once the primary exhausts its budget.
    pub fallbacks: Vec<Arc<dyn ModelProvider>>,
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, unit: Duration, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Linear { unit },
            attempt_timeout,
            retryable: ProviderError::is_transient,
            fall_through: ProviderError::is_unreadable,
            fallbacks: Vec::new(),
        }
    }

    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff.delay_after(attempt)
    }

    pub fn with_fallback(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.fallbacks.push(provider);
        self
    }

    pub fn without_fallbacks(&self) -> Self {
        Self {
            fallbacks: Vec::new(),
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("attempt_timeout", &self.attempt_timeout)
            .field(
                "fallbacks",
                &self.fallbacks.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Which provider in the chain is being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderTier {
    Primary,
    /// Index into [`RetryPolicy::fallbacks`].
    Fallback(usize),
}

/// A successful call and how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub provider: String,
    pub tier: ProviderTier,
    /// Attempts across all tiers, including the successful one.
    pub attempts: u32,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResilienceError {
    /// A non-retryable error. Propagated at once, no fallback.
    #[error("{provider} rejected the call after {attempts} attempt(s): {source}")]
    Rejected {
        provider: String,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("All providers exhausted after {attempts} attempt(s); last error: {last}")]
    Exhausted { attempts: u32, last: ProviderError },
}

impl ResilienceError {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Rejected { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_source(self) -> ProviderError {
        match self {
            Self::Rejected { source, .. } => source,
            Self::Exhausted { last, .. } => last,
        }
    }
}

/// Run `op` against the primary, then each fallback, under `policy`.
///
/// Every provider gets the full attempt budget. Retryable failures back off
/// and retry; fall-through failures skip straight to the next provider;
/// anything else is returned immediately as `Rejected`.
pub async fn call_with_resilience<T, F, Fut>(
    stage: Stage,
    policy: &RetryPolicy,
    primary: &Arc<dyn ModelProvider>,
    op: F,
) -> Result<Resolved<T>, ResilienceError>
where
    F: Fn(Arc<dyn ModelProvider>, ProviderTier) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let chain: Vec<(Arc<dyn ModelProvider>, ProviderTier)> = std::iter::once((
        Arc::clone(primary),
        ProviderTier::Primary,
    ))
    .chain(
        policy
            .fallbacks
            .iter()
            .enumerate()
            .map(|(i, p)| (Arc::clone(p), ProviderTier::Fallback(i))),
    )
    .collect();

    let mut total_attempts = 0u32;
    let mut last_error = None;

    for (index, (provider, tier)) in chain.iter().enumerate() {
        for attempt in 1..=policy.max_attempts {
            if attempt > 1 {
                let delay = policy.backoff_after(attempt - 1);
                debug!(%stage, provider = provider.name(), attempt, ?delay, "Backing off");
                tokio::time::sleep(delay).await;
            }
            total_attempts += 1;

            let outcome =
                match tokio::time::timeout(policy.attempt_timeout, op(Arc::clone(provider), *tier))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(policy.attempt_timeout)),
                };

            match outcome {
                Ok(value) => {
                    return Ok(Resolved {
                        value,
                        provider: provider.name().to_string(),
                        tier: *tier,
                        attempts: total_attempts,
                    });
                }
                Err(e) if (policy.fall_through)(&e) => {
                    warn!(
                        %stage,
                        provider = provider.name(),
                        attempt,
                        error = %e,
                        "Model response unusable, moving to next provider"
                    );
                    last_error = Some(e);
                    break;
                }
                Err(e) if (policy.retryable)(&e) => {
                    warn!(
                        %stage,
                        provider = provider.name(),
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %e,
                        "Model call failed, retrying"
                    );
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(
                        %stage,
                        provider = provider.name(),
                        attempt,
                        error = %e,
                        "Model call rejected, not retrying"
                    );
                    return Err(ResilienceError::Rejected {
                        provider: provider.name().to_string(),
                        attempts: total_attempts,
                        source: e,
                    });
                }
            }
        }

        if let Some((next, _)) = chain.get(index + 1) {
            warn!(
                %stage,
                exhausted = provider.name(),
                fallback = next.name(),
                "Provider exhausted its retry budget, falling back"
            );
        }
    }

    Err(ResilienceError::Exhausted {
        attempts: total_attempts,
        last: last_error.unwrap_or_else(|| ProviderError::Aborted("no attempt made".into())),
    })
}
