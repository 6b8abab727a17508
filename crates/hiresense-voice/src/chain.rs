//! **Provider chains**: ordered lists of interchangeable providers, tried until one succeeds.
//!
//! Every attempt runs under a per-attempt timeout. A timeout, an error, or an empty payload
//! (the caller decides what "empty" means) is a `Failed` outcome and the chain moves on.
//! A provider is never retried within one call. Providers registered as *sticky* are
//! switched off for the rest of the process after their first failure.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-attempt timeout when none is configured.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything that can sit in a chain. The name shows up in logs and in `ChainSuccess`.
pub trait NamedProvider: Send + Sync {
    fn name(&self) -> &str;
}

/// Tagged result of one provider attempt. Internal to the chains; callers only see
/// `ChainSuccess` or `ChainExhausted`.
#[derive(Debug)]
pub enum ChainOutcome<T> {
    Success(T),
    Failed(String),
}

/// Payload from the first provider that succeeded.
#[derive(Debug, Clone)]
pub struct ChainSuccess<T> {
    pub provider: String,
    pub value: T,
}

/// Every provider in the chain failed (or the chain is empty).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{chain} chain exhausted after {} attempt(s)", .failures.len())]
pub struct ChainExhausted {
    pub chain: &'static str,
    /// `(provider, reason)` for every provider that was consulted, in order.
    pub failures: Vec<(String, String)>,
}

struct ChainEntry<P: ?Sized> {
    provider: Arc<P>,
    sticky: bool,
    disabled: AtomicBool,
}

/// Ordered provider list plus the shared "first success wins" combinator.
pub struct ProviderChain<P: ?Sized> {
    label: &'static str,
    entries: Vec<ChainEntry<P>>,
    attempt_timeout: Duration,
}

impl<P: ?Sized + NamedProvider> ProviderChain<P> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: Vec::new(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Append a provider; it is consulted on every call.
    pub fn with_provider(mut self, provider: Arc<P>) -> Self {
        self.push(provider, false);
        self
    }

    /// Append a provider that is disabled for the rest of the process after one failure.
    pub fn with_sticky_provider(mut self, provider: Arc<P>) -> Self {
        self.push(provider, true);
        self
    }

    pub fn push(&mut self, provider: Arc<P>, sticky: bool) {
        self.entries.push(ChainEntry {
            provider,
            sticky,
            disabled: AtomicBool::new(false),
        });
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Provider names in chain order (disabled ones included).
    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.provider.name().to_string())
            .collect()
    }

    /// Names of providers still eligible for attempts.
    pub fn active_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.disabled.load(Ordering::Acquire))
            .map(|e| e.provider.name().to_string())
            .collect()
    }

    /// Try each provider in order; return the first success.
    ///
    /// `attempt` builds the future for one provider. Its error type only needs `Display`
    /// so the same combinator serves speech providers and the scorer's chat endpoints.
    pub async fn first_success<T, E, F, Fut>(
        &self,
        mut attempt: F,
    ) -> Result<ChainSuccess<T>, ChainExhausted>
    where
        E: Display,
        F: FnMut(Arc<P>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut failures = Vec::new();
        for entry in &self.entries {
            let name = entry.provider.name().to_string();
            if entry.disabled.load(Ordering::Acquire) {
                debug!(target: "hiresense::voice", chain = self.label, provider = %name, "skipping disabled provider");
                failures.push((name, "disabled after earlier failure".to_string()));
                continue;
            }
            match attempt_once(self.attempt_timeout, attempt(Arc::clone(&entry.provider))).await {
                ChainOutcome::Success(value) => {
                    debug!(target: "hiresense::voice", chain = self.label, provider = %name, "provider succeeded");
                    return Ok(ChainSuccess {
                        provider: name,
                        value,
                    });
                }
                ChainOutcome::Failed(reason) => {
                    warn!(target: "hiresense::voice", chain = self.label, provider = %name, %reason, "provider failed, trying next");
                    if entry.sticky && !entry.disabled.swap(true, Ordering::AcqRel) {
                        warn!(target: "hiresense::voice", chain = self.label, provider = %name, "provider disabled for the rest of this process");
                    }
                    failures.push((name, reason));
                }
            }
        }
        Err(ChainExhausted {
            chain: self.label,
            failures,
        })
    }
}

/// Run one attempt under `limit`. Exceeding the limit is reported like any other failure.
pub async fn attempt_once<T, E, Fut>(limit: Duration, fut: Fut) -> ChainOutcome<T>
where
    E: Display,
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => ChainOutcome::Success(value),
        Ok(Err(e)) => ChainOutcome::Failed(e.to_string()),
        Err(_) => ChainOutcome::Failed(format!("timed out after {:?}", limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Stub {
        name: &'static str,
        ok: bool,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Stub {
        fn new(name: &'static str, ok: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                ok,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        async fn run(&self) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.ok {
                Ok(format!("from {}", self.name))
            } else {
                Err(format!("{} is down", self.name))
            }
        }
    }

    impl NamedProvider for Stub {
        fn name(&self) -> &str {
            self.name
        }
    }

    #[tokio::test]
    async fn first_success_wins_and_later_providers_are_untouched() {
        let a = Stub::new("a", false);
        let b = Stub::new("b", true);
        let c = Stub::new("c", true);
        let chain = ProviderChain::new("test")
            .with_provider(a.clone())
            .with_provider(b.clone())
            .with_provider(c.clone());

        let got = chain.first_success(|p| async move { p.run().await }).await.unwrap();
        assert_eq!(got.provider, "b");
        assert_eq!(got.value, "from b");
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(c.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_every_failure_in_order() {
        let chain = ProviderChain::new("tts")
            .with_provider(Stub::new("x", false))
            .with_provider(Stub::new("y", false));
        let err = chain
            .first_success(|p| async move { p.run().await })
            .await
            .unwrap_err();
        assert_eq!(err.chain, "tts");
        let names: Vec<_> = err.failures.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["x", "y"]);
        assert!(err.failures[0].1.contains("x is down"));
    }

    #[tokio::test]
    async fn empty_chain_is_exhausted_immediately() {
        let chain: ProviderChain<Stub> = ProviderChain::new("stt");
        let err = chain
            .first_success(|p| async move { p.run().await })
            .await
            .unwrap_err();
        assert!(err.failures.is_empty());
    }

    #[tokio::test]
    async fn slow_provider_counts_as_failure() {
        let slow = Arc::new(Stub {
            name: "slow",
            ok: true,
            delay: Duration::from_millis(200),
            calls: AtomicUsize::new(0),
        });
        let chain = ProviderChain::new("stt")
            .with_timeout(Duration::from_millis(20))
            .with_provider(slow)
            .with_provider(Stub::new("fast", true));
        let got = chain.first_success(|p| async move { p.run().await }).await.unwrap();
        assert_eq!(got.provider, "fast");
    }

    #[tokio::test]
    async fn sticky_provider_is_skipped_after_first_failure() {
        let flaky = Stub::new("flaky", false);
        let backup = Stub::new("backup", true);
        let chain = ProviderChain::new("tts")
            .with_sticky_provider(flaky.clone())
            .with_provider(backup);

        chain.first_success(|p| async move { p.run().await }).await.unwrap();
        chain.first_success(|p| async move { p.run().await }).await.unwrap();

        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
        assert_eq!(chain.active_names(), vec!["backup".to_string()]);
        assert_eq!(chain.names().len(), 2);
    }
}
