//! Ordered fallback chains.
//!
//! App launching and screen capture both try a fixed list of strategies in
//! order and stop at the first one that works. [`first_success`] runs such a
//! list; [`Attempts`] remembers why each earlier strategy failed so the final
//! error can list all of them.
use std::fmt::Display;
use std::future::Future;

use crate::errors::MobileClawError;

/// Failures collected while walking a fallback chain, in the order they happened.
#[derive(Debug, Default)]
pub struct Attempts {
    failures: Vec<(String, String)>,
}

impl Attempts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, label: impl Into<String>, error: &MobileClawError) {
        let label = label.into();
        tracing::warn!(strategy = %label, error = %error, "fallback step failed");
        self.failures.push((label, error.to_string()));
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|(label, _)| label.as_str())
    }

    /// `label: error; label: error`
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|(label, error)| format!("{label}: {error}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl Display for Attempts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Runs `run` for each strategy in order and returns the first `Ok`, paired
/// with the strategy that produced it. Every failure is logged and recorded.
pub async fn first_success<S, T, F, Fut>(strategies: &[S], mut run: F) -> Result<(S, T), Attempts>
where
    S: Copy + Display,
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Result<T, MobileClawError>>,
{
    let mut attempts = Attempts::new();
    for &strategy in strategies {
        match run(strategy).await {
            Ok(value) => {
                if !attempts.is_empty() {
                    tracing::info!(
                        strategy = %strategy,
                        failed_before = attempts.len(),
                        "fallback recovered"
                    );
                }
                return Ok((strategy, value));
            }
            Err(e) => attempts.record(strategy.to_string(), &e),
        }
    }
    Err(attempts)
}
