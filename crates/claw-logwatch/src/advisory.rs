//! Remediation advisories from a language-model provider.
//!
//! The [`AdvisoryRequester`] wraps an [`AdvisoryProvider`] and its own
//! [`AdvisoryLedger`]: a request for a (pattern, pod) pair inside the cooldown
//! window, or while another request for the same pair is still pending,
//! returns [`AdvisoryOutcome::CooldownActive`] without calling out. The
//! cooldown is only committed after a successful response so a failed
//! request is retried on the next matching alert.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{Result, WatchError};
use crate::ledger::{AdvisoryKey, AdvisoryLedger};

/// Completion budget for a single-alert advisory.
pub const ADVISORY_MAX_TOKENS: u32 = 200;

/// Completion budget for a batched scan advisory.
pub const BATCH_ADVISORY_MAX_TOKENS: u32 = 500;

/// Maximum number of matches summarized in a batched advisory.
pub const BATCH_ADVISORY_MAX_MATCHES: usize = 5;

/// Log lines longer than this are truncated before being put in a prompt.
pub const MAX_PROMPT_LINE_CHARS: usize = 2000;

/// Default advisory request timeout.
pub const DEFAULT_ADVISORY_TIMEOUT: Duration = Duration::from_secs(25);

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens in the completion.
    pub completion_tokens: u32,
    /// Total tokens billed.
    pub total_tokens: u32,
}

/// Per-token pricing used to estimate request cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostRates {
    /// USD per 1000 prompt tokens.
    pub prompt_per_1k: f64,
    /// USD per 1000 completion tokens.
    pub completion_per_1k: f64,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            prompt_per_1k: 0.000_15,
            completion_per_1k: 0.000_6,
        }
    }
}

impl CostRates {
    /// Returns the estimated cost of `usage` in USD.
    #[must_use]
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (f64::from(usage.prompt_tokens) * self.prompt_per_1k
            + f64::from(usage.completion_tokens) * self.completion_per_1k)
            / 1000.0
    }
}

/// A request to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// The user prompt.
    pub prompt: String,
    /// Upper bound on completion length.
    pub max_tokens: u32,
}

/// A provider response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Completion text.
    pub text: String,
    /// Token usage.
    pub usage: TokenUsage,
}

/// A text-completion backend.
pub trait AdvisoryProvider: Send + Sync {
    /// Returns a short name for logging.
    fn name(&self) -> &str;

    /// Requests a completion.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Provider`] (or a transport error) if the call fails.
    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Completion>> + Send + 'a>>;
}

/// A successful advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    /// Recommendation text, trimmed.
    pub text: String,
    /// Token usage of the request.
    pub usage: TokenUsage,
    /// Estimated cost in USD.
    pub cost_usd: f64,
}

/// Result of [`AdvisoryRequester::request_advisory`].
#[derive(Debug, Clone, PartialEq)]
pub enum AdvisoryOutcome {
    /// The provider returned a recommendation.
    Recommendation(Advisory),
    /// A recent advisory for the same pattern and pod suppressed this request.
    CooldownActive,
    /// The provider call failed or timed out.
    Unavailable,
}

impl AdvisoryOutcome {
    /// Returns the advisory if one was obtained.
    #[must_use]
    pub const fn advisory(&self) -> Option<&Advisory> {
        match self {
            Self::Recommendation(advisory) => Some(advisory),
            _ => None,
        }
    }
}

impl std::fmt::Display for AdvisoryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recommendation(advisory) => f.write_str(&advisory.text),
            Self::CooldownActive => f.write_str("(cached - cooldown active)"),
            Self::Unavailable => f.write_str("LLM unavailable"),
        }
    }
}

/// Requests advisories, honoring a per (pattern, pod) cooldown.
pub struct AdvisoryRequester {
    provider: Arc<dyn AdvisoryProvider>,
    ledger: AdvisoryLedger,
    rates: CostRates,
    timeout: Duration,
}

impl std::fmt::Debug for AdvisoryRequester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisoryRequester")
            .field("provider", &self.provider.name())
            .field("ledger", &self.ledger)
            .field("rates", &self.rates)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AdvisoryRequester {
    /// Creates a requester with default pricing and timeout.
    #[must_use]
    pub fn new(provider: Arc<dyn AdvisoryProvider>, ledger: AdvisoryLedger) -> Self {
        Self {
            provider,
            ledger,
            rates: CostRates::default(),
            timeout: DEFAULT_ADVISORY_TIMEOUT,
        }
    }

    /// Sets the provider call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the cooldown ledger.
    #[must_use]
    pub const fn ledger(&self) -> &AdvisoryLedger {
        &self.ledger
    }

    /// Requests a fix recommendation for one matched line.
    ///
    /// Never fails: provider errors are logged and reported as
    /// [`AdvisoryOutcome::Unavailable`], leaving the cooldown untouched.
    /// The (pattern, pod) key stays reserved while the provider call runs.
    pub async fn request_advisory(
        &self,
        pattern_name: &str,
        log_line: &str,
        pod_name: &str,
    ) -> AdvisoryOutcome {
        let Some(permit) = self.ledger.try_acquire(AdvisoryKey::new(pattern_name, pod_name)) else {
            debug!(pattern = %pattern_name, pod = %pod_name, "advisory cooldown active");
            return AdvisoryOutcome::CooldownActive;
        };

        let request = CompletionRequest {
            prompt: advisory_prompt(pattern_name, log_line, pod_name),
            max_tokens: ADVISORY_MAX_TOKENS,
        };

        match self.complete(&request).await {
            Ok(advisory) => {
                permit.commit();
                AdvisoryOutcome::Recommendation(advisory)
            }
            Err(e) => {
                error!(
                    provider = %self.provider.name(),
                    pattern = %pattern_name,
                    pod = %pod_name,
                    error = %e,
                    "LLM error"
                );
                AdvisoryOutcome::Unavailable
            }
        }
    }

    /// Requests a root-cause analysis for several matches on one pod.
    ///
    /// Only the first [`BATCH_ADVISORY_MAX_MATCHES`] matches are summarized.
    /// Not subject to the cooldown.
    ///
    /// # Errors
    ///
    /// Returns the provider error or [`WatchError::Timeout`].
    pub async fn request_batch_advisory(
        &self,
        matches: &[(&str, &str)],
        pod_name: &str,
    ) -> Result<Advisory> {
        let request = CompletionRequest {
            prompt: batch_prompt(matches, pod_name),
            max_tokens: BATCH_ADVISORY_MAX_TOKENS,
        };
        self.complete(&request).await
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Advisory> {
        let completion = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| WatchError::Timeout(self.timeout.as_secs()))??;

        Ok(Advisory {
            text: completion.text.trim().to_string(),
            cost_usd: self.rates.cost(&completion.usage),
            usage: completion.usage,
        })
    }
}

/// Builds the single-line advisory prompt.
#[must_use]
pub fn advisory_prompt(pattern_name: &str, log_line: &str, pod_name: &str) -> String {
    format!(
        "Error detected in Kubernetes pod '{pod_name}':\n\
         Error Type: {pattern_name}\n\
         Log: {}\n\n\
         Provide a concise fix recommendation (2-3 sentences):",
        truncate_line(log_line.trim())
    )
}

/// Builds the batched root-cause prompt.
#[must_use]
pub fn batch_prompt(matches: &[(&str, &str)], pod_name: &str) -> String {
    let summary = matches
        .iter()
        .take(BATCH_ADVISORY_MAX_MATCHES)
        .map(|(name, line)| format!("- [{name}] {}", truncate_line(line.trim())))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Analyze these errors from Kubernetes pod '{pod_name}':\n\n\
         {summary}\n\n\
         Provide:\n\
         1. Root cause analysis\n\
         2. Specific fix recommendations\n\
         3. Prevention strategies"
    )
}

fn truncate_line(line: &str) -> &str {
    match line.char_indices().nth(MAX_PROMPT_LINE_CHARS) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
