//! Retry controller: drives one claim to `completed` or `failed`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::processor::ClaimProcessor;
use crate::audit::AuditEngine;
use crate::models::{ClaimPatch, ClaimStatus};
use crate::store::StoreError;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Wait after the first failed attempt; doubles after each further one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait after failed attempt `attempt` (1-based) before the next one.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        backoff_delay(attempt.saturating_sub(1), self.base_delay)
    }

    /// Every wait the policy can perform, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_retries).map(|a| self.delay_after(a)).collect()
    }
}

/// Calculate exponential backoff delay: `base * 2^exponent`.
pub fn backoff_delay(exponent: u32, base: Duration) -> Duration {
    base.saturating_mul(2u32.saturating_pow(exponent))
}

/// Something that can wait. Production code sleeps on the runtime timer;
/// tests record the requested waits instead.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Non-blocking sleep on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Extraction succeeded on attempt `attempts`.
    Completed { attempts: u32 },
    /// Every attempt failed.
    Exhausted { attempts: u32, error: String },
    /// A failure no retry can fix; remaining attempts were skipped.
    Rejected { attempts: u32, error: String },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Completed { attempts }
            | Self::Exhausted { attempts, .. }
            | Self::Rejected { attempts, .. } => *attempts,
        }
    }
}

/// Runs processing attempts with backoff, then audits completed claims.
pub struct JobRunner {
    processor: ClaimProcessor,
    auditor: Arc<AuditEngine>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl JobRunner {
    pub fn new(processor: ClaimProcessor, auditor: Arc<AuditEngine>, policy: RetryPolicy) -> Self {
        Self {
            processor,
            auditor,
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn auditor(&self) -> &Arc<AuditEngine> {
        &self.auditor
    }

    /// Process `claim_id` until it completes or attempts run out.
    pub async fn run(&self, claim_id: &str) -> RunOutcome {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;

        loop {
            info!(
                "Processing claim {} (attempt {}/{})",
                claim_id, attempt, max_attempts
            );

            let err = match self.processor.attempt(claim_id).await {
                Ok(_) => {
                    if attempt > 1 {
                        info!("Claim {} succeeded on attempt {}", claim_id, attempt);
                    }
                    self.audit(claim_id).await;
                    return RunOutcome::Completed { attempts: attempt };
                }
                Err(e) => e,
            };

            error!(
                "Claim {} failed on attempt {}/{}: {}",
                claim_id, attempt, max_attempts, err
            );
            if err.is_permanent() {
                warn!("Claim {} cannot succeed on retry, giving up", claim_id);
                self.mark_failed(claim_id, err.to_string()).await;
                return RunOutcome::Rejected {
                    attempts: attempt,
                    error: err.to_string(),
                };
            }

            if attempt >= max_attempts {
                let message = format!("Failed after {} attempts: {}", max_attempts, err);
                error!("Claim {} exhausted all {} attempts", claim_id, max_attempts);
                self.mark_failed(claim_id, message.clone()).await;
                return RunOutcome::Exhausted {
                    attempts: attempt,
                    error: message,
                };
            }

            self.mark_failed(claim_id, err.to_string()).await;
            let wait = self.policy.delay_after(attempt);
            info!("Retrying claim {} in {:?}", claim_id, wait);
            self.sleeper.sleep(wait).await;
            attempt += 1;
        }
    }

    /// Audit a completed claim. Audit outcomes never change claim status.
    async fn audit(&self, claim_id: &str) {
        let result = self.auditor.audit(claim_id, None).await;
        match &result.error {
            Some(e) => warn!("Audit for claim {} degraded: {}", claim_id, e),
            None => info!(
                "Audit for claim {}: {} (risk {})",
                claim_id, result.verdict, result.risk_score
            ),
        }
    }

    /// Best-effort `failed` write; its own failure is only logged.
    async fn mark_failed(&self, claim_id: &str, message: String) {
        let patch = ClaimPatch::status(ClaimStatus::Failed)
            .with_error(message)
            .processed_now();
        match self.processor.claims().update(claim_id, patch).await {
            Ok(()) => {}
            Err(StoreError::InvalidTransition { from, .. }) => {
                warn!("Claim {} stays {}, failure not recorded", claim_id, from);
            }
            Err(e) => error!("Failed to record failure for claim {}: {}", claim_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_from_five_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(
            policy.schedule(),
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(20)
            ]
        );
    }

    #[test]
    fn backoff_saturates() {
        let d = backoff_delay(40, Duration::from_secs(5));
        assert!(d >= Duration::from_secs(5 * 1024));
    }

    #[test]
    fn no_retries_means_no_waits() {
        let policy = RetryPolicy::new(0, Duration::from_secs(5));
        assert_eq!(policy.max_attempts(), 1);
        assert!(policy.schedule().is_empty());
    }

    #[test]
    fn attempt_count_saturates_at_u32_max() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(5));
        assert_eq!(policy.max_attempts(), u32::MAX);
    }

    #[test]
    fn outcome_accessors() {
        assert!(RunOutcome::Completed { attempts: 2 }.is_completed());
        let exhausted = RunOutcome::Exhausted {
            attempts: 4,
            error: "x".into(),
        };
        assert!(!exhausted.is_completed());
        assert_eq!(exhausted.attempts(), 4);
    }
}
