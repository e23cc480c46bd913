//! Background claim processing with one worker slot per in-flight claim.
//!
//! Each submitted claim gets its own task, so a claim waiting out a backoff
//! never blocks another. A semaphore caps how many run at once. Outcomes go
//! to an unbounded channel the caller may read or drop; a task that panics
//! is recorded in the dead-letter log and its claim is marked `failed`.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::error;

use super::retry::{JobRunner, RunOutcome};
use crate::models::{ClaimPatch, ClaimStatus};
use crate::store::ClaimStore;

/// Result of one dispatched claim.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub claim_id: String,
    /// `Err` holds the panic or cancellation message of a task that died
    /// outside the retry controller.
    pub result: Result<RunOutcome, String>,
}

/// A task that died outside the retry controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    pub claim_id: String,
    pub error: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct DeadLetterLog {
    entries: Mutex<Vec<DeadLetter>>,
}

impl DeadLetterLog {
    pub fn record(&self, claim_id: &str, error: impl Into<String>) {
        let letter = DeadLetter {
            claim_id: claim_id.to_string(),
            error: error.into(),
            recorded_at: Utc::now(),
        };
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(letter);
    }

    pub fn entries(&self) -> Vec<DeadLetter> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

pub struct ClaimDispatcher {
    runner: Arc<JobRunner>,
    claims: Arc<dyn ClaimStore>,
    slots: Arc<Semaphore>,
    outcomes: mpsc::UnboundedSender<DispatchOutcome>,
    dead_letters: Arc<DeadLetterLog>,
}

impl ClaimDispatcher {
    /// Create a dispatcher running at most `max_in_flight` claims at once,
    /// along with the receiving end of its outcome channel.
    pub fn new(
        runner: Arc<JobRunner>,
        claims: Arc<dyn ClaimStore>,
        max_in_flight: usize,
    ) -> (Self, mpsc::UnboundedReceiver<DispatchOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            runner,
            claims,
            slots: Arc::new(Semaphore::new(max_in_flight.max(1))),
            outcomes: tx,
            dead_letters: Arc::new(DeadLetterLog::default()),
        };
        (dispatcher, rx)
    }

    pub fn dead_letters(&self) -> &Arc<DeadLetterLog> {
        &self.dead_letters
    }

    /// Queue `claim_id` for background processing.
    pub fn submit(&self, claim_id: impl Into<String>) -> JoinHandle<()> {
        let claim_id = claim_id.into();
        let runner = Arc::clone(&self.runner);
        let claims = Arc::clone(&self.claims);
        let slots = Arc::clone(&self.slots);
        let outcomes = self.outcomes.clone();
        let dead_letters = Arc::clone(&self.dead_letters);

        tokio::spawn(async move {
            let _permit = match slots.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let worker_id = claim_id.clone();
            let joined = tokio::spawn(async move { runner.run(&worker_id).await }).await;

            let result = match joined {
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    let message = if e.is_panic() {
                        format!("Processing task panicked: {}", panic_message(e.into_panic()))
                    } else {
                        format!("Processing task cancelled: {}", e)
                    };
                    error!("Claim {}: {}", claim_id, message);
                    dead_letters.record(&claim_id, message.clone());

                    let patch = ClaimPatch::status(ClaimStatus::Failed)
                        .with_error(message.clone())
                        .processed_now();
                    if let Err(e) = claims.update(&claim_id, patch).await {
                        error!("Failed to record failure for claim {}: {}", claim_id, e);
                    }
                    Err(message)
                }
            };

            let _ = outcomes.send(DispatchOutcome { claim_id, result });
        })
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
