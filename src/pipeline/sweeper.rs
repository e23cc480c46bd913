//! Batch sweeper: processes every queued claim, one at a time.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::retry::{JobRunner, RunOutcome};
use super::PipelineError;
use crate::models::ClaimStatus;
use crate::store::ClaimStore;

/// Tally of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub found: usize,
    pub completed: usize,
    pub failed: usize,
    /// Ids of claims that ended `failed`, in processing order.
    pub failed_ids: Vec<String>,
}

pub struct BatchSweeper {
    claims: Arc<dyn ClaimStore>,
    runner: Arc<JobRunner>,
}

impl BatchSweeper {
    pub fn new(claims: Arc<dyn ClaimStore>, runner: Arc<JobRunner>) -> Self {
        Self { claims, runner }
    }

    /// Run every claim currently `queued`, in store order. One claim's
    /// failure does not stop the sweep.
    pub async fn sweep(&self) -> Result<SweepReport, PipelineError> {
        let queued = self.claims.find(ClaimStatus::Queued).await?;
        info!("Found {} queued claims", queued.len());

        let mut report = SweepReport {
            found: queued.len(),
            ..SweepReport::default()
        };

        for claim_id in queued {
            match self.runner.run(&claim_id).await {
                RunOutcome::Completed { .. } => report.completed += 1,
                RunOutcome::Exhausted { .. } | RunOutcome::Rejected { .. } => {
                    report.failed += 1;
                    report.failed_ids.push(claim_id);
                }
            }
        }

        info!(
            "Sweep finished: {} completed, {} failed",
            report.completed, report.failed
        );
        Ok(report)
    }
}
