//! Audit Engine: structured claim data plus policy wording in, verdict out.
//!
//! [`AuditEngine::audit`] never fails. Missing data short-circuits to a
//! manual-review verdict without calling the model, and any model failure
//! is folded into a `NEEDS_REVIEW` result carrying the error.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::llm::{analyze_claim, ChatModel, LlmConfig};
use crate::models::{AuditResult, Claim, ClaimPatch, Finding, FindingType, Severity};
use crate::store::{ClaimStore, PolicyLookup};

/// Risk score for a claim that cannot be found at all.
const MISSING_CLAIM_RISK: u8 = 100;
/// Risk score for anything routed to manual review.
const REVIEW_RISK: u8 = 50;

pub struct AuditEngine {
    claims: Arc<dyn ClaimStore>,
    model: Arc<dyn ChatModel>,
    config: LlmConfig,
    policies: Option<Arc<dyn PolicyLookup>>,
}

impl AuditEngine {
    pub fn new(claims: Arc<dyn ClaimStore>, model: Arc<dyn ChatModel>, config: LlmConfig) -> Self {
        Self {
            claims,
            model,
            config,
            policies: None,
        }
    }

    /// Resolve policy wording by `policy_id` when the claim carries none.
    pub fn with_policy_lookup(mut self, policies: Arc<dyn PolicyLookup>) -> Self {
        self.policies = Some(policies);
        self
    }

    /// Audit `claim_id`, persisting the result when the model was consulted.
    ///
    /// `policy_override` takes precedence over any wording attached to the
    /// claim or reachable through the policy lookup.
    pub async fn audit(&self, claim_id: &str, policy_override: Option<&str>) -> AuditResult {
        let claim = match self.claims.get(claim_id).await {
            Ok(Some(claim)) => claim,
            Ok(None) => {
                warn!("Audit requested for unknown claim {}", claim_id);
                return AuditResult::needs_review(
                    MISSING_CLAIM_RISK,
                    Finding::new(FindingType::Other, Severity::High, "Claim not found"),
                    "Unable to find claim in the claim store.",
                );
            }
            Err(e) => {
                warn!("Audit could not load claim {}: {}", claim_id, e);
                return AuditResult::needs_review(
                    REVIEW_RISK,
                    Finding::new(
                        FindingType::Other,
                        Severity::High,
                        format!("Audit processing error: {}", e),
                    ),
                    "Automated audit encountered an error. Please review manually.",
                )
                .with_error(e.to_string());
            }
        };

        let structured = claim
            .extracted_data
            .as_ref()
            .and_then(|d| d.structured_data.as_ref())
            .filter(|s| !s.is_empty_extraction());
        let Some(structured) = structured else {
            info!("Claim {} has no usable structured data, needs review", claim_id);
            return AuditResult::needs_review(
                REVIEW_RISK,
                Finding::new(
                    FindingType::MissingDocument,
                    Severity::High,
                    "No structured claim data available",
                ),
                "Unable to extract claim details from the document. Manual review required.",
            );
        };

        let policy_text = match policy_override.filter(|text| !text.trim().is_empty()) {
            Some(text) => Some(text.to_string()),
            None => self.resolve_policy(&claim).await,
        };
        debug!(
            "Auditing claim {} ({} policy chars)",
            claim_id,
            policy_text.as_deref().map(str::len).unwrap_or(0)
        );

        let result = match analyze_claim(
            self.model.as_ref(),
            &self.config,
            structured,
            policy_text.as_deref(),
        )
        .await
        {
            Ok(result) => {
                info!(
                    "Claim {} audited: {} (risk {}, {} findings)",
                    claim_id,
                    result.verdict,
                    result.risk_score,
                    result.findings.len()
                );
                result
            }
            Err(e) => {
                warn!("Audit analysis failed for claim {}: {}", claim_id, e);
                AuditResult::needs_review(
                    REVIEW_RISK,
                    Finding::new(
                        FindingType::Other,
                        Severity::High,
                        format!("Automated analysis failed: {}", e),
                    ),
                    "Unable to automatically analyze this claim. Manual review required.",
                )
                .with_error(e.to_string())
            }
        };

        let patch = ClaimPatch::default().with_audit_result(result.clone());
        if let Err(e) = self.claims.update(claim_id, patch).await {
            warn!("Failed to save audit result for claim {}: {}", claim_id, e);
        }
        result
    }

    async fn resolve_policy(&self, claim: &Claim) -> Option<String> {
        if let Some(text) = claim.policy_text.as_ref().filter(|t| !t.trim().is_empty()) {
            return Some(text.clone());
        }
        let (Some(policies), Some(policy_id)) = (&self.policies, claim.policy_id.as_deref()) else {
            return None;
        };
        match policies.policy_text(policy_id).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Policy lookup failed for {}: {}", policy_id, e);
                None
            }
        }
    }
}
