//! Shared wiring for CLI commands.

use std::sync::Arc;

use console::style;

use crate::audit::AuditEngine;
use crate::config::Settings;
use crate::intake::ClaimIntake;
use crate::llm::{ChatModel, LlmClient};
use crate::models::{AuditResult, Claim, ClaimStatus};
use crate::normalize::ClaimNormalizer;
use crate::ocr::TextExtractor;
use crate::pipeline::{ClaimProcessor, JobRunner};
use crate::store::{
    BlobStore, ClaimStore, FsBlobStore, FsPolicyStore, PolicyLookup, SqliteClaimStore,
};

/// Everything a command needs, built from settings over the on-disk stores.
pub struct App {
    pub claims: Arc<dyn ClaimStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub policies: Arc<dyn PolicyLookup>,
    pub model: Arc<dyn ChatModel>,
}

impl App {
    pub fn open(settings: &Settings) -> anyhow::Result<Self> {
        let root = &settings.storage.data_dir;
        let model: Arc<dyn ChatModel> = Arc::new(LlmClient::new(settings.llm.clone())?);
        Ok(Self {
            claims: Arc::new(SqliteClaimStore::in_data_dir(root)?),
            blobs: Arc::new(FsBlobStore::new(root)?),
            policies: Arc::new(FsPolicyStore::new(root)),
            model,
        })
    }

    pub fn intake(&self, settings: &Settings) -> ClaimIntake {
        ClaimIntake::new(Arc::clone(&self.claims), Arc::clone(&self.blobs))
            .with_policy_lookup(Arc::clone(&self.policies))
            .with_max_upload_bytes(settings.intake.max_upload_bytes)
    }

    pub fn auditor(&self, settings: &Settings) -> AuditEngine {
        AuditEngine::new(
            Arc::clone(&self.claims),
            Arc::clone(&self.model),
            settings.llm.clone(),
        )
        .with_policy_lookup(Arc::clone(&self.policies))
    }

    pub fn normalizer(&self, settings: &Settings) -> ClaimNormalizer {
        ClaimNormalizer::standard(Arc::clone(&self.model), settings.llm.clone())
    }

    pub fn runner(&self, settings: &Settings) -> JobRunner {
        let processor = ClaimProcessor::new(
            Arc::clone(&self.claims),
            Arc::clone(&self.blobs),
            Arc::new(extractor(settings)),
            Arc::new(self.normalizer(settings)),
        );
        JobRunner::new(
            processor,
            Arc::new(self.auditor(settings)),
            settings.retry_policy(),
        )
    }
}

pub fn extractor(settings: &Settings) -> TextExtractor {
    TextExtractor::standard(&settings.ocr.language, settings.ocr.dpi)
}

/// One-line summary of a claim.
pub fn print_claim_line(claim: &Claim) {
    let status = match claim.status {
        ClaimStatus::Completed => style(claim.status.as_str()).green(),
        ClaimStatus::Failed => style(claim.status.as_str()).red(),
        _ => style(claim.status.as_str()).yellow(),
    };
    println!(
        "  {}  {:<16} {:<24} {}",
        style(&claim.id).dim(),
        status,
        claim.file_name.as_deref().unwrap_or("-"),
        claim.created_at.format("%Y-%m-%d %H:%M")
    );
    if let Some(err) = &claim.error_message {
        println!("      {}", style(err).red());
    }
}

pub fn print_audit(result: &AuditResult) {
    println!(
        "{} {} (risk {}, confidence {:.2})",
        style("Verdict:").bold(),
        style(result.verdict.as_str()).cyan(),
        result.risk_score,
        result.confidence
    );
    for finding in &result.findings {
        println!(
            "  - [{:?}/{:?}] {}",
            finding.severity, finding.finding_type, finding.description
        );
    }
    if !result.explanation.is_empty() {
        println!("{}", result.explanation);
    }
    if let Some(err) = &result.error {
        println!("{} {}", style("!").yellow(), style(err).dim());
    }
}
