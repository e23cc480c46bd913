//! End-to-end pipeline scenarios over in-memory stores and scripted
//! capabilities.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use claimaudit::audit::AuditEngine;
use claimaudit::llm::{ChatModel, LlmConfig};
use claimaudit::models::{
    Claim, ClaimItem, ClaimPatch, ClaimStatus, ExtractionConfidence, FindingType, Verdict,
};
use claimaudit::normalize::ClaimNormalizer;
use claimaudit::ocr::TextExtractor;
use claimaudit::pipeline::{
    BatchSweeper, ClaimDispatcher, ClaimProcessor, JobRunner, RetryPolicy, RunOutcome,
};
use claimaudit::store::{BlobStore, ClaimStore, MemoryBlobStore, MemoryClaimStore, StoreError};
use claimaudit::testing::{FlakyTextStrategy, RecordingSleeper, ScriptedModel, PDF_BYTES};

const SCENARIO_A: &str = "Hospital: Apollo Care\nPatient Name: J. Singh\nRs. 1,200.00 consultation\nRs. 1,200.00 consultation";

const APPROVED: &str = r#"```json
{"verdict": "APPROVED", "risk_score": 15, "findings": [], "explanation": "Consultation is covered.", "confidence": 0.85}
```"#;

struct Harness {
    claims: Arc<MemoryClaimStore>,
    blobs: Arc<MemoryBlobStore>,
    model: Arc<ScriptedModel>,
    sleeper: Arc<RecordingSleeper>,
    strategy: FlakyTextStrategy,
}

impl Harness {
    async fn new(strategy: FlakyTextStrategy, model: ScriptedModel, claims: Vec<Claim>) -> Self {
        let blobs = Arc::new(MemoryBlobStore::new());
        for claim in &claims {
            if let Some(path) = &claim.file_path {
                blobs.put(path.clone(), PDF_BYTES.to_vec()).await;
            }
        }
        Self {
            claims: Arc::new(MemoryClaimStore::with_claims(claims)),
            blobs,
            model: Arc::new(model),
            sleeper: Arc::new(RecordingSleeper::new()),
            strategy,
        }
    }

    fn runner_with(&self, normalizer: ClaimNormalizer, claims: Arc<dyn ClaimStore>) -> JobRunner {
        self.runner_over(normalizer, claims, self.blobs.clone())
    }

    fn runner_over(
        &self,
        normalizer: ClaimNormalizer,
        claims: Arc<dyn ClaimStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> JobRunner {
        let extractor = TextExtractor::new(vec![Box::new(self.strategy.clone())]);
        let model: Arc<dyn ChatModel> = self.model.clone();
        let processor = ClaimProcessor::new(
            Arc::clone(&claims),
            blobs,
            Arc::new(extractor),
            Arc::new(normalizer),
        );
        let auditor = AuditEngine::new(claims, model, LlmConfig::default());
        JobRunner::new(processor, Arc::new(auditor), RetryPolicy::default())
            .with_sleeper(self.sleeper.clone())
    }

    fn runner(&self) -> JobRunner {
        let normalizer = ClaimNormalizer::standard(self.model.clone(), LlmConfig::default());
        self.runner_with(normalizer, self.claims.clone())
    }

    async fn claim(&self, id: &str) -> Claim {
        self.claims.get(id).await.unwrap().unwrap()
    }
}

fn queued(id: &str) -> Claim {
    Claim::new(id, format!("u1/{}.pdf", id)).with_owner("u1")
}

#[tokio::test]
async fn regex_fallback_extracts_merged_items_and_audits() {
    let harness = Harness::new(
        FlakyTextStrategy::reliable(SCENARIO_A),
        ScriptedModel::new(["Sorry, I can't help with that.", APPROVED]),
        vec![queued("c1")],
    )
    .await;

    let outcome = harness.runner().run("c1").await;
    assert_eq!(outcome, RunOutcome::Completed { attempts: 1 });

    let claim = harness.claim("c1").await;
    assert_eq!(claim.status, ClaimStatus::Completed);
    assert!(claim.error_message.is_none());
    assert!(claim.processed_at.is_some());

    let data = claim.extracted_data.unwrap();
    assert_eq!(data.raw_text, SCENARIO_A);
    let structured = data.structured_data.unwrap();
    assert_eq!(structured.claim_items, vec![ClaimItem::new("consultation", 2400.0)]);
    assert_eq!(structured.total_claimed, 2400.0);
    assert_eq!(structured.extraction_confidence, ExtractionConfidence::High);

    let audit = claim.audit_result.unwrap();
    assert_eq!(audit.verdict, Verdict::Approved);
    assert_eq!(audit.risk_score, 15);
    assert_eq!(harness.model.calls(), 2);
    assert!(harness.sleeper.waits().is_empty());
}

#[tokio::test]
async fn unreadable_document_routes_audit_to_review_without_llm() {
    let harness = Harness::new(
        FlakyTextStrategy::reliable("smudged scan with nothing recognisable"),
        ScriptedModel::unavailable(),
        vec![queued("c1")],
    )
    .await;
    let runner = harness.runner_with(ClaimNormalizer::regex_only(), harness.claims.clone());

    assert!(runner.run("c1").await.is_completed());

    let claim = harness.claim("c1").await;
    assert_eq!(claim.status, ClaimStatus::Completed);
    let structured = claim.extracted_data.unwrap().structured_data.unwrap();
    assert_eq!(structured.extraction_confidence, ExtractionConfidence::None);

    let result = runner.auditor().audit("c1", None).await;
    assert_eq!(result.verdict, Verdict::NeedsReview);
    assert_eq!(result.risk_score, 50);
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].finding_type, FindingType::MissingDocument);
    assert_eq!(harness.model.calls(), 0);
}

#[tokio::test]
async fn three_failures_then_success_completes_cleanly() {
    let strategy = FlakyTextStrategy::new(SCENARIO_A, 3);
    let attempts = strategy.call_counter();
    let harness = Harness::new(strategy, ScriptedModel::unavailable(), vec![queued("c1")]).await;

    let outcome = harness.runner().run("c1").await;
    assert_eq!(outcome, RunOutcome::Completed { attempts: 4 });
    assert_eq!(attempts.load(Ordering::SeqCst), 4);

    let claim = harness.claim("c1").await;
    assert_eq!(claim.status, ClaimStatus::Completed);
    assert!(claim.error_message.is_none());
    assert_eq!(
        harness.sleeper.waits(),
        vec![
            Duration::from_secs(5),
            Duration::from_secs(10),
            Duration::from_secs(20)
        ]
    );
}

#[tokio::test]
async fn four_failures_leave_claim_failed() {
    let harness = Harness::new(
        FlakyTextStrategy::new(SCENARIO_A, 4),
        ScriptedModel::unavailable(),
        vec![queued("c1")],
    )
    .await;

    let outcome = harness.runner().run("c1").await;
    assert!(matches!(outcome, RunOutcome::Exhausted { attempts: 4, .. }));

    let claim = harness.claim("c1").await;
    assert_eq!(claim.status, ClaimStatus::Failed);
    let message = claim.error_message.unwrap();
    assert!(message.contains("4 attempts"), "{}", message);
    assert!(claim.processed_at.is_some());
    assert!(claim.audit_result.is_none());
    assert_eq!(harness.sleeper.waits().len(), 3);
}

#[tokio::test]
async fn success_on_second_attempt_waits_once() {
    let harness = Harness::new(
        FlakyTextStrategy::new(SCENARIO_A, 1),
        ScriptedModel::unavailable(),
        vec![queued("c1")],
    )
    .await;

    let outcome = harness.runner().run("c1").await;
    assert_eq!(outcome.attempts(), 2);
    assert_eq!(harness.sleeper.waits(), vec![Duration::from_secs(5)]);
}

/// Blob store whose first `failures` downloads error out.
struct FlakyBlobStore {
    inner: Arc<MemoryBlobStore>,
    failures: usize,
    downloads: AtomicUsize,
}

impl FlakyBlobStore {
    fn new(inner: Arc<MemoryBlobStore>, failures: usize) -> Self {
        Self {
            inner,
            failures,
            downloads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let n = self.downloads.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }
        self.inner.download(path).await
    }

    async fn upload(&self, path: &str, content: &[u8]) -> Result<(), StoreError> {
        self.inner.upload(path, content).await
    }
}

#[tokio::test]
async fn download_errors_are_retried_with_backoff() {
    let harness = Harness::new(
        FlakyTextStrategy::reliable(SCENARIO_A),
        ScriptedModel::unavailable(),
        vec![queued("c1")],
    )
    .await;
    let blobs = Arc::new(FlakyBlobStore::new(harness.blobs.clone(), 2));
    let runner = harness.runner_over(
        ClaimNormalizer::regex_only(),
        harness.claims.clone(),
        blobs.clone(),
    );

    let outcome = runner.run("c1").await;
    assert_eq!(outcome, RunOutcome::Completed { attempts: 3 });
    assert_eq!(blobs.downloads.load(Ordering::SeqCst), 3);
    assert_eq!(
        harness.sleeper.waits(),
        vec![Duration::from_secs(5), Duration::from_secs(10)]
    );

    let claim = harness.claim("c1").await;
    assert_eq!(claim.status, ClaimStatus::Completed);
    assert!(claim.error_message.is_none());
    assert!(claim.extracted_data.is_some());
}

#[tokio::test]
async fn persistent_download_errors_exhaust_attempts() {
    let harness = Harness::new(
        FlakyTextStrategy::reliable(SCENARIO_A),
        ScriptedModel::unavailable(),
        vec![queued("c1")],
    )
    .await;
    let blobs = Arc::new(FlakyBlobStore::new(harness.blobs.clone(), usize::MAX));
    let runner = harness.runner_over(
        ClaimNormalizer::regex_only(),
        harness.claims.clone(),
        blobs.clone(),
    );

    let outcome = runner.run("c1").await;
    assert!(matches!(outcome, RunOutcome::Exhausted { attempts: 4, .. }));
    assert_eq!(blobs.downloads.load(Ordering::SeqCst), 4);
    assert_eq!(
        harness.sleeper.waits(),
        vec![
            Duration::from_secs(5),
            Duration::from_secs(10),
            Duration::from_secs(20)
        ]
    );

    let claim = harness.claim("c1").await;
    assert_eq!(claim.status, ClaimStatus::Failed);
    let message = claim.error_message.unwrap();
    assert!(message.starts_with("Failed after 4 attempts"), "{}", message);
    assert!(message.contains("connection reset by peer"), "{}", message);
    assert!(claim.extracted_data.is_none());
}

#[tokio::test]
async fn missing_file_path_is_not_retried() {
    let mut claim = queued("c1");
    claim.file_path = None;
    let strategy = FlakyTextStrategy::reliable(SCENARIO_A);
    let attempts = strategy.call_counter();
    let harness = Harness::new(strategy, ScriptedModel::unavailable(), vec![claim]).await;

    let outcome = harness.runner().run("c1").await;
    assert!(matches!(outcome, RunOutcome::Rejected { attempts: 1, .. }));
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
    assert!(harness.sleeper.waits().is_empty());
    assert_eq!(harness.claim("c1").await.status, ClaimStatus::Failed);
}

#[tokio::test]
async fn rejected_reprocessing_keeps_completed_claim_completed() {
    let harness = Harness::new(
        FlakyTextStrategy::reliable(SCENARIO_A),
        ScriptedModel::unavailable(),
        vec![queued("c1")],
    )
    .await;
    let runner = harness.runner_with(ClaimNormalizer::regex_only(), harness.claims.clone());
    assert!(runner.run("c1").await.is_completed());
    let completed = harness.claim("c1").await;

    // A completed claim whose document link is gone cannot be failed.
    let mut detached = completed.clone();
    detached.file_path = None;
    let store = Arc::new(MemoryClaimStore::with_claims([detached]));
    let runner = harness.runner_with(ClaimNormalizer::regex_only(), store.clone());

    let outcome = runner.run("c1").await;
    assert!(matches!(outcome, RunOutcome::Rejected { attempts: 1, .. }));
    let claim = store.get("c1").await.unwrap().unwrap();
    assert_eq!(claim.status, ClaimStatus::Completed);
    assert!(claim.error_message.is_none());
    assert_eq!(claim.extracted_data, completed.extracted_data);
}

#[tokio::test]
async fn non_pdf_blob_is_not_retried() {
    let harness = Harness::new(
        FlakyTextStrategy::reliable(SCENARIO_A),
        ScriptedModel::unavailable(),
        vec![queued("c1")],
    )
    .await;
    let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    harness.blobs.put("u1/c1.pdf", png).await;

    let outcome = harness.runner().run("c1").await;
    assert!(matches!(outcome, RunOutcome::Rejected { .. }));
    let claim = harness.claim("c1").await;
    assert!(claim.error_message.unwrap().contains("image/png"));
}

#[tokio::test]
async fn sweep_processes_queued_claims_in_order() {
    let mut done = queued("done");
    done.status = ClaimStatus::Completed;
    let mut detached = queued("detached");
    detached.file_path = None;
    let harness = Harness::new(
        FlakyTextStrategy::reliable(SCENARIO_A),
        ScriptedModel::unavailable(),
        vec![queued("a"), done, detached, queued("b")],
    )
    .await;
    let claims: Arc<dyn ClaimStore> = harness.claims.clone();
    let runner = Arc::new(harness.runner());

    let report = BatchSweeper::new(claims, runner).sweep().await.unwrap();

    assert_eq!(report.found, 3);
    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_ids, vec!["detached".to_string()]);
    assert_eq!(harness.claim("a").await.status, ClaimStatus::Completed);
    assert_eq!(harness.claim("b").await.status, ClaimStatus::Completed);
    assert_eq!(harness.claim("done").await.extracted_data, None);
}

#[tokio::test]
async fn dispatcher_reports_every_claim() {
    let harness = Harness::new(
        FlakyTextStrategy::reliable(SCENARIO_A),
        ScriptedModel::unavailable(),
        vec![queued("a"), queued("b"), queued("c")],
    )
    .await;
    let claims: Arc<dyn ClaimStore> = harness.claims.clone();
    let (dispatcher, mut outcomes) = ClaimDispatcher::new(Arc::new(harness.runner()), claims, 2);

    for id in ["a", "b", "c"] {
        dispatcher.submit(id);
    }
    drop(dispatcher);

    let mut seen = Vec::new();
    while let Some(outcome) = outcomes.recv().await {
        assert!(outcome.result.unwrap().is_completed());
        seen.push(outcome.claim_id);
    }
    seen.sort();
    assert_eq!(seen, vec!["a", "b", "c"]);
}

/// Claim store whose reads panic for one claim id.
struct PanickyStore {
    inner: Arc<MemoryClaimStore>,
    poisoned_id: &'static str,
}

#[async_trait]
impl ClaimStore for PanickyStore {
    async fn get(&self, claim_id: &str) -> Result<Option<Claim>, StoreError> {
        if claim_id == self.poisoned_id {
            panic!("corrupt record {}", claim_id);
        }
        self.inner.get(claim_id).await
    }

    async fn update(&self, claim_id: &str, patch: ClaimPatch) -> Result<(), StoreError> {
        self.inner.update(claim_id, patch).await
    }

    async fn find(&self, status: ClaimStatus) -> Result<Vec<String>, StoreError> {
        self.inner.find(status).await
    }

    async fn insert(&self, claim: Claim) -> Result<(), StoreError> {
        self.inner.insert(claim).await
    }

    async fn list_by_owner(&self, user_id: &str) -> Result<Vec<Claim>, StoreError> {
        self.inner.list_by_owner(user_id).await
    }
}

#[tokio::test]
async fn panicking_claim_is_dead_lettered_and_failed() {
    let harness = Harness::new(
        FlakyTextStrategy::reliable(SCENARIO_A),
        ScriptedModel::unavailable(),
        vec![queued("ok"), queued("boom")],
    )
    .await;
    let store: Arc<dyn ClaimStore> = Arc::new(PanickyStore {
        inner: harness.claims.clone(),
        poisoned_id: "boom",
    });
    let runner = harness.runner_with(ClaimNormalizer::regex_only(), Arc::clone(&store));
    let (dispatcher, mut outcomes) = ClaimDispatcher::new(Arc::new(runner), store, 4);
    let dead_letters = Arc::clone(dispatcher.dead_letters());

    let handles = vec![dispatcher.submit("ok"), dispatcher.submit("boom")];
    for handle in handles {
        handle.await.unwrap();
    }
    drop(dispatcher);

    let mut results = Vec::new();
    while let Some(outcome) = outcomes.recv().await {
        results.push(outcome);
    }
    assert_eq!(results.len(), 2);
    let boom = results.iter().find(|o| o.claim_id == "boom").unwrap();
    assert!(boom.result.as_ref().unwrap_err().contains("corrupt record boom"));

    let letters = dead_letters.entries();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].claim_id, "boom");

    assert_eq!(harness.claim("ok").await.status, ClaimStatus::Completed);
    let failed = harness.claim("boom").await;
    assert_eq!(failed.status, ClaimStatus::Failed);
    assert!(failed.error_message.unwrap().contains("panicked"));
}
