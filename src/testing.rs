//! Deterministic stand-ins for the external capabilities, used by unit and
//! integration tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{ChatModel, ChatRequest, LlmError};
use crate::models::ExtractionMethod;
use crate::ocr::{ExtractionError, PageTexts, TextStrategy};
use crate::pipeline::Sleeper;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Chat model that replays canned responses in order.
///
/// Every request is recorded. Once the script runs out, calls fail with a
/// connection error, so [`ScriptedModel::unavailable`] is simply an empty
/// script.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A model whose every call fails.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        lock(&self.requests).push(request.clone());
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| LlmError::Connection("scripted model has no response".to_string()))
    }
}

/// Records requested waits instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        lock(&self.waits).clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.waits).push(duration);
    }
}

/// Text strategy that fails a fixed number of times, then returns `text`.
///
/// Failures are reported as extraction errors, so with no other strategy in
/// the chain the extractor yields an unsuccessful result.
#[derive(Debug, Clone)]
pub struct FlakyTextStrategy {
    text: String,
    failures: usize,
    calls: Arc<AtomicUsize>,
}

impl FlakyTextStrategy {
    pub fn new(text: impl Into<String>, failures: usize) -> Self {
        Self {
            text: text.into(),
            failures,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always succeeds.
    pub fn reliable(text: impl Into<String>) -> Self {
        Self::new(text, 0)
    }

    /// Shared counter of attempts made so far.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl TextStrategy for FlakyTextStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Native
    }

    fn attempt(&self, _pdf_path: &Path) -> Result<PageTexts, ExtractionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(ExtractionError::ExtractionFailed(format!(
                "simulated failure {}",
                call + 1
            )));
        }
        Ok(PageTexts::new(vec![self.text.clone()]))
    }
}

/// Minimal bytes that identify as a PDF.
pub const PDF_BYTES: &[u8] = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n1 0 obj\n<< >>\nendobj\ntrailer\n<< >>\n%%EOF\n";
