//! claimaudit - insurance claim document intelligence.
//!
//! Turns claim PDFs into structured claim data and an audit verdict:
//! text extraction (embedded text layer, then OCR), field normalization
//! (LLM, then regex patterns), and an LLM audit against policy wording,
//! driven by a retrying job runner.

pub mod audit;
pub mod cli;
pub mod config;
pub mod intake;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod ocr;
pub mod pipeline;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
