//! Data models for claims and their processing results.

mod audit;
mod claim;
mod extraction;

pub use audit::{AuditResult, Finding, FindingType, Severity, Verdict};
pub use claim::{Claim, ClaimPatch, ClaimStatus};
pub use extraction::{
    merge_claim_items, parse_amount_text, ClaimItem, ExtractedData, ExtractionConfidence,
    ExtractionMethod, ExtractionResult, StructuredClaimData,
};
