//! Prompts for claim extraction and audit.

/// Prompt for pulling structured fields out of claim text. Uses `{content}`.
pub const EXTRACTION_PROMPT: &str = r#"You are extracting data from an Indian health insurance claim document.

DOCUMENT TEXT:
{content}

Respond with ONLY valid JSON in exactly this shape. No markdown, no commentary:
{
  "hospital_name": "string or null",
  "patient_name": "string or null",
  "claim_items": [
    {"description": "string", "amount": number}
  ],
  "total_claimed": number,
  "diagnosis": "string or null",
  "admission_date": "YYYY-MM-DD or null",
  "discharge_date": "YYYY-MM-DD or null",
  "policy_number": "string or null"
}

Use null for anything the document does not contain. Amounts are in INR (₹) as plain numbers."#;

/// Prompt for auditing a claim against policy wording. Uses `{claim_json}`
/// and `{policy_context}`.
pub const AUDIT_PROMPT: &str = r#"You are auditing an Indian health insurance claim.

CLAIM DATA:
{claim_json}

POLICY CONTEXT:
{policy_context}

Assess the claim and respond with ONLY valid JSON in exactly this shape:
{
  "verdict": "APPROVED" | "PARTIALLY_APPROVED" | "REJECTED" | "NEEDS_REVIEW",
  "risk_score": integer 0-100 (0 = lowest risk),
  "findings": [
    {
      "type": "exclusion" | "waiting_period" | "missing_document" | "policy_limit" | "pre_existing" | "other",
      "severity": "high" | "medium" | "low",
      "description": "plain English explanation"
    }
  ],
  "explanation": "two or three sentence summary the patient can understand",
  "confidence": number 0.0-1.0
}

Check for common exclusions (cosmetic procedures, pre-existing conditions), sub-limits and caps, waiting periods, IRDAI rules, and missing information."#;

/// Policy context used when no usable policy wording is available.
pub const GENERIC_POLICY_CONTEXT: &str =
    "No specific policy provided. Use general Indian health insurance guidelines.";
