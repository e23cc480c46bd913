//! Local extraction and environment checks.

use std::path::Path;
use std::sync::Arc;

use console::style;
use serde_json::json;

use super::helpers::extractor;
use crate::config::Settings;
use crate::llm::LlmClient;
use crate::normalize::ClaimNormalizer;
use crate::ocr::{check_tools, REQUIRED_TOOLS};

/// Run extraction and normalization on a local PDF and print the result.
pub async fn cmd_extract(settings: &Settings, file: &Path) -> anyhow::Result<()> {
    let content = tokio::fs::read(file).await?;

    let extraction = Arc::new(extractor(settings)).extract_bytes(content).await;
    let structured = if extraction.success {
        let model = Arc::new(LlmClient::new(settings.llm.clone())?);
        let normalizer = ClaimNormalizer::standard(model, settings.llm.clone());
        Some(normalizer.normalize(&extraction.raw_text).await)
    } else {
        None
    };

    let output = json!({
        "page_count": extraction.page_count,
        "extraction_method": extraction.extraction_method,
        "success": extraction.success,
        "error": extraction.error,
        "structured_data": structured,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Report external tool and LLM availability.
pub async fn cmd_check(settings: &Settings) -> anyhow::Result<()> {
    println!("\n{}", style("Extraction Tools").bold());
    println!("{}", "-".repeat(50));

    let mut all_found = true;
    for (tool, available) in check_tools() {
        let status = if available {
            style("✓ found").green()
        } else {
            all_found = false;
            style("✗ not found").red()
        };
        println!("  {:<15} {}", tool, status);
        if !available {
            if let Some((_, package)) = REQUIRED_TOOLS.iter().find(|(name, _)| *name == tool) {
                println!("                  {}", style(format!("install {}", package)).dim());
            }
        }
    }

    println!("\n{}", style("LLM").bold());
    println!("{}", "-".repeat(50));
    let llm = &settings.llm;
    println!("  {:<15} {}", "provider", llm.provider.as_str());
    println!("  {:<15} {}", "endpoint", llm.endpoint);
    println!("  {:<15} {}", "extraction", llm.extraction_model);
    println!("  {:<15} {}", "audit", llm.audit_model);

    let llm_status = if !llm.enabled {
        style("disabled".to_string()).yellow()
    } else if LlmClient::new(llm.clone())?.is_available().await {
        style("✓ reachable".to_string()).green()
    } else {
        style("✗ unreachable".to_string()).red()
    };
    println!("  {:<15} {}", "status", llm_status);

    if !all_found {
        println!(
            "\n{} Scanned claims need the missing tools for OCR fallback",
            style("!").yellow()
        );
    }
    Ok(())
}
