//! Claim commands: submit, process, sweep, audit, show, list.

use std::path::Path;
use std::sync::Arc;

use console::style;

use super::helpers::{print_audit, print_claim_line, App};
use crate::config::Settings;
use crate::intake::Submission;
use crate::pipeline::{BatchSweeper, ClaimDispatcher, RunOutcome};

/// Submit a PDF and optionally process it straight away.
pub async fn cmd_submit(
    settings: &Settings,
    file: &Path,
    user: &str,
    policy: Option<String>,
    process: bool,
) -> anyhow::Result<()> {
    let app = App::open(settings)?;
    let content = tokio::fs::read(file).await?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "claim.pdf".to_string());

    let mut submission = Submission::new(user, file_name, content);
    if let Some(policy_id) = policy {
        submission = submission.with_policy(policy_id);
    }
    let claim = app.intake(settings).submit(submission).await?;
    println!("{} Submitted claim {}", style("✓").green(), claim.id);

    if process {
        let outcome = app.runner(settings).run(&claim.id).await;
        report_outcome(&claim.id, &outcome);
    }
    Ok(())
}

/// Process claims concurrently through the dispatcher.
pub async fn cmd_process(settings: &Settings, claim_ids: Vec<String>) -> anyhow::Result<()> {
    let app = App::open(settings)?;
    let runner = Arc::new(app.runner(settings));
    let (dispatcher, mut outcomes) = ClaimDispatcher::new(
        runner,
        Arc::clone(&app.claims),
        settings.worker.max_in_flight,
    );

    let handles: Vec<_> = claim_ids.iter().map(|id| dispatcher.submit(id.clone())).collect();
    futures::future::join_all(handles).await;
    drop(dispatcher);

    let mut failed = 0;
    while let Some(outcome) = outcomes.recv().await {
        match outcome.result {
            Ok(run) => {
                if !run.is_completed() {
                    failed += 1;
                }
                report_outcome(&outcome.claim_id, &run);
            }
            Err(e) => {
                failed += 1;
                println!("{} {}: {}", style("✗").red(), outcome.claim_id, e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} claims failed", failed, claim_ids.len());
    }
    Ok(())
}

/// Process every queued claim.
pub async fn cmd_sweep(settings: &Settings) -> anyhow::Result<()> {
    let app = App::open(settings)?;
    let sweeper = BatchSweeper::new(Arc::clone(&app.claims), Arc::new(app.runner(settings)));
    let report = sweeper.sweep().await?;

    println!(
        "{} Swept {} queued claims: {} completed, {} failed",
        style("✓").green(),
        report.found,
        report.completed,
        report.failed
    );
    for id in &report.failed_ids {
        println!("  {} {}", style("✗").red(), id);
    }
    Ok(())
}

pub async fn cmd_audit(
    settings: &Settings,
    claim_id: &str,
    policy_file: Option<&Path>,
) -> anyhow::Result<()> {
    let app = App::open(settings)?;
    let policy_text = match policy_file {
        Some(path) => Some(tokio::fs::read_to_string(path).await?),
        None => None,
    };

    let result = app
        .auditor(settings)
        .audit(claim_id, policy_text.as_deref())
        .await;
    print_audit(&result);
    Ok(())
}

pub async fn cmd_show(settings: &Settings, claim_id: &str) -> anyhow::Result<()> {
    let app = App::open(settings)?;
    let claim = app
        .claims
        .get(claim_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Claim not found: {}", claim_id))?;
    println!("{}", serde_json::to_string_pretty(&claim)?);
    Ok(())
}

pub async fn cmd_list(settings: &Settings, user: &str) -> anyhow::Result<()> {
    let app = App::open(settings)?;
    let claims = app.claims.list_by_owner(user).await?;
    if claims.is_empty() {
        println!("{} No claims for {}", style("!").yellow(), user);
        return Ok(());
    }
    println!("\n{} ({})", style("Claims").bold(), claims.len());
    for claim in &claims {
        print_claim_line(claim);
    }
    Ok(())
}

fn report_outcome(claim_id: &str, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed { attempts } => println!(
            "{} Claim {} completed ({} attempt{})",
            style("✓").green(),
            claim_id,
            attempts,
            if *attempts == 1 { "" } else { "s" }
        ),
        RunOutcome::Exhausted { error, .. } | RunOutcome::Rejected { error, .. } => {
            println!("{} Claim {} failed: {}", style("✗").red(), claim_id, error)
        }
    }
}
