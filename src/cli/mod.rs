//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod claims;
mod helpers;
mod tools;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings, LoadOptions};

#[derive(Parser)]
#[command(name = "claims")]
#[command(about = "Insurance claim document extraction and audit")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to ./claimaudit.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding claims, blobs and policies (overrides config)
    #[arg(long, global = true, env = "CLAIM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a claim PDF, creating a queued claim
    Submit {
        /// PDF file to submit
        file: PathBuf,
        /// Submitting user id
        #[arg(short, long)]
        user: String,
        /// Policy id whose wording is attached to the claim
        #[arg(short, long)]
        policy: Option<String>,
        /// Process the claim immediately after submitting
        #[arg(long)]
        process: bool,
    },

    /// Process one or more claims in the background worker pool
    Process {
        /// Claim ids to process
        #[arg(required = true)]
        claim_ids: Vec<String>,
    },

    /// Process every queued claim, one at a time
    Sweep,

    /// Run the audit for a processed claim
    Audit {
        /// Claim id to audit
        claim_id: String,
        /// Policy wording to audit against instead of the claim's own
        #[arg(long)]
        policy_file: Option<PathBuf>,
    },

    /// Show a claim record as JSON
    Show {
        /// Claim id
        claim_id: String,
    },

    /// List a user's claims, newest first
    List {
        /// User id
        #[arg(short, long)]
        user: String,
    },

    /// Extract and normalize a local PDF without storing anything
    Extract {
        /// PDF file to read
        file: PathBuf,
    },

    /// Check external tools and LLM availability
    Check,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data_dir: cli.data_dir,
    };
    let settings = load_settings(&options)?;

    match cli.command {
        Commands::Submit {
            file,
            user,
            policy,
            process,
        } => claims::cmd_submit(&settings, &file, &user, policy, process).await,
        Commands::Process { claim_ids } => claims::cmd_process(&settings, claim_ids).await,
        Commands::Sweep => claims::cmd_sweep(&settings).await,
        Commands::Audit {
            claim_id,
            policy_file,
        } => claims::cmd_audit(&settings, &claim_id, policy_file.as_deref()).await,
        Commands::Show { claim_id } => claims::cmd_show(&settings, &claim_id).await,
        Commands::List { user } => claims::cmd_list(&settings, &user).await,
        Commands::Extract { file } => tools::cmd_extract(&settings, &file).await,
        Commands::Check => tools::cmd_check(&settings).await,
    }
}
