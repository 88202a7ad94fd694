//! # Theorist CLI Module
//!
//! This module implements the CLI interface for Theorist.
//!
//! ## Available Commands
//!
//! - `inspect` - Summarize a saved state stream
//! - `verify` - Load a stream and check it re-saves bit-exactly
//! - `config` - Show the validated pipeline configuration
//! - `store-list` - List checkpoints in the state database
//! - `store-put` - Store a state stream as a checkpoint
//! - `store-get` - Write a checkpoint back out to a file
//! - `store-remove` - Delete a checkpoint

mod commands;

use crate::config::AppConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use theorist_core::TheoristError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Theorist - sentence hypothesis management
///
/// Inspects, verifies and stores the beams of competing sentence analyses
/// saved by a Theorist pipeline.
#[derive(Parser, Debug)]
#[command(name = "theorist")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the checkpoint database (overrides the configuration)
    #[arg(short = 'S', long, global = true)]
    pub state: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarize a saved state stream
    Inspect {
        /// State stream file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Load a state stream and check it re-saves bit-exactly
    Verify {
        /// State stream file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show the validated pipeline configuration
    Config,

    /// List checkpoints in the state database
    StoreList {
        /// Only show checkpoints of this document
        #[arg(short, long)]
        doc: Option<String>,
    },

    /// Store a state stream file as a checkpoint
    StorePut {
        /// State stream file
        #[arg(short, long)]
        file: PathBuf,

        /// Document id
        #[arg(short, long)]
        doc: String,

        /// Stage whose output the stream holds
        #[arg(short = 't', long)]
        stage: String,

        /// Sentence index (omit for a whole document)
        #[arg(short = 'n', long)]
        sentence: Option<u32>,
    },

    /// Write a checkpoint out to a file
    StoreGet {
        /// Document id
        #[arg(short, long)]
        doc: String,

        /// Stage whose output the stream holds
        #[arg(short = 't', long)]
        stage: String,

        /// Sentence index (omit for a whole document)
        #[arg(short = 'n', long)]
        sentence: Option<u32>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Delete a checkpoint
    StoreRemove {
        /// Document id
        #[arg(short, long)]
        doc: String,

        /// Stage whose output the stream holds
        #[arg(short = 't', long)]
        stage: String,

        /// Sentence index (omit for a whole document)
        #[arg(short = 'n', long)]
        sentence: Option<u32>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), TheoristError> {
    let config = AppConfig::load_or_default(cli.config.as_deref())?;
    let state_path = cli.state.clone().unwrap_or_else(|| config.store.path.clone());
    let json_mode = cli.json_mode;

    if cli.verbose {
        tracing::info!(state = %state_path.display(), "using checkpoint database");
    }

    match cli.command {
        Some(Commands::Inspect { file }) => cmd_inspect(&file, json_mode),
        Some(Commands::Verify { file }) => cmd_verify(&file, json_mode),
        Some(Commands::Config) | None => cmd_config(&config, json_mode),
        Some(Commands::StoreList { doc }) => cmd_store_list(&state_path, doc.as_deref(), json_mode),
        Some(Commands::StorePut {
            file,
            doc,
            stage,
            sentence,
        }) => {
            let key = parse_key(doc, &stage, sentence)?;
            cmd_store_put(&state_path, &key, &file, json_mode)
        }
        Some(Commands::StoreGet {
            doc,
            stage,
            sentence,
            output,
        }) => {
            let key = parse_key(doc, &stage, sentence)?;
            cmd_store_get(&state_path, &key, &output, json_mode)
        }
        Some(Commands::StoreRemove {
            doc,
            stage,
            sentence,
        }) => {
            let key = parse_key(doc, &stage, sentence)?;
            cmd_store_remove(&state_path, &key, json_mode)
        }
    }
}
