//! # Theorist
//!
//! The command-line front end for the Theorist hypothesis engine.
//!
//! This application provides:
//! - State stream inspection and bit-exact verification
//! - Pipeline configuration validation (TOML)
//! - Checkpoint store management (redb)
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │            apps/theorist (THE BINARY)         │
//! │                                               │
//! │   ┌─────────────┐        ┌────────────────┐   │
//! │   │    CLI      │        │  config (TOML) │   │
//! │   │   (clap)    │        │                │   │
//! │   └──────┬──────┘        └───────┬────────┘   │
//! │          └───────────┬───────────┘            │
//! │                      ▼                        │
//! │             ┌─────────────────┐               │
//! │             │  theorist-core  │               │
//! │             │   (THE LOGIC)   │               │
//! │             └─────────────────┘               │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! theorist config -c pipeline.toml
//! theorist inspect -f doc-0042.state
//! theorist store-put -f doc-0042.state -d doc-0042 -t parse
//! theorist store-list -d doc-0042
//! ```

use clap::Parser;
use theorist::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // THEORIST_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("THEORIST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "theorist=info,theorist_core=info".into());

    // Logs go to stderr so JSON command output stays parseable.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Theorist startup banner.
fn print_banner() {
    println!(
        r#"
  Theorist v{}

  Competing analyses, kept honest
"#,
        env!("CARGO_PKG_VERSION")
    );
}
