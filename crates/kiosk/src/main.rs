// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Kiosk - a conversational commerce agent for Telegram.
//!
//! Binary entry point: `kiosk serve` runs the agent, `kiosk index` builds
//! a catalog version from an uploaded file.

mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Kiosk - a conversational commerce agent.
#[derive(Parser, Debug)]
#[command(name = "kiosk", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the agent: HTTP gateway, Telegram polling, background workers.
    Serve,
    /// Build and activate a catalog index version from a tabular file.
    Index {
        /// Path to the catalog file.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve => serve::run_serve().await,
        Commands::Index { file } => serve::run_index(&file).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
