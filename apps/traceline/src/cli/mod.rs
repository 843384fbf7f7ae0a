//! # Traceline CLI Module
//!
//! ## Available Commands
//!
//! - `serve` - Start the HTTP server
//! - `status` - Show store status and sync standing
//! - `init` - Initialize a new database
//! - `pipelines` - List pipelines
//! - `executions` - List executions of a pipeline
//! - `artifacts` - List artifacts touched by a pipeline
//! - `push` - Push a pipeline to the central server
//! - `pull` - Pull a pipeline from the central server

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::execute;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Traceline - metadata lineage store and synchronization engine.
///
/// Records pipelines, executions, and content-addressed artifacts, and
/// synchronizes them with a central store.
#[derive(Parser, Debug)]
#[command(name = "traceline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a config file (default: ./traceline.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the lineage database (overrides config)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

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
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show store status and per-pipeline sync standing
    Status,

    /// Initialize a new database
    Init,

    /// List pipelines
    Pipelines,

    /// List executions of a pipeline
    Executions {
        /// Pipeline name
        pipeline: String,

        /// 1-based page number
        #[arg(long, default_value = "1")]
        page: usize,

        /// Rows per page (0 selects the default)
        #[arg(long, default_value = "0")]
        page_size: usize,

        /// Only executions of this stage
        #[arg(long)]
        stage: Option<String>,
    },

    /// List artifacts touched by a pipeline
    Artifacts {
        /// Pipeline name
        pipeline: String,

        /// 1-based page number
        #[arg(long, default_value = "1")]
        page: usize,

        /// Rows per page (0 selects the default)
        #[arg(long, default_value = "0")]
        page_size: usize,

        /// Only artifacts whose path contains this substring
        #[arg(long)]
        path: Option<String>,
    },

    /// Push a pipeline to the central server
    Push {
        /// Pipeline name
        pipeline: String,

        /// Central server base URL (overrides config)
        #[arg(long)]
        central: Option<String>,
    },

    /// Pull a pipeline from the central server
    Pull {
        /// Pipeline name
        pipeline: String,

        /// Central server base URL (overrides config)
        #[arg(long)]
        central: Option<String>,

        /// Only pull one execution, addressed by origin id ("origin-seq")
        #[arg(short, long)]
        execution: Option<String>,
    },
}
