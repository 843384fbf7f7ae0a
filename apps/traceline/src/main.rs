//! # Traceline - Metadata Lineage Server
//!
//! The main binary for the Traceline lineage store.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for recording, query, and synchronization
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! traceline serve --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! traceline status
//! traceline executions training-pipeline --stage train
//! traceline push training-pipeline --central http://central:8080
//! ```

use clap::Parser;
use traceline::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing — TRACELINE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("TRACELINE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "traceline=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Display startup banner
    if !cli.quiet {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Traceline startup banner.
fn print_banner() {
    println!(
        r#"
  ████████╗██████╗  █████╗  ██████╗███████╗██╗     ██╗███╗   ██╗███████╗
  ╚══██╔══╝██╔══██╗██╔══██╗██╔════╝██╔════╝██║     ██║████╗  ██║██╔════╝
     ██║   ██████╔╝███████║██║     █████╗  ██║     ██║██╔██╗ ██║█████╗
     ██║   ██╔══██╗██╔══██║██║     ██╔══╝  ██║     ██║██║╚██╗██║██╔══╝
     ██║   ██║  ██║██║  ██║╚██████╗███████╗███████╗██║██║ ╚████║███████╗
     ╚═╝   ╚═╝  ╚═╝╚═╝  ╚═╝ ╚═════╝╚══════╝╚══════╝╚═╝╚═╝  ╚═══╝╚══════╝

  Metadata Lineage Store v{}

  Content-Addressed • Idempotent • Convergent
"#,
        env!("CARGO_PKG_VERSION")
    );
}
