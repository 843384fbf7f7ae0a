//! # CLI Command Implementations

use super::{Cli, Commands};
use crate::api;
use crate::client::{SyncClient, pull_execution, pull_pipeline, push_pipeline};
use crate::config::Config;
use std::path::Path;
use traceline_core::{
    ArtifactFilter, ArtifactFilterField, ArtifactSortField, ExecutionFilter, FilterField,
    LineageError, NodeId, Session, SortField, SortOrder, StoreId, list_artifacts, list_executions,
    list_pipelines,
};

/// Dispatch a parsed command line. A bare invocation shows status.
pub async fn execute(cli: Cli) -> Result<(), LineageError> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let database = cli.database.as_deref();

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            cmd_serve(&config, database, host.as_deref(), port).await
        }
        Some(Commands::Status) | None => cmd_status(&config, database, cli.json_mode),
        Some(Commands::Init) => cmd_init(&config, database),
        Some(Commands::Pipelines) => cmd_pipelines(&config, database, cli.json_mode),
        Some(Commands::Executions {
            pipeline,
            page,
            page_size,
            stage,
        }) => cmd_executions(
            &config,
            database,
            cli.json_mode,
            &pipeline,
            page,
            page_size,
            stage.as_deref(),
        ),
        Some(Commands::Artifacts {
            pipeline,
            page,
            page_size,
            path,
        }) => cmd_artifacts(
            &config,
            database,
            cli.json_mode,
            &pipeline,
            page,
            page_size,
            path.as_deref(),
        ),
        Some(Commands::Push { pipeline, central }) => {
            cmd_push(&config, database, &pipeline, central.as_deref()).await
        }
        Some(Commands::Pull {
            pipeline,
            central,
            execution,
        }) => {
            cmd_pull(
                &config,
                database,
                &pipeline,
                central.as_deref(),
                execution.as_deref(),
            )
            .await
        }
    }
}

/// Open the session the config (plus CLI override) selects.
fn open_session(config: &Config, database: Option<&Path>) -> Result<Session, LineageError> {
    let store = StoreId(config.store_id);
    match database.or(config.database.as_deref()) {
        Some(path) => Session::open(path, store),
        None => Ok(Session::in_memory(store)),
    }
}

fn central_client(config: &Config, central: Option<&str>) -> Result<SyncClient, LineageError> {
    let url = central
        .map(str::to_string)
        .or_else(|| config.central_url.clone())
        .ok_or_else(|| {
            LineageError::InvalidInput(
                "no central server configured: pass --central or set central_url".to_string(),
            )
        })?;
    Ok(SyncClient::new(url))
}

// =============================================================================
// SERVE COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_serve(
    config: &Config,
    database: Option<&Path>,
    host: Option<&str>,
    port: Option<u16>,
) -> Result<(), LineageError> {
    let session = open_session(config, database)?;
    let host = host.unwrap_or(&config.host);
    let port = port.unwrap_or(config.port);

    println!("Traceline Lineage Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Store:    {}", session.store_id());
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    match database.or(config.database.as_deref()) {
        Some(path) => println!("  Database: {}", path.display()),
        None => println!("  Database: in-memory"),
    }
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, session).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show store status and sync standing.
pub fn cmd_status(
    config: &Config,
    database: Option<&Path>,
    json_mode: bool,
) -> Result<(), LineageError> {
    let session = open_session(config, database)?;
    let graph = session.graph();

    if json_mode {
        let pipelines: Vec<_> = list_pipelines(graph)
            .map(|name| {
                serde_json::json!({
                    "name": name,
                    "sync_status": session.sync_status(name),
                })
            })
            .collect();
        let output = serde_json::json!({
            "store": graph.store_id().0,
            "pipelines": pipelines,
            "pipeline_count": graph.pipeline_count(),
            "execution_count": graph.execution_count(),
            "artifact_count": graph.artifact_count(),
            "event_count": graph.event_count(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Traceline Store Status");
    println!("======================");
    println!("Store:      {}", graph.store_id());
    println!("Pipelines:  {}", graph.pipeline_count());
    println!("Executions: {}", graph.execution_count());
    println!("Artifacts:  {}", graph.artifact_count());
    println!("Events:     {}", graph.event_count());
    println!();
    for name in list_pipelines(graph) {
        println!("  {:<30} {:?}", name, session.sync_status(name));
    }

    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(config: &Config, database: Option<&Path>) -> Result<(), LineageError> {
    let Some(path) = database.or(config.database.as_deref()) else {
        return Err(LineageError::InvalidInput(
            "cannot init an in-memory store: configure a database path".to_string(),
        ));
    };
    if path.exists() {
        return Err(LineageError::Io(format!(
            "database '{}' already exists",
            path.display()
        )));
    }
    let session = Session::open(path, StoreId(config.store_id))?;
    println!(
        "Initialized store {} at {}",
        session.store_id(),
        path.display()
    );
    Ok(())
}

// =============================================================================
// QUERY COMMANDS
// =============================================================================

/// List pipelines.
pub fn cmd_pipelines(
    config: &Config,
    database: Option<&Path>,
    json_mode: bool,
) -> Result<(), LineageError> {
    let session = open_session(config, database)?;
    let names: Vec<&str> = list_pipelines(session.graph()).collect();

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&names).unwrap_or_default()
        );
    } else if names.is_empty() {
        println!("No pipelines recorded.");
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(())
}

/// List executions of a pipeline.
pub fn cmd_executions(
    config: &Config,
    database: Option<&Path>,
    json_mode: bool,
    pipeline: &str,
    page: usize,
    page_size: usize,
    stage: Option<&str>,
) -> Result<(), LineageError> {
    let session = open_session(config, database)?;
    let filter = stage.map(|value| ExecutionFilter {
        field: FilterField::Stage,
        value: value.to_string(),
    });
    let result = list_executions(
        session.graph(),
        pipeline,
        page,
        page_size,
        filter.as_ref(),
        SortField::StartedAt,
        SortOrder::Asc,
    )?;

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).unwrap_or_default()
        );
        return Ok(());
    }

    println!(
        "{} execution(s) in '{}' (showing page {page}):",
        result.total_items, pipeline
    );
    for row in &result.items {
        println!(
            "  {:<12} {:<16} {:<20} started {}",
            row.id.to_string(),
            row.stage,
            row.tool,
            row.started_ms
        );
    }
    Ok(())
}

/// List artifacts touched by a pipeline.
pub fn cmd_artifacts(
    config: &Config,
    database: Option<&Path>,
    json_mode: bool,
    pipeline: &str,
    page: usize,
    page_size: usize,
    path: Option<&str>,
) -> Result<(), LineageError> {
    let session = open_session(config, database)?;
    let filter = path.map(|value| ArtifactFilter {
        field: ArtifactFilterField::Path,
        value: value.to_string(),
    });
    let result = list_artifacts(
        session.graph(),
        pipeline,
        page,
        page_size,
        filter.as_ref(),
        ArtifactSortField::Path,
        SortOrder::Asc,
    )?;

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).unwrap_or_default()
        );
        return Ok(());
    }

    println!(
        "{} artifact(s) in '{}' (showing page {page}):",
        result.total_items, pipeline
    );
    for row in &result.items {
        println!(
            "  {:<12} {:<12} {:<40} {}",
            row.id.to_string(),
            row.kind.as_str(),
            row.path,
            row.hash
        );
    }
    Ok(())
}

// =============================================================================
// SYNC COMMANDS
// =============================================================================

/// Push a pipeline to the central server.
pub async fn cmd_push(
    config: &Config,
    database: Option<&Path>,
    pipeline: &str,
    central: Option<&str>,
) -> Result<(), LineageError> {
    let mut session = open_session(config, database)?;
    let client = central_client(config, central)?;

    match push_pipeline(&mut session, &client, pipeline).await? {
        Some(report) => {
            println!(
                "Pushed '{}': {} created, {} skipped, {} conflict(s) resolved",
                pipeline,
                report.created(),
                report.executions_skipped + report.events_collapsed,
                report.property_conflicts
            );
        }
        None => println!("'{pipeline}' is already clean, nothing to push"),
    }
    Ok(())
}

/// Pull a pipeline (or one execution of it) from the central server.
pub async fn cmd_pull(
    config: &Config,
    database: Option<&Path>,
    pipeline: &str,
    central: Option<&str>,
    execution: Option<&str>,
) -> Result<(), LineageError> {
    let mut session = open_session(config, database)?;
    let client = central_client(config, central)?;

    let (what, report) = match execution {
        Some(raw) => {
            let id: NodeId = raw.parse()?;
            let report = pull_execution(&mut session, &client, pipeline, id).await?;
            (format!("execution {id} of '{pipeline}'"), report)
        }
        None => {
            let report = pull_pipeline(&mut session, &client, pipeline).await?;
            (format!("'{pipeline}'"), report)
        }
    };
    println!(
        "Pulled {}: {} created, {} conflict(s) resolved",
        what,
        report.created(),
        report.property_conflicts
    );
    Ok(())
}
