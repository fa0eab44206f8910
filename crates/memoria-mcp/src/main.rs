//! Memoria MCP Server
//!
//! A Rust MCP (Model Context Protocol) server that gives an LLM assistant a per-project,
//! long-running memory store: content-addressed dedup, hybrid vector/keyword search, adaptive
//! thresholds, consolidation, and hot-path prediction, all scoped to a single project directory
//! resolved at startup.

mod protocol;
mod resources;
mod server;
mod state;
mod tools;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use memoria_core::{
    Config, ConnectionPool, DrilldownRegistry, EmbeddingClient, EmbeddingQueue, HotPathManager,
    ProjectContext, SchemaManager, SearchEngine,
};

use crate::protocol::stdio::StdioTransport;
use crate::server::McpServer;
use crate::state::AppState;

struct Args {
    project_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
}

/// Parse command-line arguments. Exits the process for `--help`/`--version` or a bad flag.
fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut project_path: Option<PathBuf> = None;
    let mut data_dir: Option<PathBuf> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("Memoria MCP Server v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Per-project long-running memory server using the Model Context Protocol.");
                println!();
                println!("USAGE:");
                println!("    memoria-mcp [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help                  Print help information");
                println!("    -V, --version                Print version information");
                println!("    --project-path <PATH>       Project to scope memories to (defaults to cwd)");
                println!("    --data-dir <PATH>            Directory for schema databases and indexes");
                println!();
                println!("ENVIRONMENT:");
                println!("    RUST_LOG                    Log level filter (e.g., debug, info, warn, error)");
                println!("    MEMORIA_*                   Overrides any Config field (see config.rs)");
                println!();
                println!("EXAMPLES:");
                println!("    memoria-mcp");
                println!("    memoria-mcp --project-path /work/my-app --data-dir /var/lib/memoria");
                println!("    RUST_LOG=debug memoria-mcp");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("memoria-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--project-path" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --project-path requires a path argument");
                    std::process::exit(1);
                }
                project_path = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with("--project-path=") => {
                let path = arg.strip_prefix("--project-path=").unwrap_or("");
                if path.is_empty() {
                    eprintln!("error: --project-path requires a path argument");
                    std::process::exit(1);
                }
                project_path = Some(PathBuf::from(path));
            }
            "--data-dir" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --data-dir requires a path argument");
                    std::process::exit(1);
                }
                data_dir = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with("--data-dir=") => {
                let path = arg.strip_prefix("--data-dir=").unwrap_or("");
                if path.is_empty() {
                    eprintln!("error: --data-dir requires a path argument");
                    std::process::exit(1);
                }
                data_dir = Some(PathBuf::from(path));
            }
            arg => {
                eprintln!("error: unknown argument '{}'", arg);
                eprintln!("Try 'memoria-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    Args { project_path, data_dir }
}

#[tokio::main]
async fn main() {
    let args = parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("Memoria MCP Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = match Config::load(None) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(ref path) = args.project_path {
        config.project_path = Some(path.clone());
    }
    if let Some(ref dir) = args.data_dir {
        config.data_dir = Some(dir.clone());
    }

    let project = match ProjectContext::resolve(config.project_path.clone()) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to resolve project context: {}", e);
            std::process::exit(1);
        }
    };
    info!(project_path = %project.project_path().display(), schema = %project.project_schema(), "Project resolved");

    let data_dir = config
        .data_dir
        .clone()
        .unwrap_or_else(|| directories::ProjectDirs::from("", "", "memoria")
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".memoria")));

    let schema = SchemaManager::new(&data_dir, project.project_schema());
    let pool = match ConnectionPool::open(schema.db_path(), config.pool_max_size, config.pool_idle_timeout()) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to open schema database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = schema.ensure_schema(&pool).await {
        error!("Failed to apply schema migrations: {}", e);
        std::process::exit(1);
    }
    info!("Schema ready at {}", schema.db_path().display());

    let project_path_string = project.project_path().to_string_lossy().to_string();
    let recorded_dimension = match schema.recorded_dimension(&pool, project_path_string.clone()).await {
        Ok(dim) => dim,
        Err(e) => {
            warn!("Could not read recorded embedding dimension: {}", e);
            None
        }
    };

    let (timeout_min, timeout_max, timeout_initial) = config.embedding_timeout_bounds();
    let embedder = EmbeddingClient::new(
        data_dir.join(&config.embedding_socket),
        timeout_min,
        timeout_max,
        timeout_initial,
    );
    let queue = EmbeddingQueue::new(project.project_schema());
    let search = match SearchEngine::new(recorded_dimension.unwrap_or(memoria_core::DEFAULT_DIMENSIONS)) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to initialize search engine: {}", e);
            std::process::exit(1);
        }
    };
    let drilldowns = DrilldownRegistry::new();
    let hotpaths = HotPathManager::new();

    let state = Arc::new(AppState::new(
        config.clone(),
        project,
        pool,
        schema,
        embedder,
        queue,
        search,
        drilldowns,
        hotpaths,
        recorded_dimension,
    ));

    spawn_consolidation_task(Arc::clone(&state));
    spawn_decay_task(Arc::clone(&state));

    let server = McpServer::new(state);
    let transport = StdioTransport::new();

    info!("Starting MCP server on stdio...");
    if let Err(e) = transport.run(server).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Memoria MCP Server shutting down");
}

/// Periodically runs consolidation so the memory set doesn't grow unbounded with near-duplicates.
fn spawn_consolidation_task(state: Arc<AppState>) {
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(state.config.consolidation_interval_min * 60);
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;

        loop {
            let project_path = state.project_path_string();
            let options = memoria_core::ConsolidationOptions {
                similarity_threshold: state.config.consolidation_similarity_threshold,
                min_cluster_size: state.config.consolidation_min_memories,
                ..memoria_core::ConsolidationOptions::default()
            };
            match memoria_core::ConsolidationEngine::run(&state.pool, &state.search, project_path, options).await {
                Ok(report) => {
                    if report.memories_merged > 0 {
                        info!(
                            clusters = report.clusters_found,
                            merged = report.memories_merged,
                            "Periodic consolidation complete"
                        );
                    }
                }
                Err(e) => warn!("Periodic consolidation failed: {}", e),
            }
            tokio::time::sleep(interval).await;
        }
    });
}

/// Periodically decays hot-path weights so stale access sequences stop being predicted.
fn spawn_decay_task(state: Arc<AppState>) {
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(3600);
        loop {
            tokio::time::sleep(interval).await;
            match state
                .hotpaths
                .decay(&state.pool, state.config.hotpath_decay_factor, state.config.hotpath_prune_floor)
                .await
            {
                Ok(pruned) => {
                    if pruned > 0 {
                        info!(pruned, "Hot path decay pruned stale paths");
                    }
                }
                Err(e) => warn!("Hot path decay failed: {}", e),
            }
        }
    });
}
