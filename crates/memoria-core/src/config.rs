//! Layered configuration: built-in defaults, overridden by a TOML file, overridden by
//! `MEMORIA_*` environment variables, overridden by the handful of CLI flags that warrant one.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Full configuration surface enumerated in the specification's external interfaces section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory used for project isolation; defaults to the process cwd.
    pub project_path: Option<PathBuf>,
    /// Where per-project SQLite files live; defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
    /// Path to the embedder's Unix domain socket, relative to the project's `.memoria` dir.
    pub embedding_socket: String,
    pub embedding_timeout_min_secs: f64,
    pub embedding_timeout_max_secs: f64,
    pub embedding_timeout_initial_secs: f64,
    pub search_limit: usize,
    pub search_threshold: Option<f32>,
    pub max_content_length: usize,
    pub max_file_size: u64,
    pub consolidation_interval_min: u64,
    pub consolidation_min_memories: usize,
    pub consolidation_similarity_threshold: f32,
    pub hotpath_decay_factor: f64,
    pub hotpath_prune_floor: f64,
    pub queue_cleanup_days: i64,
    pub pool_max_size: usize,
    pub pool_idle_timeout_secs: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_path: None,
            data_dir: None,
            embedding_socket: "sockets/embeddings.sock".to_string(),
            embedding_timeout_min_secs: 0.5,
            embedding_timeout_max_secs: 30.0,
            embedding_timeout_initial_secs: 5.0,
            search_limit: 10,
            search_threshold: None,
            max_content_length: 8_000,
            max_file_size: 1_000_000,
            consolidation_interval_min: 60,
            consolidation_min_memories: 2,
            consolidation_similarity_threshold: 0.85,
            hotpath_decay_factor: 0.95,
            hotpath_prune_floor: 0.05,
            queue_cleanup_days: 7,
            pool_max_size: 10,
            pool_idle_timeout_secs: 30,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Build configuration from defaults, an optional TOML file, then environment overrides.
    /// CLI flags are applied by the caller afterwards (see `memoria-mcp`'s `main.rs`), since
    /// only two of them — `--data-dir` and `--project-path` — warrant a flag at all.
    pub fn load(toml_path: Option<&std::path::Path>) -> crate::error::Result<Self> {
        let mut config = Config::default();

        if let Some(path) = toml_path {
            if path.exists() {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| crate::error::MemoriaError::Config(e.to_string()))?;
                config = toml::from_str(&text)
                    .map_err(|e| crate::error::MemoriaError::Config(e.to_string()))?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("MEMORIA_PROJECT_PATH") {
            self.project_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("MEMORIA_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("MEMORIA_EMBEDDING_SOCKET") {
            self.embedding_socket = v;
        }
        if let Ok(v) = std::env::var("MEMORIA_SEARCH_LIMIT") {
            if let Ok(n) = v.parse() {
                self.search_limit = n;
            }
        }
        if let Ok(v) = std::env::var("MEMORIA_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = std::env::var("MEMORIA_POOL_MAX_SIZE") {
            if let Ok(n) = v.parse() {
                self.pool_max_size = n;
            }
        }
        if let Ok(v) = std::env::var("MEMORIA_CONSOLIDATION_INTERVAL_MIN") {
            if let Ok(n) = v.parse() {
                self.consolidation_interval_min = n;
            }
        }
    }

    pub fn embedding_timeout_bounds(&self) -> (Duration, Duration, Duration) {
        (
            Duration::from_secs_f64(self.embedding_timeout_min_secs),
            Duration::from_secs_f64(self.embedding_timeout_max_secs),
            Duration::from_secs_f64(self.embedding_timeout_initial_secs),
        )
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }
}
