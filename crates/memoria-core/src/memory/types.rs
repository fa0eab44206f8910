//! Entity definitions for the memory data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a memory came to exist / how it should be treated during consolidation and decay.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    #[default]
    Semantic,
    Episodic,
    Procedural,
    Working,
    Consolidated,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Semantic => "semantic",
            MemoryType::Episodic => "episodic",
            MemoryType::Procedural => "procedural",
            MemoryType::Working => "working",
            MemoryType::Consolidated => "consolidated",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "episodic" => MemoryType::Episodic,
            "procedural" => MemoryType::Procedural,
            "working" => MemoryType::Working,
            "consolidated" => MemoryType::Consolidated,
            _ => MemoryType::Semantic,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Importance is totally ordered: `critical > high > medium > low > trivial`. Used by
/// consolidation to pick the surviving importance of a merged cluster.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Trivial,
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Critical => "critical",
            Importance::High => "high",
            Importance::Medium => "medium",
            Importance::Low => "low",
            Importance::Trivial => "trivial",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "critical" => Importance::Critical,
            "high" => Importance::High,
            "low" => Importance::Low,
            "trivial" => Importance::Trivial,
            _ => Importance::Medium,
        }
    }
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored memory row, as persisted in `memories`.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub memory_type: MemoryType,
    pub importance: Importance,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
    pub embedding: Option<Vec<f32>>,
    pub project_path: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub access_count: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub related_memories: Vec<String>,
    pub consolidated_from: Vec<String>,
}

/// Caller-supplied fields for inserting a new memory. Everything else (`id`, `content_hash`,
/// timestamps, `access_count`) is derived by `MemoryStore::insert`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInput {
    pub content: String,
    #[serde(default)]
    pub memory_type: MemoryType,
    #[serde(default)]
    pub importance: Importance,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// A caller-supplied embedding skips EmbeddingQueue but must match the project's recorded
    /// dimension or the insert is rejected with `SchemaMismatch`.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    pub project_path: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Distinguishes `[USER] .../[ASSISTANT] ...` turns produced by the restoration parser from
    /// ordinary content; folded into the content-hash input alongside the trimmed content.
    #[serde(default)]
    pub role: Option<String>,
}

impl MemoryInput {
    pub fn new(content: impl Into<String>, project_path: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            project_path: project_path.into(),
            ..Default::default()
        }
    }
}

/// A function/class/method definition extracted from source by `CodebaseIndexer`.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeDefinition {
    pub id: String,
    pub file_path: String,
    pub language: String,
    pub definition_type: String,
    pub name: String,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub line_start: i64,
    pub line_end: i64,
    pub embedding: Option<Vec<f32>>,
    pub project_path: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A recurring sequence of memory accesses promoted by `HotPathManager`.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotPath {
    pub id: String,
    pub path_hash: String,
    pub memory_ids: Vec<String>,
    pub access_count: i64,
    pub heat_score: f64,
    pub cached_at: Option<DateTime<Utc>>,
    pub cache_hits: i64,
    pub dominant_tags: Vec<String>,
    pub project_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An observed `from -> to` transition between two memory accesses in the same session.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTransition {
    pub project_path: String,
    pub from_memory_id: String,
    pub to_memory_id: String,
    pub transition_count: i64,
    pub last_transition_at: DateTime<Utc>,
    pub session_id: Option<String>,
}

/// Lifecycle state of a row in `embedding_queue`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "processing" => QueueStatus::Processing,
            "completed" => QueueStatus::Completed,
            "failed" => QueueStatus::Failed,
            _ => QueueStatus::Pending,
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durable overflow request for an embedding, awaiting `EmbeddingQueue::drain`.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingQueueItem {
    pub id: i64,
    pub project_id: String,
    pub text: String,
    pub priority: i64,
    pub status: QueueStatus,
    pub embedding: Option<Vec<f32>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// What an ephemeral drilldown id refers to.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrilldownKind {
    Memory,
    Code,
    Context,
}

impl DrilldownKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrilldownKind::Memory => "memory",
            DrilldownKind::Code => "code",
            DrilldownKind::Context => "context",
        }
    }
}

impl std::fmt::Display for DrilldownKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An entry in `DrilldownRegistry`: a numeric id issued during camera-roll search results,
/// resolved back to its memory within the same process lifetime only.
#[derive(Debug, Clone)]
pub struct DrilldownEntry {
    pub memory_id: String,
    pub kind: DrilldownKind,
    pub created_at: DateTime<Utc>,
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
