//! ContextRestorationParser — detects "summary of prior conversation" memories and splits
//! them back out into individual per-turn memories.
//!
//! The detection table is data (an ordered list of markers), not branching code, so tuning
//! which summaries get recognized never touches control flow.

use std::sync::LazyLock;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use regex::Regex;

use crate::embeddings::{EmbeddingClient, EmbeddingQueue};
use crate::error::Result;
use crate::memory::{Memory, MemoryInput, MemoryStore};
use crate::project::ProjectContext;
use crate::search::SearchEngine;
use crate::storage::ConnectionPool;

const CHUNK_SIZE: usize = 50;
const CHUNK_DELAY: std::time::Duration = std::time::Duration::from_millis(100);
const PROGRESS_EVERY: usize = 100;

/// One marker in the detection table: a regex, whether it is case-sensitive, and a confidence
/// score callers may use to prioritize ambiguous summaries.
struct Marker {
    source: &'static str,
    case_sensitive: bool,
    confidence: f32,
}

/// Primary markers are checked case-sensitively first; fallback markers case-insensitively
/// second. Ordered data, not an if/else chain, so adding a marker never risks a logic bug.
const MARKERS: &[Marker] = &[
    Marker { source: r"Summary of prior conversation", case_sensitive: true, confidence: 0.95 },
    Marker { source: r"This session is being continued from a previous conversation", case_sensitive: true, confidence: 0.95 },
    Marker { source: r"Conversation summary:", case_sensitive: true, confidence: 0.85 },
    Marker { source: r"previous conversation", case_sensitive: false, confidence: 0.5 },
    Marker { source: r"conversation history", case_sensitive: false, confidence: 0.4 },
];

static COMPILED_MARKERS: LazyLock<Vec<(Regex, f32)>> = LazyLock::new(|| {
    MARKERS
        .iter()
        .map(|m| {
            let pattern = if m.case_sensitive {
                m.source.to_string()
            } else {
                format!("(?i){}", m.source)
            };
            (Regex::new(&pattern).expect("static marker pattern is valid regex"), m.confidence)
        })
        .collect()
});

fn detect(content: &str) -> Option<f32> {
    COMPILED_MARKERS
        .iter()
        .find(|(re, _)| re.is_match(content))
        .map(|(_, confidence)| *confidence)
}

/// One user or assistant turn recovered from a summary.
struct ExtractedTurn {
    role: &'static str,
    content: String,
}

/// Splits a summary body into `[USER] .../[ASSISTANT] ...` turns. Lines beginning with a
/// recognized role marker start a new turn; everything until the next marker belongs to it.
fn extract_turns(body: &str) -> Vec<ExtractedTurn> {
    let mut turns = Vec::new();
    let mut current: Option<ExtractedTurn> = None;

    for line in body.lines() {
        let trimmed = line.trim_start();
        let role = if trimmed.starts_with("User:") || trimmed.starts_with("Human:") {
            Some(("user", trimmed.splitn(2, ':').nth(1).unwrap_or("").trim()))
        } else if trimmed.starts_with("Assistant:") || trimmed.starts_with("Claude:") {
            Some(("assistant", trimmed.splitn(2, ':').nth(1).unwrap_or("").trim()))
        } else {
            None
        };

        match role {
            Some((role, rest)) => {
                if let Some(turn) = current.take() {
                    if !turn.content.trim().is_empty() {
                        turns.push(turn);
                    }
                }
                current = Some(ExtractedTurn {
                    role: if role == "user" { "user" } else { "assistant" },
                    content: rest.to_string(),
                });
            }
            None => {
                if let Some(turn) = current.as_mut() {
                    if !turn.content.is_empty() {
                        turn.content.push('\n');
                    }
                    turn.content.push_str(line);
                }
            }
        }
    }
    if let Some(turn) = current.take() {
        if !turn.content.trim().is_empty() {
            turns.push(turn);
        }
    }
    turns
}

/// Extracts an explicit `project_path: <path>` or `project: <path>` marker from summary text,
/// for summaries that carry no source metadata of their own.
fn extract_project_path_marker(body: &str) -> Option<String> {
    for line in body.lines() {
        let trimmed = line.trim();
        for prefix in ["project_path:", "project:"] {
            if let Some(rest) = trimmed.strip_prefix(prefix) {
                let path = rest.trim();
                if !path.is_empty() {
                    return Some(path.to_string());
                }
            }
        }
    }
    None
}

#[derive(Debug, Default, Clone)]
pub struct RestorationReport {
    pub summaries_detected: usize,
    pub summaries_skipped_foreign_project: usize,
    pub summaries_not_extractable: usize,
    pub turns_inserted: usize,
    pub turns_deduplicated: usize,
}

pub struct ContextRestorationParser;

impl ContextRestorationParser {
    /// Scans candidate memories for summary markers and, for each one that is extractable and
    /// project-related, splits it into per-turn memories. Source memories are tagged
    /// `context-restoration-processed` afterward so a second pass never reprocesses them.
    pub async fn process(
        pool: &ConnectionPool,
        embedder: &EmbeddingClient,
        queue: &EmbeddingQueue,
        search: &SearchEngine,
        schema_dimension: Option<usize>,
        project: &ProjectContext,
        candidates: Vec<Memory>,
    ) -> Result<RestorationReport> {
        let mut report = RestorationReport::default();
        let mut processed_sources: Vec<String> = Vec::new();
        let mut total_turns_seen = 0usize;

        for candidate in candidates {
            if candidate.tags.iter().any(|t| t == "context-restoration-processed") {
                continue;
            }
            let Some(_confidence) = detect(&candidate.content) else {
                continue;
            };
            report.summaries_detected += 1;

            let project_path = resolve_project_path(project, &candidate);
            let Some(project_path) = project_path else {
                report.summaries_skipped_foreign_project += 1;
                continue;
            };

            let turns = extract_turns(&candidate.content);
            if turns.is_empty() {
                report.summaries_not_extractable += 1;
                continue;
            }

            let source_timestamp = candidate.created_at;
            let short_source_id: String = candidate.id.chars().take(8).collect();

            for chunk in turns.chunks(CHUNK_SIZE) {
                for (offset, turn) in chunk.iter().enumerate() {
                    let sequence_number = total_turns_seen + offset;
                    let timestamp = timestamp_for(source_timestamp, sequence_number);
                    let content = format!("[{}] {}", turn.role.to_uppercase(), turn.content);

                    let mut input = MemoryInput::new(content, project_path.clone());
                    input.role = Some(turn.role.to_string());
                    input.tags = vec![
                        format!("role:{}", turn.role),
                        "extracted-from-context-restoration".to_string(),
                        format!("source:{short_source_id}"),
                    ];
                    input.metadata = serde_json::json!({ "extractedAt": timestamp.to_rfc3339() });

                    let (_, inserted) =
                        MemoryStore::insert(pool, embedder, queue, search, schema_dimension, input)
                            .await?;
                    if inserted {
                        report.turns_inserted += 1;
                    } else {
                        report.turns_deduplicated += 1;
                    }

                    total_turns_seen += 1;
                    if total_turns_seen % PROGRESS_EVERY == 0 {
                        tracing::info!(turns = total_turns_seen, "context restoration progress");
                    }
                }
                if turns.len() > CHUNK_SIZE {
                    tokio::time::sleep(CHUNK_DELAY).await;
                }
            }

            processed_sources.push(candidate.id.clone());
        }

        for source_id in processed_sources {
            mark_processed(pool, &project.project_schema().to_string(), &source_id).await?;
        }

        Ok(report)
    }
}

fn resolve_project_path(project: &ProjectContext, candidate: &Memory) -> Option<String> {
    if let Some(path) = candidate.metadata.get("sourceProjectPath").and_then(|v| v.as_str()) {
        if project.is_related_path(std::path::Path::new(path)) {
            return Some(path.to_string());
        }
        return None;
    }

    if let Some(marker_path) = extract_project_path_marker(&candidate.content) {
        if std::path::Path::new(&marker_path).exists()
            && project.is_related_path(std::path::Path::new(&marker_path))
        {
            return Some(marker_path);
        }
        return None;
    }

    Some("unknown".to_string())
}

fn timestamp_for(source_timestamp: DateTime<Utc>, sequence_number: usize) -> DateTime<Utc> {
    source_timestamp + ChronoDuration::seconds(2 * sequence_number as i64)
}

async fn mark_processed(pool: &ConnectionPool, project_path: &str, id: &str) -> Result<()> {
    let id = id.to_string();
    let project_path = project_path.to_string();
    pool.with_conn(move |conn| {
        let existing: String = conn.query_row(
            "SELECT tags FROM memories WHERE id = ?1",
            rusqlite::params![id],
            |row| row.get(0),
        )?;
        let mut tags: Vec<String> = serde_json::from_str(&existing).unwrap_or_default();
        if !tags.iter().any(|t| t == "context-restoration-processed") {
            tags.push("context-restoration-processed".to_string());
        }
        let tags_json = serde_json::to_string(&tags).unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            "UPDATE memories SET tags = ?1 WHERE id = ?2 AND project_path = ?3",
            rusqlite::params![tags_json, id, project_path],
        )?;
        Ok(())
    })
    .await
    .map_err(crate::error::MemoriaError::Storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_primary_marker_case_sensitively() {
        assert!(detect("Summary of prior conversation: we discussed X").is_some());
    }

    #[test]
    fn detects_fallback_marker_case_insensitively() {
        assert!(detect("a recap of our PREVIOUS CONVERSATION follows").is_some());
    }

    #[test]
    fn plain_content_is_not_detected() {
        assert!(detect("remember to buy milk").is_none());
    }

    #[test]
    fn extracts_user_and_assistant_turns() {
        let body = "User: what is rust\nAssistant: a systems language\nUser: thanks";
        let turns = extract_turns(body);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, "user");
        assert_eq!(turns[0].content, "what is rust");
        assert_eq!(turns[1].role, "assistant");
    }

    #[test]
    fn multi_line_turns_are_joined() {
        let body = "User: first line\nsecond line\nAssistant: reply";
        let turns = extract_turns(body);
        assert_eq!(turns[0].content, "first line\nsecond line");
    }

    #[test]
    fn timestamp_advances_by_two_seconds_per_turn() {
        let base = Utc::now();
        let t0 = timestamp_for(base, 0);
        let t3 = timestamp_for(base, 3);
        assert_eq!(t0, base);
        assert_eq!((t3 - base).num_seconds(), 6);
    }

    #[test]
    fn extracts_explicit_project_path_marker() {
        let body = "project_path: /srv/widgets\nUser: hi";
        assert_eq!(extract_project_path_marker(body), Some("/srv/widgets".to_string()));
    }

    #[test]
    fn missing_marker_yields_none() {
        assert_eq!(extract_project_path_marker("just some text"), None);
    }
}
