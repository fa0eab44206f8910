//! Keyword fallback search over the `memories_fts` FTS5 index (see `storage::migrations`).
//!
//! Used when vector search returns nothing and the caller opted into `keyword_fallback`;
//! results are flagged `is_fallback = true` by the caller (`SearchEngine`), not here.

use chrono::Utc;
use rusqlite::params;

use crate::error::StorageResult;
use crate::storage::ConnectionPool;

/// A single FTS5 hit: memory id plus its BM25-style rank (lower is more relevant, per SQLite's
/// `rank` column convention for FTS5).
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub memory_id: String,
    pub rank: f64,
}

pub struct KeywordSearcher;

impl KeywordSearcher {
    /// Case-insensitive full-text search over `content`, scoped to one project's non-expired
    /// memories, ordered by FTS5 rank.
    pub async fn search(
        pool: &ConnectionPool,
        project_path: String,
        query: &str,
        limit: usize,
    ) -> StorageResult<Vec<KeywordHit>> {
        let fts_query = sanitize_fts5_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now().to_rfc3339();
        pool.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, memories_fts.rank
                 FROM memories_fts
                 JOIN memories m ON m.id = memories_fts.id
                 WHERE memories_fts MATCH ?1
                   AND m.project_path = ?2
                   AND (m.expires_at IS NULL OR m.expires_at > ?3)
                 ORDER BY memories_fts.rank
                 LIMIT ?4",
            )?;

            let rows = stmt.query_map(params![fts_query, project_path, now, limit as i64], |row| {
                Ok(KeywordHit {
                    memory_id: row.get(0)?,
                    rank: row.get(1)?,
                })
            })?;

            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }
}

/// Escape a free-text query for safe use as an FTS5 MATCH argument: each whitespace-separated
/// term is double-quoted and any embedded `"` is doubled, turning the whole query into a
/// sequence of literal-phrase terms rather than letting user input reach FTS5's own query
/// syntax (`NEAR`, `AND`, `-`, ...).
pub fn sanitize_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_plain_terms() {
        assert_eq!(sanitize_fts5_query("hello world"), "\"hello\" \"world\"");
    }

    #[test]
    fn escapes_embedded_quotes() {
        assert_eq!(sanitize_fts5_query("say \"hi\""), "\"say\" \"\"\"hi\"\"\"");
    }

    #[test]
    fn neutralizes_fts5_operators() {
        // `-term` would otherwise be treated as a NOT clause by FTS5.
        assert_eq!(sanitize_fts5_query("-danger OR safe"), "\"-danger\" \"OR\" \"safe\"");
    }

    #[test]
    fn empty_query_sanitizes_to_empty() {
        assert_eq!(sanitize_fts5_query("   "), "");
    }
}
