//! HotPathManager — observes memory-access order, promotes recurring access sequences to
//! `HotPath` rows, and predicts what comes next.
//!
//! The decay factor and prune floor are configuration rather than constants (see `Config`):
//! the right values depend on a project's access patterns and are meant to be tuned, not fixed.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::params;

use crate::error::Result;
use crate::memory::HotPath;
use crate::storage::ConnectionPool;

const MIN_PATH_LEN: usize = 2;
const PROMOTION_THRESHOLD: i64 = 3;

/// Per-session ordered buffer of accessed memory ids, used to detect candidate hot paths.
#[derive(Debug, Default)]
struct Session {
    accessed: Vec<String>,
}

pub struct HotPathManager {
    sessions: Mutex<HashMap<String, Session>>,
}

impl Default for HotPathManager {
    fn default() -> Self {
        Self::new()
    }
}

impl HotPathManager {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Record that `memory_id` was accessed in `session_id`. Records an `AccessTransition` from
    /// the session's previous access (if any), appends to the session buffer, and scans for
    /// newly-promotable sub-sequences.
    pub async fn record_access(
        &self,
        pool: &ConnectionPool,
        project_path: &str,
        session_id: &str,
        memory_id: &str,
    ) -> Result<()> {
        let previous = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions.entry(session_id.to_string()).or_default();
            let previous = session.accessed.last().cloned();
            session.accessed.push(memory_id.to_string());
            previous
        };

        if let Some(from) = previous {
            record_transition(pool, project_path, &from, memory_id, session_id).await?;
        }

        self.scan_and_promote(pool, project_path, session_id).await?;
        Ok(())
    }

    /// End a session, dropping its in-memory buffer. Already-promoted paths and already-recorded
    /// transitions persist; only the ephemeral ordering buffer is discarded.
    pub fn end_session(&self, session_id: &str) {
        self.sessions.lock().unwrap().remove(session_id);
    }

    /// Scans the session's buffer for sub-sequences of length >= 2 whose every consecutive pair
    /// has a transition count >= `PROMOTION_THRESHOLD`, and promotes any such sequence not
    /// already recorded as a `HotPath`.
    async fn scan_and_promote(&self, pool: &ConnectionPool, project_path: &str, session_id: &str) -> Result<()> {
        let buffer = {
            let sessions = self.sessions.lock().unwrap();
            sessions
                .get(session_id)
                .map(|s| s.accessed.clone())
                .unwrap_or_default()
        };
        if buffer.len() < MIN_PATH_LEN {
            return Ok(());
        }

        for start in 0..buffer.len() {
            for end in (start + MIN_PATH_LEN)..=buffer.len() {
                let sequence = &buffer[start..end];
                let counts = transition_counts(pool, project_path, sequence).await?;
                if counts.iter().all(|c| *c >= PROMOTION_THRESHOLD) {
                    let heat_score = counts.iter().copied().min().unwrap_or(0) as f64;
                    promote(pool, project_path, sequence, heat_score).await?;
                }
            }
        }
        Ok(())
    }

    /// Top-`n` outbound transitions from `current_id` by transition count.
    pub async fn predict_next(
        &self,
        pool: &ConnectionPool,
        project_path: &str,
        current_id: &str,
        n: usize,
    ) -> Result<Vec<(String, i64)>> {
        let project_path = project_path.to_string();
        let current_id = current_id.to_string();
        pool.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT to_memory_id, transition_count FROM access_transitions
                 WHERE project_path = ?1 AND from_memory_id = ?2
                 ORDER BY transition_count DESC LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(params![project_path, current_id, n as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
        .map_err(crate::error::MemoriaError::Storage)
    }

    /// Finds a `HotPath` whose recorded sequence begins with `sequence`, and returns the memory
    /// ids at the remaining positions for the caller to pre-warm.
    pub async fn check_and_prefetch(
        &self,
        pool: &ConnectionPool,
        project_path: &str,
        sequence: &[String],
    ) -> Result<Option<Vec<String>>> {
        let candidates = list_paths(pool, project_path).await?;
        for path in candidates {
            if path.memory_ids.len() > sequence.len() && path.memory_ids[..sequence.len()] == sequence[..] {
                touch_path(pool, project_path, &path.path_hash).await?;
                return Ok(Some(path.memory_ids[sequence.len()..].to_vec()));
            }
        }
        Ok(None)
    }

    /// Multiply every path's `heat_score` by `factor`, then prune anything below `floor`.
    /// Intended to run on a background interval (see `Config::hotpath_decay_factor`/
    /// `hotpath_prune_floor` and the periodic task in `memoria-mcp`'s `main.rs`).
    pub async fn decay(&self, pool: &ConnectionPool, factor: f64, floor: f64) -> Result<usize> {
        pool.with_conn(move |conn| {
            conn.execute("UPDATE hot_paths SET heat_score = heat_score * ?1", params![factor])?;
            let pruned = conn.execute("DELETE FROM hot_paths WHERE heat_score < ?1", params![floor])?;
            Ok(pruned)
        })
        .await
        .map_err(crate::error::MemoriaError::Storage)
    }
}

/// Upsert a `from -> to` transition, bumping its count if it already exists.
async fn record_transition(pool: &ConnectionPool, project_path: &str, from: &str, to: &str, session_id: &str) -> Result<()> {
    let project_path = project_path.to_string();
    let from = from.to_string();
    let to = to.to_string();
    let session_id = session_id.to_string();
    let now = Utc::now().to_rfc3339();
    pool.with_conn(move |conn| {
        conn.execute(
            "INSERT INTO access_transitions (project_path, from_memory_id, to_memory_id, transition_count, last_transition_at, session_id)
             VALUES (?1, ?2, ?3, 1, ?4, ?5)
             ON CONFLICT (project_path, from_memory_id, to_memory_id)
             DO UPDATE SET transition_count = transition_count + 1, last_transition_at = ?4",
            params![project_path, from, to, now, session_id],
        )?;
        Ok(())
    })
    .await
    .map_err(crate::error::MemoriaError::Storage)
}

/// Transition counts for each consecutive pair in `sequence`; one entry per pair, missing
/// pairs count as zero.
async fn transition_counts(pool: &ConnectionPool, project_path: &str, sequence: &[String]) -> Result<Vec<i64>> {
    let mut counts = Vec::with_capacity(sequence.len().saturating_sub(1));
    for pair in sequence.windows(2) {
        let project_path = project_path.to_string();
        let from = pair[0].clone();
        let to = pair[1].clone();
        let count: i64 = pool
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT transition_count FROM access_transitions
                     WHERE project_path = ?1 AND from_memory_id = ?2 AND to_memory_id = ?3",
                    params![project_path, from, to],
                    |row| row.get(0),
                )
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(0),
                    e => Err(e),
                })
            })
            .await
            .map_err(crate::error::MemoriaError::Storage)?;
        counts.push(count);
    }
    Ok(counts)
}

fn path_hash(sequence: &[String]) -> String {
    let mut hasher = DefaultHasher::new();
    for id in sequence {
        id.hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}

async fn promote(pool: &ConnectionPool, project_path: &str, sequence: &[String], heat_score: f64) -> Result<()> {
    let hash = path_hash(sequence);
    let project_path = project_path.to_string();
    let memory_ids_json = serde_json::to_string(sequence).map_err(|e| crate::error::MemoriaError::Internal(e.to_string()))?;
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    pool.with_conn(move |conn| {
        conn.execute(
            "INSERT INTO hot_paths (id, path_hash, memory_ids, access_count, heat_score, project_path, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?6)
             ON CONFLICT (project_path, path_hash)
             DO UPDATE SET access_count = access_count + 1, heat_score = heat_score + ?4, updated_at = ?6",
            params![id, hash, memory_ids_json, heat_score, project_path, now],
        )?;
        Ok(())
    })
    .await
    .map_err(crate::error::MemoriaError::Storage)
}

async fn touch_path(pool: &ConnectionPool, project_path: &str, hash: &str) -> Result<()> {
    let project_path = project_path.to_string();
    let hash = hash.to_string();
    let now = Utc::now().to_rfc3339();
    pool.with_conn(move |conn| {
        conn.execute(
            "UPDATE hot_paths SET cache_hits = cache_hits + 1, cached_at = ?1 WHERE project_path = ?2 AND path_hash = ?3",
            params![now, project_path, hash],
        )?;
        Ok(())
    })
    .await
    .map_err(crate::error::MemoriaError::Storage)
}

async fn list_paths(pool: &ConnectionPool, project_path: &str) -> Result<Vec<HotPath>> {
    let project_path = project_path.to_string();
    pool.with_conn(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, path_hash, memory_ids, access_count, heat_score, cached_at, cache_hits,
                    dominant_tags, project_path, created_at, updated_at
             FROM hot_paths WHERE project_path = ?1 ORDER BY heat_score DESC",
        )?;
        let rows = stmt
            .query_map(params![project_path], row_to_hotpath)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })
    .await
    .map_err(crate::error::MemoriaError::Storage)
}

fn row_to_hotpath(row: &rusqlite::Row) -> rusqlite::Result<HotPath> {
    let memory_ids_json: String = row.get(2)?;
    let dominant_tags_json: String = row.get(7)?;
    let cached_at: Option<String> = row.get(5)?;
    Ok(HotPath {
        id: row.get(0)?,
        path_hash: row.get(1)?,
        memory_ids: serde_json::from_str(&memory_ids_json).unwrap_or_default(),
        access_count: row.get(3)?,
        heat_score: row.get(4)?,
        cached_at: cached_at.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok()).map(|t| t.with_timezone(&Utc)),
        cache_hits: row.get(6)?,
        dominant_tags: serde_json::from_str(&dominant_tags_json).unwrap_or_default(),
        project_path: row.get(8)?,
        created_at: parse_rfc3339(row.get::<_, String>(9)?),
        updated_at: parse_rfc3339(row.get::<_, String>(10)?),
    })
}

fn parse_rfc3339(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_hash_is_stable_for_same_sequence() {
        let a = path_hash(&["1".to_string(), "2".to_string()]);
        let b = path_hash(&["1".to_string(), "2".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn path_hash_differs_by_order() {
        let a = path_hash(&["1".to_string(), "2".to_string()]);
        let b = path_hash(&["2".to_string(), "1".to_string()]);
        assert_ne!(a, b);
    }

    #[test]
    fn session_buffer_tracks_accesses_without_storage() {
        let sessions: Mutex<HashMap<String, Session>> = Mutex::new(HashMap::new());
        {
            let mut map = sessions.lock().unwrap();
            let session = map.entry("s1".to_string()).or_default();
            session.accessed.push("a".to_string());
            session.accessed.push("b".to_string());
        }
        let map = sessions.lock().unwrap();
        assert_eq!(map.get("s1").unwrap().accessed, vec!["a", "b"]);
    }
}
