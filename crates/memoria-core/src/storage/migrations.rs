//! Database Migrations
//!
//! Schema migration definitions for a project's SQLite file. Versioned, idempotent,
//! applied in order and tracked in `schema_version` — re-running is always safe.

/// Migration definitions, applied in ascending version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: memories, code_definitions, hot_paths, access_transitions",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Embedding queue and schema_meta (recorded vector dimension)",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "FTS5 keyword index with porter stemming over memories.content",
        up: MIGRATION_V3_UP,
    },
    Migration {
        version: 4,
        description: "Performance: page_size 8192 (VACUUM applied separately, see apply_migrations)",
        up: MIGRATION_V4_UP,
    },
    Migration {
        version: 5,
        description: "Codebase scan state, for resumable CodebaseIndexer scans",
        up: MIGRATION_V5_UP,
    },
];

/// A single database migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    memory_type TEXT NOT NULL DEFAULT 'semantic',
    importance TEXT NOT NULL DEFAULT 'medium',
    tags TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    embedding BLOB,
    embedding_dim INTEGER,
    project_path TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    expires_at TEXT,
    related_memories TEXT NOT NULL DEFAULT '[]',
    consolidated_from TEXT NOT NULL DEFAULT '[]'
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_memories_project_hash ON memories(project_path, content_hash);
CREATE INDEX IF NOT EXISTS idx_memories_project ON memories(project_path);
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);
CREATE INDEX IF NOT EXISTS idx_memories_expires ON memories(expires_at);
CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(memory_type);

CREATE TABLE IF NOT EXISTS code_definitions (
    id TEXT PRIMARY KEY,
    file_path TEXT NOT NULL,
    language TEXT NOT NULL,
    definition_type TEXT NOT NULL,
    name TEXT NOT NULL,
    signature TEXT,
    docstring TEXT,
    line_start INTEGER NOT NULL,
    line_end INTEGER NOT NULL,
    embedding BLOB,
    project_path TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_code_defs_unique
    ON code_definitions(project_path, file_path, name, line_start);
CREATE INDEX IF NOT EXISTS idx_code_defs_project ON code_definitions(project_path);
CREATE INDEX IF NOT EXISTS idx_code_defs_file ON code_definitions(project_path, file_path);

CREATE TABLE IF NOT EXISTS hot_paths (
    id TEXT PRIMARY KEY,
    path_hash TEXT NOT NULL,
    memory_ids TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 1,
    heat_score REAL NOT NULL DEFAULT 1.0,
    cached_at TEXT,
    cache_hits INTEGER NOT NULL DEFAULT 0,
    dominant_tags TEXT NOT NULL DEFAULT '[]',
    project_path TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_hot_paths_hash ON hot_paths(project_path, path_hash);
CREATE INDEX IF NOT EXISTS idx_hot_paths_heat ON hot_paths(project_path, heat_score);

CREATE TABLE IF NOT EXISTS access_transitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_path TEXT NOT NULL,
    from_memory_id TEXT NOT NULL,
    to_memory_id TEXT NOT NULL,
    transition_count INTEGER NOT NULL DEFAULT 1,
    last_transition_at TEXT NOT NULL,
    session_id TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_transitions_pair
    ON access_transitions(project_path, from_memory_id, to_memory_id);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS embedding_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id TEXT NOT NULL,
    text TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    embedding BLOB,
    error TEXT,
    created_at TEXT NOT NULL,
    processed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_queue_claim
    ON embedding_queue(project_id, status, priority DESC, created_at ASC);
CREATE INDEX IF NOT EXISTS idx_queue_cleanup ON embedding_queue(status, processed_at);

CREATE TABLE IF NOT EXISTS schema_meta (
    project_path TEXT PRIMARY KEY,
    embedding_dim INTEGER,
    embedding_model TEXT,
    updated_at TEXT NOT NULL
);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

const MIGRATION_V3_UP: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    id,
    content,
    tags,
    content='memories',
    content_rowid='rowid',
    tokenize='porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, id, content, tags)
    VALUES (NEW.rowid, NEW.id, NEW.content, NEW.tags);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, content, tags)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content, OLD.tags);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, content, tags)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content, OLD.tags);
    INSERT INTO memories_fts(rowid, id, content, tags)
    VALUES (NEW.rowid, NEW.id, NEW.content, NEW.tags);
END;

UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

const MIGRATION_V4_UP: &str = r#"
UPDATE schema_version SET version = 4, applied_at = datetime('now');
"#;

const MIGRATION_V5_UP: &str = r#"
CREATE TABLE IF NOT EXISTS codebase_scan_state (
    project_path TEXT NOT NULL,
    file_path TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    scanned_at TEXT NOT NULL,
    PRIMARY KEY (project_path, file_path)
);

UPDATE schema_version SET version = 5, applied_at = datetime('now');
"#;

/// Current schema version recorded in `schema_version`, or 0 for a fresh database.
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |_| Ok(true),
        )
        .unwrap_or(false);
    if !has_table {
        return Ok(0);
    }
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

/// Apply all migrations newer than the current version, in order. Safe to call on every
/// startup; a fully up-to-date database applies nothing.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applying migration"
            );

            conn.execute_batch(migration.up)?;

            // page_size changes require VACUUM, which cannot run inside execute_batch's
            // implicit transaction.
            if migration.version == 4 {
                conn.pragma_update(None, "page_size", 8192)?;
                conn.execute_batch("VACUUM;")?;
            }

            applied += 1;
        }
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn applies_all_migrations_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        let applied = apply_migrations(&conn).unwrap();
        assert_eq!(applied, MIGRATIONS.len() as u32);
        assert_eq!(get_current_version(&conn).unwrap(), 5);
    }

    #[test]
    fn is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        let applied_again = apply_migrations(&conn).unwrap();
        assert_eq!(applied_again, 0);
    }
}
