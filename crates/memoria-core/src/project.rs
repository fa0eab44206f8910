//! ProjectContext — resolves the current project path to a stable, deterministic schema id.
//!
//! SQLite has no `search_path`; the id derived here instead names the project's own
//! database file (see `db::schema::SchemaManager::db_path`), which is how project isolation
//! is enforced physically rather than logically.

use std::path::{Path, PathBuf};

use crate::error::{MemoriaError, Result};

const SCHEMA_PREFIX: &str = "mem_";
const DEFAULT_SENTINEL: &str = "default";

/// Resolves and caches the project path and its derived schema id for the lifetime of one
/// process. Construction is the only place a project path is accepted from configuration;
/// everything downstream receives an already-validated `ProjectContext`.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    project_path: PathBuf,
    schema_id: String,
}

impl ProjectContext {
    /// Resolve a `ProjectContext` from an explicit path, falling back to the process cwd.
    pub fn resolve(configured: Option<PathBuf>) -> Result<Self> {
        let project_path = match configured {
            Some(p) => p,
            None => std::env::current_dir()
                .map_err(|e| MemoriaError::Config(format!("cannot read cwd: {e}")))?,
        };

        if project_path.as_os_str().is_empty() {
            return Err(MemoriaError::Config("project path is empty".to_string()));
        }

        let project_path = normalize(&project_path);
        let schema_id = derive_schema_id(&project_path);

        Ok(Self {
            project_path,
            schema_id,
        })
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn project_schema(&self) -> &str {
        &self.schema_id
    }

    /// True if `other` is the same project, a parent of it, or a subdirectory of it — the
    /// exact test the context-restoration parser uses to decide whether an extracted
    /// `project_path` may be trusted (§4.10's project isolation rule).
    pub fn is_related_path(&self, other: &Path) -> bool {
        let other = normalize(other);
        other == self.project_path
            || other.starts_with(&self.project_path)
            || self.project_path.starts_with(&other)
    }
}

fn normalize(path: &Path) -> PathBuf {
    // `canonicalize` requires the path to exist; fall back to the as-given path (still
    // absolute in the common case) so a not-yet-created project directory still resolves.
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Lowercase the final path segment, replace runs of non-`[a-z0-9_]` with `_`, trim leading
/// and trailing `_`, substitute the sentinel if empty, prefix with the schema constant.
/// Pure: the same path always yields the same id, on any host.
fn derive_schema_id(project_path: &Path) -> String {
    let basename = project_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    let lowered = basename.to_lowercase();
    let mut sanitized = String::with_capacity(lowered.len());
    let mut prev_was_sep = false;
    for ch in lowered.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            sanitized.push(ch);
            prev_was_sep = false;
        } else if !prev_was_sep {
            sanitized.push('_');
            prev_was_sep = true;
        }
    }
    let trimmed = sanitized.trim_matches('_');
    let final_segment = if trimmed.is_empty() {
        DEFAULT_SENTINEL
    } else {
        trimmed
    };

    format!("{SCHEMA_PREFIX}{final_segment}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_stable_schema_id() {
        let id = derive_schema_id(Path::new("/home/user/My Cool Project!!"));
        assert_eq!(id, "mem_my_cool_project");
    }

    #[test]
    fn empty_basename_uses_sentinel() {
        let id = derive_schema_id(Path::new("/"));
        assert_eq!(id, "mem_default");
    }

    #[test]
    fn purely_symbolic_basename_uses_sentinel() {
        let id = derive_schema_id(Path::new("/---"));
        assert_eq!(id, "mem_default");
    }

    #[test]
    fn same_path_always_yields_same_id() {
        let a = derive_schema_id(Path::new("/srv/widgets"));
        let b = derive_schema_id(Path::new("/srv/widgets"));
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_empty_project_path() {
        let err = ProjectContext::resolve(Some(PathBuf::new()));
        assert!(err.is_err());
    }

    #[test]
    fn is_related_path_covers_parent_and_child() {
        let ctx = ProjectContext {
            project_path: PathBuf::from("/srv/widgets"),
            schema_id: "mem_widgets".to_string(),
        };
        assert!(ctx.is_related_path(Path::new("/srv/widgets")));
        assert!(ctx.is_related_path(Path::new("/srv")));
        assert!(ctx.is_related_path(Path::new("/srv/widgets/sub")));
        assert!(!ctx.is_related_path(Path::new("/srv/other")));
    }
}
