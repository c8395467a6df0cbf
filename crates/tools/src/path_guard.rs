//! Path-boundary enforcement (policy #2): the normalized target
//! path of every file-system tool call must be a descendant of the
//! per-session output directory.
//!
//! Grounded on `file_ops.rs::validate_path` (teacher) — same reject-`..`,
//! canonicalize-longest-existing-ancestor algorithm, trimmed to the single
//! session-output-root boundary this crate needs (no workspace-root param
//! threading per call).

use std::path::{Component, Path, PathBuf};

use pf_domain::error::{Error, Result};

/// Validate and resolve `requested` (relative or absolute) against
/// `session_root`. Escape attempts — absolute paths outside the root,
/// `..` components, or symlink tricks that resolve outside it — are
/// rejected with [`Error::Validation`].
pub fn resolve_within(session_root: &Path, requested: &str) -> Result<PathBuf> {
    let requested_path = Path::new(requested);
    for component in requested_path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(Error::Validation(format!(
                "path must not contain '..' components (got {requested:?})"
            )));
        }
    }

    std::fs::create_dir_all(session_root).map_err(Error::Io)?;
    let canonical_root = session_root.canonicalize().map_err(Error::Io)?;

    let candidate = if requested_path.is_absolute() {
        requested_path.to_path_buf()
    } else {
        canonical_root.join(requested_path)
    };

    let resolved = if candidate.exists() {
        candidate.canonicalize().map_err(Error::Io)?
    } else {
        let mut existing = candidate.as_path();
        let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
        loop {
            if existing.exists() {
                break;
            }
            match existing.parent() {
                Some(parent) => {
                    if let Some(name) = existing.file_name() {
                        tail.push(name);
                    }
                    existing = parent;
                }
                None => break,
            }
        }
        let mut resolved = existing.canonicalize().map_err(Error::Io)?;
        for part in tail.into_iter().rev() {
            resolved.push(part);
        }
        resolved
    };

    if !resolved.starts_with(&canonical_root) {
        return Err(Error::Validation(format!(
            "path {requested:?} escapes the session output directory"
        )));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_within_root_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_within(dir.path(), "pages/index.html").unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn parent_dir_component_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_within(dir.path(), "../../etc/passwd").is_err());
    }

    #[test]
    fn absolute_path_outside_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_within(dir.path(), "/etc/passwd").is_err());
    }

    #[test]
    fn absolute_path_inside_root_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let inside = root.join("pages/index.html");
        let resolved = resolve_within(dir.path(), inside.to_str().unwrap()).unwrap();
        assert!(resolved.starts_with(&root));
    }
}
