//! Workspace containment for file writes.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::ExecError;

/// Resolve `target` against the workspace `root` and make sure the result
/// stays inside it.
///
/// Two checks run. First the path is normalized lexically (`.` dropped,
/// `..` popped) and must not climb above the root. Then the deepest
/// existing ancestor is canonicalized so a symlink inside the workspace
/// cannot redirect the write elsewhere. Returns the absolute path to write.
pub fn resolve_in_workspace(root: &Path, target: &str) -> Result<PathBuf, ExecError> {
    let root = root.canonicalize().map_err(|source| ExecError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let escape = || ExecError::PathEscape(PathBuf::from(target));
    // Absolute paths are accepted only when they land inside the root.
    let mut resolved = if Path::new(target).is_absolute() {
        PathBuf::new()
    } else {
        root.clone()
    };
    for component in Path::new(target).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => resolved.push(part),
            Component::ParentDir => {
                if resolved == root {
                    return Err(escape());
                }
                resolved.pop();
            }
            Component::RootDir | Component::Prefix(_) => resolved.push(component.as_os_str()),
        }
    }

    if !resolved.starts_with(&root) {
        return Err(escape());
    }
    if resolved == root {
        return Err(ExecError::Io {
            path: PathBuf::from(target),
            source: io::Error::new(io::ErrorKind::InvalidInput, "path names the workspace root"),
        });
    }

    let mut existing = resolved.as_path();
    while !existing.exists() && existing.symlink_metadata().is_err() {
        match existing.parent() {
            Some(parent) => existing = parent,
            None => break,
        }
    }
    let canonical = existing.canonicalize().map_err(|_| escape())?;
    if !canonical.starts_with(&root) {
        return Err(escape());
    }
    Ok(resolved)
}

/// `path` relative to `root` for display, falling back to `path` itself.
pub fn display_relative(root: &Path, path: &Path) -> String {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    path.strip_prefix(&root)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_relative_paths_resolve_inside() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(
            resolve_in_workspace(dir.path(), "a/b/c.txt").unwrap(),
            root.join("a/b/c.txt")
        );
        assert_eq!(
            resolve_in_workspace(dir.path(), "./a/../b.txt").unwrap(),
            root.join("b.txt")
        );
    }

    #[test]
    fn traversal_attempts_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for attempt in [
            "../evil.txt",
            "a/../../evil.txt",
            "./../../etc/passwd",
            "a/b/../../../x",
            "/etc/passwd",
            "/tmp/evil.txt",
        ] {
            let err = resolve_in_workspace(dir.path(), attempt).unwrap_err();
            assert!(matches!(err, ExecError::PathEscape(_)), "{attempt}: {err}");
        }
    }

    #[test]
    fn absolute_path_inside_root_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let inside = root.join("ok.txt");
        assert_eq!(
            resolve_in_workspace(dir.path(), inside.to_str().unwrap()).unwrap(),
            inside
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_workspace_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let err = resolve_in_workspace(dir.path(), "link/file.txt").unwrap_err();
        assert!(matches!(err, ExecError::PathEscape(_)));
    }

    #[test]
    fn root_itself_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_in_workspace(dir.path(), ".").unwrap_err(),
            ExecError::Io { .. }
        ));
    }
}
