//! Workspace path containment
//!
//! Every path a tool touches is resolved against a fixed root and verified to
//! stay under it, including through symlinks of existing ancestors.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};

/// Directory under the root that receives overwritten files
pub const TRASH_DIR: &str = "deleted-modified";

/// Error returned when a path escapes the workspace
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Access Denied: Path '{path}' is outside the workspace")]
    OutsideRoot { path: String },

    #[error("Access Denied: Path '{path}' could not be resolved: {reason}")]
    Unresolvable { path: String, reason: String },
}

/// A directory that file tools are confined to
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open (creating if necessary) a workspace rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create workspace {}", root.display()))?;
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve workspace {}", root.display()))?;

        Ok(Self { root })
    }

    /// Canonical root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding previous versions of overwritten files
    pub fn trash_dir(&self) -> PathBuf {
        self.root.join(TRASH_DIR)
    }

    /// Resolve `target` (relative to the root, or absolute) and verify it
    /// stays inside the workspace
    pub fn resolve(&self, target: &str) -> Result<PathBuf, WorkspaceError> {
        let raw = Path::new(target.trim());
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.root.join(raw)
        };

        let normalized = normalize(&joined).ok_or_else(|| WorkspaceError::OutsideRoot {
            path: target.to_string(),
        })?;
        if !normalized.starts_with(&self.root) {
            return Err(WorkspaceError::OutsideRoot {
                path: target.to_string(),
            });
        }

        // Symlinks of existing ancestors must not lead out of the root
        let existing = normalized
            .ancestors()
            .find(|p| p.exists())
            .unwrap_or(&self.root);
        let real = existing
            .canonicalize()
            .map_err(|e| WorkspaceError::Unresolvable {
                path: target.to_string(),
                reason: e.to_string(),
            })?;
        if !real.starts_with(&self.root) {
            return Err(WorkspaceError::OutsideRoot {
                path: target.to_string(),
            });
        }

        match normalized.strip_prefix(existing) {
            Ok(remainder) if !remainder.as_os_str().is_empty() => Ok(real.join(remainder)),
            _ => Ok(real),
        }
    }

}

/// Lexically resolve `.` and `..`; `None` when `..` climbs above the filesystem root
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_relative() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();

        let path = ws.resolve("notes/a.txt").unwrap();
        assert!(path.starts_with(ws.root()));
        assert!(path.ends_with("notes/a.txt"));
    }

    #[test]
    fn test_resolve_existing_file_and_dir() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        std::fs::create_dir_all(ws.root().join("kb")).unwrap();
        std::fs::write(ws.root().join("a.txt"), "hi").unwrap();

        let file = ws.resolve("a.txt").unwrap();
        assert_eq!(file, ws.root().join("a.txt"));
        assert!(file.is_file());

        let nested = ws.resolve("kb/../a.txt").unwrap();
        assert!(nested.is_file());

        let kb = ws.resolve("kb").unwrap();
        assert!(kb.is_dir());
        assert_eq!(ws.resolve(".").unwrap(), ws.root());
    }

    #[test]
    fn test_resolve_dot_segments_inside() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();

        let path = ws.resolve("./a/../b.txt").unwrap();
        assert_eq!(path, ws.root().join("b.txt"));
    }

    #[test]
    fn test_rejects_parent_escape() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();

        let err = ws.resolve("../outside.txt").unwrap_err();
        assert!(err.to_string().contains("Access Denied"));
        assert!(ws.resolve("a/../../../etc/passwd").is_err());
    }

    #[test]
    fn test_rejects_absolute_outside() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();

        assert!(ws.resolve("/etc/passwd").is_err());
        let inside = ws.root().join("x.txt");
        assert!(ws.resolve(inside.to_str().unwrap()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_symlink_escape() {
        let outside = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        std::os::unix::fs::symlink(outside.path(), ws.root().join("link")).unwrap();

        assert!(ws.resolve("link/secret.txt").is_err());
    }
}
