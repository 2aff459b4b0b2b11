//! Root containment checks for every path the engine touches.
//!
//! Paths are compared in canonical form: symlinks followed and `..` removed.
//! Components that do not exist yet (a move destination, a new playlist file)
//! are appended lexically to the deepest existing ancestor, so containment can
//! be checked before anything is created.

use std::path::{Component, Path, PathBuf};

use crate::error::{LibraryError, Result};

/// Resolves `path` to a canonical absolute path.
pub fn resolve(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut resolved = PathBuf::new();
    let mut on_disk = true;

    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                if on_disk {
                    match std::fs::canonicalize(&resolved) {
                        Ok(canonical) => resolved = canonical,
                        Err(_) => on_disk = false,
                    }
                }
            }
        }
    }

    Ok(resolved)
}

fn joined_under(root: &Path, candidate: &Path) -> PathBuf {
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    }
}

/// Returns whether `candidate` (absolute, or relative to `root`) resolves inside `root`.
pub fn contains(root: &Path, candidate: &Path) -> Result<bool> {
    let canonical_root = resolve(root)?;
    let canonical = resolve(&joined_under(root, candidate))?;
    Ok(canonical.starts_with(&canonical_root))
}

/// Returns the canonical form of `candidate`, or `PathViolation` when it escapes `root`.
pub fn require(root: &Path, candidate: &Path) -> Result<PathBuf> {
    let canonical_root = resolve(root)?;
    let joined = joined_under(root, candidate);
    let canonical = resolve(&joined)?;
    if canonical.starts_with(&canonical_root) {
        Ok(canonical)
    } else {
        Err(LibraryError::PathViolation {
            path: joined,
            root: root.to_path_buf(),
        })
    }
}

/// Canonical path of `candidate` relative to the canonical `root`.
pub fn relpath(root: &Path, candidate: &Path) -> Result<PathBuf> {
    let canonical = require(root, candidate)?;
    let canonical_root = resolve(root)?;
    canonical
        .strip_prefix(&canonical_root)
        .map(Path::to_path_buf)
        .map_err(|_| LibraryError::PathViolation {
            path: candidate.to_path_buf(),
            root: root.to_path_buf(),
        })
}

/// Absolute (not canonicalized) path of `candidate` under `root`, after a containment check.
pub fn abspath(root: &Path, candidate: &Path) -> Result<PathBuf> {
    require(root, candidate)?;
    Ok(std::path::absolute(joined_under(root, candidate))?)
}

/// Borrows `path` as UTF-8, failing with `PathEncoding` for undecodable names.
pub fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| LibraryError::PathEncoding(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::{contains, relpath, require, resolve};
    use crate::error::LibraryError;

    fn music_root() -> TempDir {
        let dir = TempDir::new().expect("temp dir should be created");
        fs::create_dir_all(dir.path().join("music/Artist/Album")).expect("tree should be created");
        fs::write(dir.path().join("music/Artist/Album/01 Track.mp3"), b"")
            .expect("fixture should be written");
        dir
    }

    #[test]
    fn test_contains_accepts_relative_child() {
        let dir = music_root();
        let root = dir.path().join("music");
        assert!(contains(&root, Path::new("Artist/Album/01 Track.mp3")).expect("should resolve"));
    }

    #[test]
    fn test_contains_accepts_missing_child_inside_root() {
        let dir = music_root();
        let root = dir.path().join("music");
        assert!(contains(&root, Path::new("New Artist/New Album")).expect("should resolve"));
    }

    #[test]
    fn test_contains_rejects_parent_escape() {
        let dir = music_root();
        let root = dir.path().join("music");
        assert!(!contains(&root, Path::new("Artist/../../elsewhere")).expect("should resolve"));
    }

    #[test]
    fn test_contains_rejects_sibling_with_shared_prefix() {
        let dir = music_root();
        fs::create_dir_all(dir.path().join("music2")).expect("sibling should be created");
        let root = dir.path().join("music");
        assert!(!contains(&root, &dir.path().join("music2")).expect("should resolve"));
    }

    #[cfg(unix)]
    #[test]
    fn test_contains_follows_symlinks_out_of_root() {
        let dir = music_root();
        fs::create_dir_all(dir.path().join("outside")).expect("outside dir should be created");
        let root = dir.path().join("music");
        std::os::unix::fs::symlink(dir.path().join("outside"), root.join("escape"))
            .expect("symlink should be created");
        assert!(!contains(&root, Path::new("escape/file.mp3")).expect("should resolve"));
    }

    #[test]
    fn test_require_reports_path_violation() {
        let dir = music_root();
        let root = dir.path().join("music");
        let error = require(&root, Path::new("/")).expect_err("root dir should be rejected");
        assert!(matches!(error, LibraryError::PathViolation { .. }));
    }

    #[test]
    fn test_relpath_strips_canonical_root() {
        let dir = music_root();
        let root = dir.path().join("music");
        let absolute = root.join("Artist/./Album/../Album/01 Track.mp3");
        assert_eq!(
            relpath(&root, &absolute).expect("path should be inside root"),
            Path::new("Artist/Album/01 Track.mp3")
        );
    }

    #[test]
    fn test_resolve_removes_parent_segments_of_missing_tail() {
        let dir = music_root();
        let root = resolve(&dir.path().join("music")).expect("root should resolve");
        let resolved = resolve(&root.join("missing/deeper/../leaf")).expect("should resolve");
        assert_eq!(resolved, root.join("missing/leaf"));
    }
}
