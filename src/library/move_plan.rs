//! Worklist for moving a file or directory inside the music root.
//!
//! [`MovePlan::new`] only inspects the filesystem: it resolves both ends,
//! rejects moves that cannot succeed, and lists every `(old, new)` relpath
//! pair up front. [`MovePlan::apply`] then renames one entry at a time. An
//! entry leaves `remaining` only after its rename succeeded, so after a failure
//! `completed` holds exactly the files that did move.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::error::{LibraryError, Result};
use crate::path_guard;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    source: PathBuf,
    destination: PathBuf,
    source_is_directory: bool,
    /// `(old, new)` subdirectory pairs in walk order (parents first).
    directories: Vec<(PathBuf, PathBuf)>,
    remaining: VecDeque<(PathBuf, PathBuf)>,
    completed: Vec<(PathBuf, PathBuf)>,
}

impl MovePlan {
    /// Plans moving `src` to `dst`, both absolute or relative to `music_root`.
    ///
    /// A directory source is merged into `dst` (created when missing). A file
    /// moved onto an existing directory keeps its file name.
    pub fn new(music_root: &Path, src: &Path, dst: &Path) -> Result<Self> {
        let root = path_guard::resolve(music_root)?;
        let source = path_guard::relpath(music_root, src)?;
        let mut destination = path_guard::relpath(music_root, dst)?;
        let invalid = |reason: &str| LibraryError::InvalidMove {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            reason: reason.to_string(),
        };

        if source.as_os_str().is_empty() {
            return Err(invalid("the music root itself cannot be moved"));
        }
        let source_abs = root.join(&source);
        if !source_abs.exists() {
            return Err(LibraryError::NotFound(format!(
                "{} does not exist",
                source.display()
            )));
        }

        let mut plan = Self {
            source,
            destination: PathBuf::new(),
            source_is_directory: source_abs.is_dir(),
            directories: Vec::new(),
            remaining: VecDeque::new(),
            completed: Vec::new(),
        };

        if plan.source_is_directory {
            let destination_abs = root.join(&destination);
            if destination_abs.exists() && !destination_abs.is_dir() {
                return Err(invalid(
                    "if the source is a directory, the destination must also be one",
                ));
            }
            if destination.starts_with(&plan.source) {
                return Err(invalid("the destination is inside the source"));
            }

            for entry in WalkDir::new(&source_abs).min_depth(1).sort_by_file_name() {
                let entry = entry.map_err(io::Error::from)?;
                let inner = entry
                    .path()
                    .strip_prefix(&source_abs)
                    .map_err(|_| invalid("the source changed while it was being listed"))?;
                let pair = (plan.source.join(inner), destination.join(inner));
                if entry.file_type().is_dir() {
                    plan.directories.push(pair);
                } else {
                    plan.remaining.push_back(pair);
                }
            }
        } else {
            if root.join(&destination).is_dir() {
                if let Some(file_name) = plan.source.file_name() {
                    destination.push(file_name);
                }
            }
            if destination == plan.source {
                return Err(invalid("the source and destination are the same"));
            }
            plan.remaining
                .push_back((plan.source.clone(), destination.clone()));
        }

        if let Some((_, taken)) = plan
            .remaining
            .iter()
            .find(|(_, new)| root.join(new).symlink_metadata().is_ok())
        {
            return Err(invalid(&format!("{} already exists", taken.display())));
        }

        plan.destination = destination;
        Ok(plan)
    }

    /// Source relpath.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Destination relpath. For a file moved into a directory this includes the file name.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn is_directory_move(&self) -> bool {
        self.source_is_directory
    }

    /// File moves not yet performed.
    pub fn remaining(&self) -> impl Iterator<Item = &(PathBuf, PathBuf)> {
        self.remaining.iter()
    }

    /// File moves performed so far, in order.
    pub fn completed(&self) -> &[(PathBuf, PathBuf)] {
        &self.completed
    }

    /// Completed moves as UTF-8 relpath pairs, the form songs are stored under.
    /// Pairs that are not valid UTF-8 cannot name a stored song and are left out.
    pub fn completed_relpaths(&self) -> Vec<(String, String)> {
        utf8_pairs(&self.completed)
    }

    /// Performs the remaining renames, then removes the emptied source directories.
    pub fn apply(&mut self, music_root: &Path) -> Result<()> {
        let root = path_guard::resolve(music_root)?;

        if self.source_is_directory {
            fs::create_dir_all(root.join(&self.destination))?;
            for (_, new_directory) in &self.directories {
                fs::create_dir_all(root.join(new_directory))?;
            }
        }

        while let Some((old, new)) = self.remaining.front().cloned() {
            let target = root.join(&new);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(root.join(&old), &target)?;
            debug!("Moved {} to {}", old.display(), new.display());
            self.remaining.pop_front();
            self.completed.push((old, new));
        }

        if self.source_is_directory {
            let emptied = self
                .directories
                .iter()
                .rev()
                .map(|(old, _)| old)
                .chain(std::iter::once(&self.source));
            for old_directory in emptied {
                if let Err(err) = fs::remove_dir(root.join(old_directory)) {
                    warn!(
                        "Could not remove moved directory {}: {}",
                        old_directory.display(),
                        err
                    );
                }
            }
        }
        Ok(())
    }
}

/// `(old, new)` pairs as UTF-8 strings, leaving out pairs that are not valid UTF-8.
pub(crate) fn utf8_pairs(pairs: &[(PathBuf, PathBuf)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .filter_map(|(old, new)| Some((old.to_str()?.to_string(), new.to_str()?.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use tempfile::TempDir;

    use super::MovePlan;
    use crate::error::LibraryError;

    fn music_root() -> TempDir {
        let dir = TempDir::new().expect("temp dir should be created");
        let album = dir.path().join("Artist/Album");
        fs::create_dir_all(album.join("Scans")).expect("album dirs should be created");
        for name in ["02 B.mp3", "01 A.mp3", "Scans/front.jpg"] {
            fs::write(album.join(name), name).expect("fixture should be written");
        }
        fs::create_dir_all(dir.path().join("Other")).expect("other dir should be created");
        dir
    }

    fn pair(old: &str, new: &str) -> (PathBuf, PathBuf) {
        (PathBuf::from(old), PathBuf::from(new))
    }

    #[test]
    fn test_plan_lists_directory_contents_without_touching_disk() {
        let dir = music_root();
        let plan = MovePlan::new(dir.path(), Path::new("Artist/Album"), Path::new("Artist/Renamed"))
            .expect("plan should be built");

        assert!(plan.is_directory_move());
        assert_eq!(
            plan.remaining().cloned().collect::<Vec<_>>(),
            vec![
                pair("Artist/Album/01 A.mp3", "Artist/Renamed/01 A.mp3"),
                pair("Artist/Album/02 B.mp3", "Artist/Renamed/02 B.mp3"),
                pair("Artist/Album/Scans/front.jpg", "Artist/Renamed/Scans/front.jpg"),
            ]
        );
        assert!(plan.completed().is_empty());
        assert!(dir.path().join("Artist/Album/01 A.mp3").is_file());
        assert!(!dir.path().join("Artist/Renamed").exists());
    }

    #[test]
    fn test_apply_moves_directory_and_removes_source() {
        let dir = music_root();
        let mut plan =
            MovePlan::new(dir.path(), Path::new("Artist/Album"), Path::new("Other/Album"))
                .expect("plan should be built");
        plan.apply(dir.path()).expect("move should succeed");

        assert!(!dir.path().join("Artist/Album").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("Other/Album/Scans/front.jpg"))
                .expect("moved file should be readable"),
            "Scans/front.jpg"
        );
        assert_eq!(plan.remaining().count(), 0);
        assert_eq!(
            plan.completed_relpaths()[0],
            (
                "Artist/Album/01 A.mp3".to_string(),
                "Other/Album/01 A.mp3".to_string()
            )
        );
    }

    #[test]
    fn test_file_moved_onto_directory_keeps_its_name() {
        let dir = music_root();
        let mut plan = MovePlan::new(
            dir.path(),
            &dir.path().join("Artist/Album/01 A.mp3"),
            Path::new("Other"),
        )
        .expect("plan should be built");
        assert_eq!(plan.destination(), Path::new("Other/01 A.mp3"));

        plan.apply(dir.path()).expect("move should succeed");
        assert!(dir.path().join("Other/01 A.mp3").is_file());
        assert!(dir.path().join("Artist/Album/02 B.mp3").is_file());
        assert_eq!(plan.completed(), &[pair("Artist/Album/01 A.mp3", "Other/01 A.mp3")]);
    }

    #[test]
    fn test_interrupted_apply_keeps_unmoved_entries() {
        let dir = music_root();
        let mut plan = MovePlan::new(dir.path(), Path::new("Artist/Album"), Path::new("Other"))
            .expect("plan should be built");
        fs::remove_file(dir.path().join("Artist/Album/02 B.mp3"))
            .expect("fixture should be removed");

        plan.apply(dir.path())
            .expect_err("a vanished source file should stop the move");
        assert_eq!(plan.completed(), &[pair("Artist/Album/01 A.mp3", "Other/01 A.mp3")]);
        assert_eq!(plan.remaining().count(), 2);
        assert!(dir.path().join("Artist/Album/Scans/front.jpg").is_file());
    }

    #[test]
    fn test_plan_rejects_impossible_moves() {
        let dir = music_root();

        let into_itself =
            MovePlan::new(dir.path(), Path::new("Artist"), Path::new("Artist/Album/Nested"))
                .expect_err("moving a directory into itself should fail");
        assert!(matches!(into_itself, LibraryError::InvalidMove { .. }));

        let occupied = MovePlan::new(
            dir.path(),
            Path::new("Artist/Album/01 A.mp3"),
            Path::new("Artist/Album/02 B.mp3"),
        )
        .expect_err("overwriting a file should fail");
        assert!(matches!(occupied, LibraryError::InvalidMove { .. }));

        let missing = MovePlan::new(dir.path(), Path::new("Nobody"), Path::new("Other/Nobody"))
            .expect_err("a missing source should fail");
        assert!(matches!(missing, LibraryError::NotFound(_)));

        let escaped = MovePlan::new(dir.path(), Path::new("Artist"), Path::new("../Artist"))
            .expect_err("a destination outside the root should fail");
        assert!(matches!(escaped, LibraryError::PathViolation { .. }));
    }
}
