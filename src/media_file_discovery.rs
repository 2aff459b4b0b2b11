use std::{
    collections::HashSet,
    fs::FileType,
    path::{Path, PathBuf},
};

use log::debug;
use walkdir::WalkDir;

use crate::metadata::audio_format;

pub const PLAYLIST_EXTENSIONS: [&str; 3] = ["m3u", "m3u8", "pls"];

pub fn is_supported_audio_file(path: &Path) -> bool {
    audio_format(path).is_some()
}

pub fn is_playlist_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            PLAYLIST_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

fn resolved_file_type(path: &Path, file_type: FileType) -> Option<FileType> {
    if !file_type.is_symlink() {
        return Some(file_type);
    }
    match std::fs::metadata(path) {
        Ok(metadata) => Some(metadata.file_type()),
        Err(err) => {
            debug!("Skipping dangling link {}: {}", path.display(), err);
            None
        }
    }
}

/// Every supported audio file below `folder_path`, sorted. Directory links are
/// followed once each; unreadable entries are skipped.
pub fn collect_audio_files_from_folder(folder_path: &Path) -> Vec<PathBuf> {
    let mut pending_directories = vec![folder_path.to_path_buf()];
    let mut visited_directories = HashSet::new();
    let mut tracks = Vec::new();

    while let Some(directory) = pending_directories.pop() {
        match std::fs::canonicalize(&directory) {
            Ok(canonical) => {
                if !visited_directories.insert(canonical) {
                    continue;
                }
            }
            Err(err) => {
                debug!("Failed to resolve directory {}: {}", directory.display(), err);
                continue;
            }
        }

        let entries = match std::fs::read_dir(&directory) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Failed to read directory {}: {}", directory.display(), err);
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(
                        "Failed to read a directory entry in {}: {}",
                        directory.display(),
                        err
                    );
                    continue;
                }
            };

            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    debug!("Failed to inspect {}: {}", path.display(), err);
                    continue;
                }
            };
            let Some(file_type) = resolved_file_type(&path, file_type) else {
                continue;
            };

            if file_type.is_dir() {
                pending_directories.push(path);
                continue;
            }

            if file_type.is_file() && is_supported_audio_file(&path) {
                tracks.push(path);
            }
        }
    }

    tracks.sort_unstable();
    tracks
}

/// Playlist files directly inside `directory` (not recursive), sorted.
pub fn collect_playlist_files(directory: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("Failed to read playlist directory {}: {}", directory.display(), err);
            return Vec::new();
        }
    };

    let mut playlists: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(err) => {
                debug!(
                    "Failed to read a directory entry in {}: {}",
                    directory.display(),
                    err
                );
                None
            }
        })
        .filter(|path| path.is_file() && is_playlist_file(path))
        .collect();
    playlists.sort_unstable();
    playlists
}

fn collect_at_depth(root: &Path, depth: usize, want_directories: bool) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(depth)
        .max_depth(depth)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!("Skipping unreadable entry under {}: {}", root.display(), err);
                continue;
            }
        };
        let file_type = entry.file_type();
        if (want_directories && file_type.is_dir()) || (!want_directories && file_type.is_file()) {
            paths.push(entry.into_path());
        }
    }
    paths
}

/// Regular files exactly `depth` levels below `root` (1 = direct children).
pub fn collect_files_at_depth(root: &Path, depth: usize) -> Vec<PathBuf> {
    collect_at_depth(root, depth, false)
}

/// Directories exactly `depth` levels below `root`.
pub fn collect_directories_at_depth(root: &Path, depth: usize) -> Vec<PathBuf> {
    collect_at_depth(root, depth, true)
}
