//! Library housekeeping: normalized permissions and album-art files.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::media_file_discovery::is_supported_audio_file;
use crate::metadata::metadata_tags::read_embedded_cover_art;
use crate::path_guard;

/// Depth of album directories below the music root (`Artist/Album`).
const ALBUM_DEPTH: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    /// Every entry was reachable and had its mode set.
    pub permissions_ok: bool,
    /// Every album directory has an album-art file.
    pub albumart_ok: bool,
    /// Album directories (relative to the music root) still lacking album art.
    pub missing_albumart: Vec<PathBuf>,
}

/// Sets files to `0644` and directories to `0755`, and writes `albumart_filename`
/// into every album directory lacking one from the first embedded picture found.
///
/// Entries whose canonical path leaves `music_root` (through a symlink) are
/// left alone and clear `permissions_ok`.
pub fn sanitize(music_root: &Path, albumart_filename: &str) -> SanitizeReport {
    sanitize_with(music_root, albumart_filename, read_embedded_cover_art)
}

pub(crate) fn sanitize_with<F>(
    music_root: &Path,
    albumart_filename: &str,
    read_cover_art: F,
) -> SanitizeReport
where
    F: Fn(&Path) -> Option<Vec<u8>>,
{
    let mut report = SanitizeReport {
        permissions_ok: true,
        albumart_ok: true,
        missing_albumart: Vec::new(),
    };

    for entry in WalkDir::new(music_root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Could not access {}", err);
                report.permissions_ok = false;
                continue;
            }
        };
        let path = entry.path();
        if let Err(err) = path_guard::require(music_root, path) {
            warn!("Not touching {}: {}", path.display(), err);
            report.permissions_ok = false;
            continue;
        }
        let is_directory = entry.file_type().is_dir();

        if let Err(err) = set_mode(path, is_directory) {
            warn!("Could not set permissions on {}: {}", path.display(), err);
            report.permissions_ok = false;
        }

        if is_directory && entry.depth() == ALBUM_DEPTH {
            let has_album_art = write_album_art(path, albumart_filename, &read_cover_art)
                .unwrap_or_else(|err| {
                    warn!("Could not write album art in {}: {}", path.display(), err);
                    false
                });
            if !has_album_art {
                let relpath = path.strip_prefix(music_root).unwrap_or(path);
                warn!("Could not find album art in {}", relpath.display());
                report.albumart_ok = false;
                report.missing_albumart.push(relpath.to_path_buf());
            }
        }
    }

    info!(
        "Sanitized {}: permissions {}, {} album(s) without album art",
        music_root.display(),
        if report.permissions_ok { "ok" } else { "incomplete" },
        report.missing_albumart.len()
    );
    report
}

#[cfg(unix)]
fn set_mode(path: &Path, is_directory: bool) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = if is_directory { 0o755 } else { 0o644 };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _is_directory: bool) -> std::io::Result<()> {
    Ok(())
}

/// Returns whether the album directory has album art afterwards.
fn write_album_art<F>(
    album_directory: &Path,
    albumart_filename: &str,
    read_cover_art: &F,
) -> std::io::Result<bool>
where
    F: Fn(&Path) -> Option<Vec<u8>>,
{
    let target = album_directory.join(albumart_filename);
    if target.exists() {
        return Ok(true);
    }

    let mut candidates: Vec<PathBuf> = fs::read_dir(album_directory)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file() && is_supported_audio_file(path))
        .collect();
    candidates.sort_unstable();

    for candidate in candidates {
        if let Some(picture) = read_cover_art(&candidate) {
            fs::write(&target, picture)?;
            debug!("Made {} from {}", target.display(), candidate.display());
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use tempfile::TempDir;

    use super::sanitize_with;

    fn library() -> TempDir {
        let dir = TempDir::new().expect("temp dir should be created");
        for album in ["Artist/With Art", "Artist/Without Art", "Other/Has File"] {
            fs::create_dir_all(dir.path().join(album)).expect("album dir should be created");
        }
        fs::write(dir.path().join("Artist/With Art/01 A.mp3"), b"art").expect("track");
        fs::write(dir.path().join("Artist/Without Art/01 B.flac"), b"").expect("track");
        fs::write(dir.path().join("Other/Has File/albumart.jpg"), b"old").expect("art");
        dir
    }

    fn fake_cover(path: &Path) -> Option<Vec<u8>> {
        let bytes = fs::read(path).ok()?;
        (!bytes.is_empty()).then_some(bytes)
    }

    #[test]
    fn test_sanitize_writes_missing_album_art_and_reports_the_rest() {
        let dir = library();
        let report = sanitize_with(dir.path(), "albumart.jpg", fake_cover);

        assert_eq!(
            fs::read(dir.path().join("Artist/With Art/albumart.jpg"))
                .expect("album art should be written"),
            b"art"
        );
        assert_eq!(
            fs::read(dir.path().join("Other/Has File/albumart.jpg"))
                .expect("existing album art should remain"),
            b"old"
        );
        assert!(!report.albumart_ok);
        assert_eq!(report.missing_albumart, vec![PathBuf::from("Artist/Without Art")]);
        assert!(report.permissions_ok);
    }

    #[cfg(unix)]
    #[test]
    fn test_sanitize_normalizes_modes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = library();
        let track = dir.path().join("Artist/With Art/01 A.mp3");
        fs::set_permissions(&track, fs::Permissions::from_mode(0o600)).expect("chmod");
        fs::set_permissions(dir.path().join("Other"), fs::Permissions::from_mode(0o700))
            .expect("chmod");

        sanitize_with(dir.path(), "albumart.jpg", |_| None);

        let mode = |path: PathBuf| {
            fs::metadata(path)
                .expect("metadata should be readable")
                .permissions()
                .mode()
                & 0o777
        };
        assert_eq!(mode(track), 0o644);
        assert_eq!(mode(dir.path().join("Other")), 0o755);
    }

    #[cfg(unix)]
    #[test]
    fn test_sanitize_leaves_symlinked_albums_outside_the_root_alone() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("temp dir should be created");
        let music = dir.path().join("music");
        let outside = dir.path().join("outside/Album");
        fs::create_dir_all(music.join("Artist")).expect("artist dir should be created");
        fs::create_dir_all(&outside).expect("outside album should be created");
        let track = outside.join("01 A.mp3");
        fs::write(&track, b"art").expect("track should be written");
        fs::set_permissions(&track, fs::Permissions::from_mode(0o600)).expect("chmod");
        std::os::unix::fs::symlink(&outside, music.join("Artist/Album"))
            .expect("symlink should be created");

        let report = sanitize_with(&music, "albumart.jpg", fake_cover);

        assert!(!report.permissions_ok);
        assert!(!outside.join("albumart.jpg").exists());
        assert_eq!(
            fs::metadata(&track)
                .expect("metadata should be readable")
                .permissions()
                .mode()
                & 0o777,
            0o600
        );
    }
}
