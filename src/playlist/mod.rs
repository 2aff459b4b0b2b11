//! Playlist file codecs: plain M3U, extended M3U, and PLS.
//!
//! Loading yields the absolute song paths in file order. Saving always
//! regenerates the whole file from the entries it is handed.

pub mod m3u;
pub mod playlist_format;
pub mod pls;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{LibraryError, Result};
use crate::path_guard;

pub use playlist_format::{write_atomically, PlaylistFormat, Substitution};

const UTF8_BOM: char = '\u{feff}';

/// On-disk playlist syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaylistVariant {
    #[default]
    M3u,
    Extm3u,
    Pls,
}

impl PlaylistVariant {
    /// Extension written for new files of this variant.
    pub fn extension(self) -> &'static str {
        match self {
            Self::M3u | Self::Extm3u => "m3u",
            Self::Pls => "pls",
        }
    }

    /// Picks the variant for an existing file by extension; `.m3u`/`.m3u8`
    /// files starting with `#EXTM3U` are extended M3U.
    pub fn detect(path: &Path) -> Result<Option<Self>> {
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("m3u") | Some("m3u8") => {
                let mut first_line = String::new();
                BufReader::new(File::open(path)?).read_line(&mut first_line)?;
                let first_line = first_line.trim_start_matches(UTF8_BOM).trim_end();
                if first_line == m3u::EXTENDED_HEADER {
                    Ok(Some(Self::Extm3u))
                } else {
                    Ok(Some(Self::M3u))
                }
            }
            Some("pls") => Ok(Some(Self::Pls)),
            _ => Ok(None),
        }
    }

    /// Serializes `entries` in the given order.
    pub fn render(self, entries: &[PlaylistEntry]) -> String {
        match self {
            Self::M3u => m3u::render_plain(entries),
            Self::Extm3u => m3u::render_extended(entries),
            Self::Pls => pls::render(entries),
        }
    }
}

/// One rendered line item of a playlist file.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub location: String,
    pub title: String,
    /// Seconds.
    pub length: Option<f64>,
}

impl PlaylistEntry {
    /// Length as written to extended M3U and PLS files: rounded seconds, or -1.
    pub fn rounded_length(&self) -> i64 {
        self.length.map_or(-1, |length| length.round() as i64)
    }
}

/// Reads the song paths listed in the playlist at `path`.
///
/// Relative entries are taken relative to `music_root`. Entries that resolve
/// outside `music_root` are skipped.
pub fn load(path: &Path, music_root: &Path) -> Result<Vec<PathBuf>> {
    let variant = PlaylistVariant::detect(path)?.ok_or_else(|| LibraryError::InvalidPlaylist {
        path: path.to_path_buf(),
        reason: "unsupported playlist format".to_string(),
    })?;

    let contents = std::fs::read_to_string(path)?;
    let contents = contents.trim_start_matches(UTF8_BOM);
    let locations = match variant {
        PlaylistVariant::M3u | PlaylistVariant::Extm3u => m3u::parse(contents),
        PlaylistVariant::Pls => pls::parse(contents).map_err(|reason| {
            LibraryError::InvalidPlaylist {
                path: path.to_path_buf(),
                reason,
            }
        })?,
    };

    let mut paths = Vec::with_capacity(locations.len());
    for location in locations {
        match path_guard::abspath(music_root, Path::new(&location)) {
            Ok(song_path) => paths.push(song_path),
            Err(LibraryError::PathViolation { .. }) => {
                debug!(
                    "Skipping playlist entry outside the music root: {} in {}",
                    location,
                    path.display()
                );
            }
            Err(err) => return Err(err),
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{load, PlaylistEntry, PlaylistVariant};
    use crate::error::LibraryError;

    fn entries(root: &std::path::Path) -> Vec<PlaylistEntry> {
        vec![
            PlaylistEntry {
                location: root.join("Artist/Album/01 Alpha.mp3").display().to_string(),
                title: "Alpha".to_string(),
                length: Some(181.5),
            },
            PlaylistEntry {
                location: root.join("Artist/Album/02 Beta.flac").display().to_string(),
                title: "Beta".to_string(),
                length: None,
            },
        ]
    }

    #[test]
    fn test_detect_sniffs_extended_header() {
        let dir = TempDir::new().expect("temp dir should be created");
        let plain = dir.path().join("plain.m3u");
        let extended = dir.path().join("extended.M3U8");
        let pls = dir.path().join("list.pls");
        fs::write(&plain, "/music/a.mp3\n").expect("plain playlist should be written");
        fs::write(&extended, "\u{feff}#EXTM3U\r\n\n/music/a.mp3\n")
            .expect("extended playlist should be written");

        assert_eq!(
            PlaylistVariant::detect(&plain).expect("detect should succeed"),
            Some(PlaylistVariant::M3u)
        );
        assert_eq!(
            PlaylistVariant::detect(&extended).expect("detect should succeed"),
            Some(PlaylistVariant::Extm3u)
        );
        assert_eq!(
            PlaylistVariant::detect(&pls).expect("pls detection should not read the file"),
            Some(PlaylistVariant::Pls)
        );
        assert_eq!(
            PlaylistVariant::detect(&dir.path().join("notes.txt")).expect("detect should succeed"),
            None
        );
    }

    #[test]
    fn test_each_variant_loads_back_what_it_renders() {
        let dir = TempDir::new().expect("temp dir should be created");
        let root = dir.path().join("music");
        fs::create_dir_all(&root).expect("music root should be created");
        let expected: Vec<_> = entries(&root)
            .iter()
            .map(|entry| std::path::PathBuf::from(&entry.location))
            .collect();

        for (variant, file_name) in [
            (PlaylistVariant::M3u, "plain.m3u"),
            (PlaylistVariant::Extm3u, "extended.m3u"),
            (PlaylistVariant::Pls, "list.pls"),
        ] {
            let path = dir.path().join(file_name);
            fs::write(&path, variant.render(&entries(&root))).expect("playlist should be written");
            assert_eq!(
                load(&path, &root).expect("playlist should load"),
                expected,
                "{variant:?} should reproduce its entries"
            );
        }
    }

    #[test]
    fn test_load_resolves_relative_entries_and_skips_escapes() {
        let dir = TempDir::new().expect("temp dir should be created");
        let root = dir.path().join("music");
        fs::create_dir_all(&root).expect("music root should be created");
        let path = dir.path().join("mixed.m3u");
        fs::write(
            &path,
            "# comment\nArtist/Album/01 Alpha.mp3\n\n../outside.mp3\n/etc/passwd\n",
        )
        .expect("playlist should be written");

        assert_eq!(
            load(&path, &root).expect("playlist should load"),
            vec![root.join("Artist/Album/01 Alpha.mp3")]
        );
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let dir = TempDir::new().expect("temp dir should be created");
        let path = dir.path().join("list.txt");
        fs::write(&path, "a.mp3\n").expect("file should be written");
        let error = load(&path, dir.path()).expect_err("unknown formats should be rejected");
        assert!(matches!(error, LibraryError::InvalidPlaylist { .. }));
    }
}
