//! One configured output format: where its files live and how they are written.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use regex::{Regex, RegexBuilder};

use super::{PlaylistEntry, PlaylistVariant};
use crate::error::{LibraryError, Result};
use crate::models::{PathAttr, Song};
use crate::path_guard;
use crate::text_template;

/// A text rewrite applied to a rendered playlist before it is written.
#[derive(Debug, Clone)]
pub enum Substitution {
    Literal { pattern: String, replacement: String },
    /// `replacement` may refer to capture groups as `$1` or `${name}`.
    Regex { pattern: Regex, replacement: String },
}

impl Substitution {
    pub fn literal(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self::Literal {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    /// Compiles `pattern` in multi-line mode, so `^`/`$` anchor at each playlist line.
    pub fn regex(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let compiled = RegexBuilder::new(pattern)
            .multi_line(true)
            .build()
            .map_err(|err| LibraryError::Config(format!("invalid substitution '{pattern}': {err}")))?;
        Ok(Self::Regex {
            pattern: compiled,
            replacement: replacement.into(),
        })
    }

    pub fn apply(&self, text: &str) -> String {
        match self {
            Self::Literal {
                pattern,
                replacement,
            } => {
                if pattern.is_empty() {
                    text.to_string()
                } else {
                    text.replace(pattern.as_str(), replacement)
                }
            }
            Self::Regex {
                pattern,
                replacement,
            } => pattern.replace_all(text, replacement.as_str()).into_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaylistFormat {
    /// Absolute directory holding this format's files.
    pub directory: PathBuf,
    pub variant: PlaylistVariant,
    pub is_default: bool,
    pub title_format: String,
    pub mp3_only: bool,
    pub absolute_paths: bool,
    pub substitutions: Vec<Substitution>,
}

impl PlaylistFormat {
    pub fn new(directory: PathBuf, variant: PlaylistVariant) -> Self {
        Self {
            directory,
            variant,
            is_default: false,
            title_format: text_template::DEFAULT_TITLE_FORMAT.to_string(),
            mp3_only: false,
            absolute_paths: true,
            substitutions: Vec::new(),
        }
    }

    pub fn file_name(&self, playlist_name: &str) -> String {
        format!("{playlist_name}.{}", self.variant.extension())
    }

    /// Path of the file for `playlist_name`; fails when the name escapes the directory.
    pub fn path(&self, playlist_name: &str) -> Result<PathBuf> {
        path_guard::abspath(&self.directory, Path::new(&self.file_name(playlist_name)))
    }

    pub fn path_attr(&self) -> PathAttr {
        PathAttr::for_format(self.mp3_only, self.absolute_paths)
    }

    pub fn entries(&self, songs: &[Song], music_root: &Path) -> Vec<PlaylistEntry> {
        let path_attr = self.path_attr();
        songs
            .iter()
            .map(|song| PlaylistEntry {
                location: song.location(path_attr, music_root),
                title: text_template::render_song_title(&self.title_format, song),
                length: song.length,
            })
            .collect()
    }

    /// Full file contents for `songs`, in the order given, after substitutions.
    pub fn render(&self, songs: &[Song], music_root: &Path) -> String {
        let rendered = self.variant.render(&self.entries(songs, music_root));
        self.substitutions
            .iter()
            .fold(rendered, |text, substitution| substitution.apply(&text))
    }

    /// Regenerates the file for `playlist_name`. The file is replaced atomically.
    pub fn write(&self, playlist_name: &str, songs: &[Song], music_root: &Path) -> Result<PathBuf> {
        let target_path = self.path(playlist_name)?;
        write_atomically(&target_path, &self.render(songs, music_root))?;

        debug!(
            "Wrote {} song(s) to playlist file {}",
            songs.len(),
            target_path.display()
        );
        Ok(target_path)
    }
}

/// Replaces `target_path` with `contents` through a sibling `.tmp` file and a rename.
pub fn write_atomically(target_path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = target_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp_name = target_path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    if temp_path.exists() {
        let _ = fs::remove_file(&temp_path);
    }
    fs::write(&temp_path, contents)?;
    fs::rename(&temp_path, target_path)?;
    Ok(())
}
