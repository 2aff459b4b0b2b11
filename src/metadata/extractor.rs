//! Song record extraction from tagged audio files under the music root.

use std::path::{Path, PathBuf};

use log::debug;

use super::metadata_tags::{RawTags, TagReader};
use crate::error::{LibraryError, Result};
use crate::models::SongRecord;
use crate::path_guard;
use crate::sort_key::SortTagSettings;

/// A supported audio container and the ffmpeg codec that writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub extension: &'static str,
    pub ffmpeg_codec: &'static str,
}

pub const AUDIO_FORMATS: [AudioFormat; 7] = [
    AudioFormat { extension: "aac", ffmpeg_codec: "libfaac" },
    AudioFormat { extension: "flac", ffmpeg_codec: "flac" },
    AudioFormat { extension: "m4a", ffmpeg_codec: "libfaac" },
    AudioFormat { extension: "mp3", ffmpeg_codec: "libmp3lame" },
    AudioFormat { extension: "ogg", ffmpeg_codec: "libvorbis" },
    AudioFormat { extension: "wav", ffmpeg_codec: "pcm_s16le" },
    AudioFormat { extension: "wma", ffmpeg_codec: "wmav2" },
];

/// Looks up the format of `path` by its (case-insensitive) extension.
pub fn audio_format(path: &Path) -> Option<AudioFormat> {
    let extension = path.extension()?.to_str()?;
    AUDIO_FORMATS
        .iter()
        .copied()
        .find(|format| extension.eq_ignore_ascii_case(format.extension))
}

/// Parses the run of ASCII digits at the start of `value` ("3", "3/12").
/// Anything else, including leading whitespace, an empty run or overflow, is `None`.
pub fn parse_leading_number(value: &str) -> Option<u32> {
    let end = value
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(value.len(), |(index, _)| index);
    value[..end].parse().ok()
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

pub struct MetadataExtractor {
    music_root: PathBuf,
    sort_tags: SortTagSettings,
    reader: Box<dyn TagReader>,
}

impl MetadataExtractor {
    pub fn new(music_root: PathBuf, sort_tags: SortTagSettings, reader: Box<dyn TagReader>) -> Self {
        Self {
            music_root,
            sort_tags,
            reader,
        }
    }

    /// Builds the record for the file at `path` (absolute, or relative to the music root).
    ///
    /// Unsupported extensions and unreadable tags yield `Ok(None)`.
    pub fn extract(&self, path: &Path) -> Result<Option<SongRecord>> {
        if audio_format(path).is_none() {
            return Ok(None);
        }

        let canonical = path_guard::require(&self.music_root, path)?;
        let relpath = path_guard::relpath(&self.music_root, path)?;
        if !canonical.is_file() {
            return Err(LibraryError::NotFound(format!(
                "the song {} does not exist or is not a regular file",
                relpath.display()
            )));
        }
        let relpath_text = path_guard::path_str(&relpath)?.to_string();

        let Some(tags) = self.reader.read(&canonical) else {
            debug!("Skipping {}: tags could not be read", relpath.display());
            return Ok(None);
        };

        Ok(Some(self.build_record(&relpath, relpath_text, &tags)))
    }

    fn build_record(&self, relpath: &Path, relpath_text: String, tags: &RawTags) -> SongRecord {
        let title = non_empty(&tags.title).map(str::to_string).unwrap_or_else(|| {
            relpath
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        let (artist, artist_sort) = [
            (&tags.artist, &tags.artist_sort),
            (&tags.performer, &tags.performer_sort),
            (&tags.album_artist, &tags.album_artist_sort),
        ]
        .into_iter()
        .find_map(|(value, sort)| non_empty(value).map(|value| (value.to_string(), sort.as_str())))
        .unwrap_or_default();
        let artist_sort = non_empty(artist_sort);

        let album = tags.album.trim().to_string();

        SongRecord {
            sort_title: self.sort_tags.title.sort_key(
                relpath,
                &title,
                non_empty(&tags.title_sort),
            ),
            sort_artist: self.sort_tags.artist.sort_key(relpath, &artist, artist_sort),
            sort_album: self.sort_tags.album.sort_key(
                relpath,
                &album,
                non_empty(&tags.album_sort),
            ),
            relpath: relpath_text,
            title,
            artist,
            album,
            length: tags.length,
            disc_number: parse_leading_number(&tags.disc_number),
            track_number: parse_leading_number(&tags.track_number),
        }
    }
}
