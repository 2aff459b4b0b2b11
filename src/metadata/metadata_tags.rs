//! Tag, length, and cover-art readers backed by `lofty`, with a `symphonia` fallback.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use lofty::config::{ParseOptions, ParsingMode, WriteOptions};
use lofty::file::{AudioFile, TaggedFile, TaggedFileExt};
use lofty::prelude::Accessor;
use lofty::probe::Probe;
use lofty::read_from_path;
use lofty::tag::{ItemKey, Tag};
use log::{debug, warn};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{
    MetadataOptions, MetadataRevision, StandardTagKey, StandardVisualKey, Value as SymphoniaValue,
};
use symphonia::core::probe::Hint;

use crate::error::{LibraryError, Result};

/// Raw tag values as read from a file. Empty strings mean the tag is absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTags {
    pub title: String,
    pub artist: String,
    pub performer: String,
    pub album_artist: String,
    pub album: String,
    pub disc_number: String,
    pub track_number: String,
    /// Seconds.
    pub length: Option<f64>,
    pub title_sort: String,
    pub artist_sort: String,
    pub performer_sort: String,
    pub album_artist_sort: String,
    pub album_sort: String,
}

/// Tag-reading capability consumed by the metadata extractor.
pub trait TagReader {
    /// Returns `None` when the file cannot be parsed as tagged audio.
    fn read(&self, path: &Path) -> Option<RawTags>;
}

/// Reads tags with `lofty`, falling back to `symphonia` for files lofty rejects.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read(&self, path: &Path) -> Option<RawTags> {
        read_raw_tags(path)
    }
}

fn first_non_empty_value<F>(primary_tag: Option<&Tag>, tags: &[Tag], mut extractor: F) -> String
where
    F: FnMut(&Tag) -> Option<String>,
{
    if let Some(tag) = primary_tag {
        if let Some(value) = extractor(tag) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    for tag in tags {
        if let Some(value) = extractor(tag) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    String::new()
}

fn metadata_parse_options(
    read_properties: bool,
    read_cover_art: bool,
    parsing_mode: ParsingMode,
    max_junk_bytes: usize,
) -> ParseOptions {
    ParseOptions::new()
        .read_properties(read_properties)
        .read_cover_art(read_cover_art)
        .parsing_mode(parsing_mode)
        .max_junk_bytes(max_junk_bytes)
}

fn read_tagged_file(path: &Path, read_properties: bool, read_cover_art: bool) -> Option<TaggedFile> {
    let primary_options =
        metadata_parse_options(read_properties, read_cover_art, ParsingMode::BestAttempt, 1024);
    let relaxed_options =
        metadata_parse_options(read_properties, read_cover_art, ParsingMode::Relaxed, 64 * 1024);

    match Probe::open(path) {
        Ok(probe) => match probe.options(primary_options).read() {
            Ok(tagged_file) => return Some(tagged_file),
            Err(primary_error) => {
                debug!(
                    "Tag read primary parse failed for {}: {}",
                    path.display(),
                    primary_error
                );
            }
        },
        Err(open_error) => {
            debug!(
                "Tag read could not open {} with extension-based probe: {}",
                path.display(),
                open_error
            );
        }
    }

    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) => {
            debug!(
                "Tag read failed for {} while preparing content-based fallback: {}",
                path.display(),
                error
            );
            return None;
        }
    };

    let guessed_probe = match Probe::new(BufReader::new(file))
        .options(relaxed_options)
        .guess_file_type()
    {
        Ok(probe) => probe,
        Err(error) => {
            debug!(
                "Tag read failed for {} while guessing file type from content: {}",
                path.display(),
                error
            );
            return None;
        }
    };

    match guessed_probe.read() {
        Ok(tagged_file) => {
            debug!(
                "Tag read recovered via relaxed parsing for {}",
                path.display()
            );
            Some(tagged_file)
        }
        Err(error) => {
            debug!(
                "Tag read failed for {} after relaxed parsing: {}",
                path.display(),
                error
            );
            None
        }
    }
}

fn read_raw_tags_with_lofty(path: &Path) -> Option<RawTags> {
    let tagged_file = read_tagged_file(path, true, false)?;
    let primary_tag = tagged_file.primary_tag();
    let tags = tagged_file.tags();
    let text = |key: ItemKey| {
        first_non_empty_value(primary_tag, tags, |tag| {
            tag.get_string(&key).map(str::to_string)
        })
    };

    let duration = tagged_file.properties().duration();
    let length = (!duration.is_zero()).then(|| duration.as_secs_f64());

    Some(RawTags {
        title: first_non_empty_value(primary_tag, tags, |tag| {
            tag.title().map(|value| value.into_owned())
        }),
        artist: first_non_empty_value(primary_tag, tags, |tag| {
            tag.artist().map(|value| value.into_owned())
        }),
        performer: text(ItemKey::Performer),
        album_artist: text(ItemKey::AlbumArtist),
        album: first_non_empty_value(primary_tag, tags, |tag| {
            tag.album().map(|value| value.into_owned())
        }),
        disc_number: first_non_empty_value(primary_tag, tags, |tag| {
            tag.get_string(&ItemKey::DiscNumber)
                .map(str::to_string)
                .or_else(|| tag.disk().map(|value| value.to_string()))
        }),
        track_number: first_non_empty_value(primary_tag, tags, |tag| {
            tag.get_string(&ItemKey::TrackNumber)
                .map(str::to_string)
                .or_else(|| tag.track().map(|value| value.to_string()))
        }),
        length,
        title_sort: text(ItemKey::TrackTitleSortOrder),
        artist_sort: text(ItemKey::TrackArtistSortOrder),
        performer_sort: String::new(),
        album_artist_sort: text(ItemKey::AlbumArtistSortOrder),
        album_sort: text(ItemKey::AlbumTitleSortOrder),
    })
}

fn read_embedded_cover_art_with_lofty(path: &Path) -> Option<Vec<u8>> {
    let tagged_file = read_tagged_file(path, false, true)?;

    if let Some(tag) = tagged_file.primary_tag() {
        if let Some(picture) = tag.pictures().first() {
            return Some(picture.data().to_vec());
        }
    }

    tagged_file
        .tags()
        .iter()
        .find_map(|tag| tag.pictures().first())
        .map(|picture| picture.data().to_vec())
}

fn open_symphonia_probe(path: &Path) -> Option<symphonia::core::probe::ProbeResult> {
    let file = File::open(path).ok()?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()
}

fn set_if_empty(target: &mut String, value: &str) -> bool {
    let trimmed = value.trim();
    if target.is_empty() && !trimmed.is_empty() {
        *target = trimmed.to_string();
        true
    } else {
        false
    }
}

fn symphonia_value_to_string(value: &SymphoniaValue) -> String {
    value.to_string().trim().to_string()
}

fn apply_symphonia_tag(tags: &mut RawTags, tag: &symphonia::core::meta::Tag) -> bool {
    let value = symphonia_value_to_string(&tag.value);
    if value.is_empty() {
        return false;
    }

    let target = match tag.std_key {
        Some(StandardTagKey::TrackTitle) => Some(&mut tags.title),
        Some(StandardTagKey::Artist) => Some(&mut tags.artist),
        Some(StandardTagKey::Performer) => Some(&mut tags.performer),
        Some(StandardTagKey::AlbumArtist) => Some(&mut tags.album_artist),
        Some(StandardTagKey::Album) => Some(&mut tags.album),
        Some(StandardTagKey::DiscNumber) => Some(&mut tags.disc_number),
        Some(StandardTagKey::TrackNumber) => Some(&mut tags.track_number),
        Some(StandardTagKey::SortTrackTitle) => Some(&mut tags.title_sort),
        Some(StandardTagKey::SortArtist) => Some(&mut tags.artist_sort),
        Some(StandardTagKey::SortAlbumArtist) => Some(&mut tags.album_artist_sort),
        Some(StandardTagKey::SortAlbum) => Some(&mut tags.album_sort),
        _ => None,
    };
    if let Some(target) = target {
        if set_if_empty(target, &value) {
            return true;
        }
    }

    match tag.key.trim().to_ascii_uppercase().as_str() {
        "TIT2" | "TITLE" => set_if_empty(&mut tags.title, &value),
        "TPE1" | "ARTIST" => set_if_empty(&mut tags.artist, &value),
        "PERFORMER" => set_if_empty(&mut tags.performer, &value),
        "TPE2" | "ALBUMARTIST" | "ALBUM_ARTIST" | "ALBUM ARTIST" => {
            set_if_empty(&mut tags.album_artist, &value)
        }
        "TALB" | "ALBUM" => set_if_empty(&mut tags.album, &value),
        "TPOS" | "DISCNUMBER" => set_if_empty(&mut tags.disc_number, &value),
        "TRCK" | "TRACK" | "TRACKNUMBER" => set_if_empty(&mut tags.track_number, &value),
        "TSOT" | "TITLESORT" => set_if_empty(&mut tags.title_sort, &value),
        "TSOP" | "ARTISTSORT" => set_if_empty(&mut tags.artist_sort, &value),
        "PERFORMERSORT" => set_if_empty(&mut tags.performer_sort, &value),
        "TSO2" | "ALBUMARTISTSORT" => set_if_empty(&mut tags.album_artist_sort, &value),
        "TSOA" | "ALBUMSORT" => set_if_empty(&mut tags.album_sort, &value),
        _ => false,
    }
}

fn apply_symphonia_revision(tags: &mut RawTags, revision: &MetadataRevision) {
    for tag in revision.tags() {
        apply_symphonia_tag(tags, tag);
    }
}

fn read_raw_tags_with_symphonia(path: &Path) -> Option<RawTags> {
    let mut probed = open_symphonia_probe(path)?;
    let mut tags = RawTags::default();

    if let Some(probe_meta) = probed.metadata.get() {
        if let Some(revision) = probe_meta.current() {
            apply_symphonia_revision(&mut tags, revision);
        }
    }

    while !probed.format.metadata().is_latest() {
        let _ = probed.format.metadata().pop();
    }
    if let Some(revision) = probed.format.metadata().current() {
        apply_symphonia_revision(&mut tags, revision);
    }

    tags.length = probed.format.default_track().and_then(|track| {
        let frames = track.codec_params.n_frames?;
        let sample_rate = track.codec_params.sample_rate?;
        (sample_rate > 0).then(|| frames as f64 / f64::from(sample_rate))
    });

    Some(tags)
}

fn first_visual_data(revision: &MetadataRevision) -> Option<Vec<u8>> {
    revision
        .visuals()
        .iter()
        .find(|visual| {
            matches!(visual.usage, Some(StandardVisualKey::FrontCover)) && !visual.data.is_empty()
        })
        .or_else(|| {
            revision
                .visuals()
                .iter()
                .find(|visual| !visual.data.is_empty())
        })
        .map(|visual| visual.data.to_vec())
}

fn read_embedded_cover_art_with_symphonia(path: &Path) -> Option<Vec<u8>> {
    let mut probed = open_symphonia_probe(path)?;

    if let Some(probe_meta) = probed.metadata.get() {
        if let Some(revision) = probe_meta.current() {
            if let Some(cover_data) = first_visual_data(revision) {
                return Some(cover_data);
            }
        }
    }

    while !probed.format.metadata().is_latest() {
        let _ = probed.format.metadata().pop();
    }
    probed
        .format
        .metadata()
        .current()
        .and_then(first_visual_data)
}

/// Reads raw tag values and the audio length of a media file.
pub fn read_raw_tags(path: &Path) -> Option<RawTags> {
    if let Some(lofty_tags) = read_raw_tags_with_lofty(path) {
        return Some(lofty_tags);
    }

    let symphonia_tags = read_raw_tags_with_symphonia(path);
    if symphonia_tags.is_some() {
        debug!(
            "Tag read recovered via symphonia fallback for {}",
            path.display()
        );
    } else {
        warn!(
            "Tag read failed for {} in both lofty and symphonia paths",
            path.display()
        );
    }
    symphonia_tags
}

/// Reads embedded cover-art bytes from a media file, if present.
pub fn read_embedded_cover_art(path: &Path) -> Option<Vec<u8>> {
    if let Some(lofty_cover) = read_embedded_cover_art_with_lofty(path) {
        return Some(lofty_cover);
    }

    let symphonia_cover = read_embedded_cover_art_with_symphonia(path);
    if symphonia_cover.is_some() {
        debug!(
            "Embedded cover-art read recovered via symphonia fallback for {}",
            path.display()
        );
    }
    symphonia_cover
}

/// Copies text tags from `source` into the primary tag of `destination`.
///
/// Keys the destination tag format cannot hold are dropped. Returns the number
/// of items written; an untagged or unreadable source copies nothing.
pub fn copy_tags(source: &Path, destination: &Path) -> Result<usize> {
    let Some(source_file) = read_tagged_file(source, false, false) else {
        debug!("No readable tags to copy from {}", source.display());
        return Ok(0);
    };
    let Some(source_tag) = source_file.primary_tag().or_else(|| source_file.first_tag()) else {
        return Ok(0);
    };

    let tag_write_error = |reason: String| LibraryError::TagWrite {
        path: destination.to_path_buf(),
        reason,
    };
    let mut destination_file =
        read_from_path(destination).map_err(|error| tag_write_error(error.to_string()))?;
    let tag_type = destination_file.primary_tag_type();
    let mut destination_tag = Tag::new(tag_type);

    let mut copied = 0;
    for item in source_tag.items() {
        let Some(text) = item.value().text() else {
            continue;
        };
        if text.trim().is_empty() {
            continue;
        }
        if destination_tag.insert_text(item.key().clone(), text.to_string()) {
            copied += 1;
        }
    }

    destination_file.insert_tag(destination_tag);
    destination_file
        .save_to_path(destination, WriteOptions::default())
        .map_err(|error| tag_write_error(error.to_string()))?;
    debug!(
        "Copied {} tag item(s) from {} to {}",
        copied,
        source.display(),
        destination.display()
    );
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::{copy_tags, read_embedded_cover_art, read_raw_tags};

    fn unique_temp_path(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("leviathan_{name}_{nanos}"))
    }

    #[test]
    fn test_read_raw_tags_rejects_non_audio_content() {
        let path = unique_temp_path("not_audio.flac");
        fs::write(&path, b"this is plainly not a flac stream").expect("fixture should be written");
        assert_eq!(read_raw_tags(&path), None);
        assert_eq!(read_embedded_cover_art(&path), None);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_read_raw_tags_missing_file_returns_none() {
        assert_eq!(read_raw_tags(&unique_temp_path("missing.flac")), None);
    }

    #[test]
    fn test_copy_tags_from_unreadable_source_copies_nothing() {
        let source = unique_temp_path("source.flac");
        fs::write(&source, b"garbage").expect("fixture should be written");
        assert_eq!(
            copy_tags(&source, &unique_temp_path("destination.mp3"))
                .expect("unreadable sources should be skipped"),
            0
        );
        let _ = fs::remove_file(&source);
    }
}
