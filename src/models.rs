//! Records returned by the library store.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Song fields extracted from tags, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SongRecord {
    pub relpath: String,
    pub title: String,
    pub sort_title: String,
    pub artist: String,
    pub sort_artist: String,
    pub album: String,
    pub sort_album: String,
    /// Seconds.
    pub length: Option<f64>,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
}

/// A tracked song. `relpath` is relative to the music root.
#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    pub id: i64,
    pub relpath: String,
    pub title: String,
    pub sort_title: String,
    pub artist: String,
    pub sort_artist: String,
    pub album: String,
    pub sort_album: String,
    pub length: Option<f64>,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
}

impl Song {
    pub fn path(&self, music_root: &Path) -> PathBuf {
        music_root.join(&self.relpath)
    }

    /// Relpath of the MP3 mirror (same stem, `.mp3` extension).
    pub fn relpath_mp3(&self) -> PathBuf {
        Path::new(&self.relpath).with_extension("mp3")
    }

    pub fn path_mp3(&self, music_root: &Path) -> PathBuf {
        music_root.join(self.relpath_mp3())
    }

    /// Renders the path this song is written as in a playlist file.
    pub fn location(&self, attr: PathAttr, music_root: &Path) -> String {
        let location = match attr {
            PathAttr::Path => self.path(music_root),
            PathAttr::Relpath => PathBuf::from(&self.relpath),
            PathAttr::PathMp3 => self.path_mp3(music_root),
            PathAttr::RelpathMp3 => self.relpath_mp3(),
        };
        location.to_string_lossy().into_owned()
    }

    /// Value of a template placeholder, or `None` for unknown names.
    pub fn field(&self, name: &str) -> Option<String> {
        let optional = |value: Option<String>| Some(value.unwrap_or_default());
        match name {
            "id" => Some(self.id.to_string()),
            "relpath" => Some(self.relpath.clone()),
            "title" => Some(self.title.clone()),
            "sort_title" => Some(self.sort_title.clone()),
            "artist" => Some(self.artist.clone()),
            "sort_artist" => Some(self.sort_artist.clone()),
            "album" => Some(self.album.clone()),
            "sort_album" => Some(self.sort_album.clone()),
            "length" => optional(self.length.map(|length| length.to_string())),
            "disc_number" => optional(self.disc_number.map(|disc| disc.to_string())),
            "track_number" => optional(self.track_number.map(|track| track.to_string())),
            _ => None,
        }
    }
}

/// Which form of a song's path a playlist format writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathAttr {
    Path,
    Relpath,
    PathMp3,
    RelpathMp3,
}

impl PathAttr {
    pub fn for_format(mp3_only: bool, absolute_paths: bool) -> Self {
        match (mp3_only, absolute_paths) {
            (false, true) => Self::Path,
            (false, false) => Self::Relpath,
            (true, true) => Self::PathMp3,
            (true, false) => Self::RelpathMp3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artist {
    pub name: String,
    pub sort_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    pub name: String,
    pub artist: String,
}

/// Song columns that may be searched or sorted on.
///
/// Queries only ever interpolate [`SongColumn::as_sql`], never caller text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SongColumn {
    Relpath,
    Title,
    SortTitle,
    Artist,
    SortArtist,
    Album,
    SortAlbum,
    Length,
    DiscNumber,
    TrackNumber,
}

impl SongColumn {
    pub const ALL: [SongColumn; 10] = [
        Self::Relpath,
        Self::Title,
        Self::SortTitle,
        Self::Artist,
        Self::SortArtist,
        Self::Album,
        Self::SortAlbum,
        Self::Length,
        Self::DiscNumber,
        Self::TrackNumber,
    ];

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Relpath => "relpath",
            Self::Title => "title",
            Self::SortTitle => "sort_title",
            Self::Artist => "artist",
            Self::SortArtist => "sort_artist",
            Self::Album => "album",
            Self::SortAlbum => "sort_album",
            Self::Length => "length",
            Self::DiscNumber => "disc_number",
            Self::TrackNumber => "track_number",
        }
    }
}

impl fmt::Display for SongColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for SongColumn {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|column| column.as_sql() == normalized)
            .ok_or_else(|| format!("unknown song field '{value}'"))
    }
}
