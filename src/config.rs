//! Configuration model, TOML loading, and validation into runtime [`Settings`].

use std::path::{Path, PathBuf};

use log::warn;

use crate::error::{LibraryError, Result};
use crate::path_guard;
use crate::playlist::{PlaylistFormat, PlaylistVariant, Substitution};
use crate::sort_key::{SortTagPolicy, SortTagSettings, SortTagWhitelist};
use crate::text_template::DEFAULT_TITLE_FORMAT;
use crate::transcode::TranscoderSettings;

pub const CONFIG_FILE_NAME: &str = "leviathan.toml";

/// Root configuration persisted to `leviathan.toml`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// Root of the audio file tree.
    pub music_path: PathBuf,
    /// SQLite database file.
    pub database_path: PathBuf,
    #[serde(default = "default_albumart_filename")]
    pub albumart_filename: String,
    /// One entry per output format; exactly one must be the default.
    #[serde(default)]
    pub playlist_formats: Vec<PlaylistFormatConfig>,
    /// Playlist names excluded from playlist scans and bulk saves.
    #[serde(default)]
    pub db_ignore_playlists: Vec<String>,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
    #[serde(default)]
    pub sort_tags: SortTagsConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaylistFormatConfig {
    pub directory: PathBuf,
    #[serde(default)]
    pub format: PlaylistVariant,
    #[serde(default)]
    pub default: bool,
    #[serde(default = "default_title_format")]
    pub title_format: String,
    #[serde(default)]
    pub mp3_only: bool,
    #[serde(default = "default_true")]
    pub absolute_paths: bool,
    #[serde(default)]
    pub substitutions: Vec<SubstitutionConfig>,
}

/// `[pattern, replacement]` or `[pattern, replacement, is_regex]`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum SubstitutionConfig {
    Flagged(String, String, bool),
    Literal(String, String),
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TranscoderConfig {
    #[serde(default = "default_decoder")]
    pub decoder: PathBuf,
    #[serde(default = "default_encoder")]
    pub encoder: PathBuf,
    /// Constant bitrate such as `"192k"`. Ignored when `vbr_quality` is set.
    #[serde(default)]
    pub constant_bitrate: Option<String>,
    #[serde(default)]
    pub vbr_quality: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SortTagsConfig {
    #[serde(default)]
    pub title: SortTagConfig,
    #[serde(default)]
    pub artist: SortTagConfig,
    #[serde(default)]
    pub album: SortTagConfig,
}

/// Where explicit `*sort` tags override computed sort keys for one field.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SortTagConfig {
    #[serde(default)]
    pub whitelist: WhitelistConfig,
    #[serde(default)]
    pub blacklist: Vec<PathBuf>,
}

/// `true` allows every path, `false` none; a list names files or directories.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum WhitelistConfig {
    All(bool),
    Paths(Vec<PathBuf>),
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self::All(false)
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            decoder: default_decoder(),
            encoder: default_encoder(),
            constant_bitrate: None,
            vbr_quality: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_albumart_filename() -> String {
    "albumart.jpg".to_string()
}

fn default_title_format() -> String {
    DEFAULT_TITLE_FORMAT.to_string()
}

fn default_decoder() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_encoder() -> PathBuf {
    PathBuf::from("lame")
}

/// Default configuration file location, `<config dir>/leviathan.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config_dir| config_dir.join(CONFIG_FILE_NAME))
}

/// Validated configuration with absolute paths and compiled playlist formats.
#[derive(Debug, Clone)]
pub struct Settings {
    pub music_path: PathBuf,
    pub database_path: PathBuf,
    pub albumart_filename: String,
    pub playlist_formats: Vec<PlaylistFormat>,
    pub ignore_playlists: Vec<String>,
    pub transcoder: TranscoderSettings,
    pub sort_tags: SortTagSettings,
}

impl Settings {
    /// The format flagged as default, else the first one. Fails when there are none.
    pub fn default_format(&self) -> Result<&PlaylistFormat> {
        self.playlist_formats
            .iter()
            .find(|format| format.is_default)
            .or_else(|| self.playlist_formats.first())
            .ok_or_else(|| LibraryError::Config("no playlist formats are configured".to_string()))
    }

    /// Directory of the default playlist format.
    pub fn playlists_path(&self) -> Result<&Path> {
        Ok(&self.default_format()?.directory)
    }
}

impl Config {
    /// Reads and parses the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Checks the configuration and resolves relative paths against `base_dir`.
    pub fn validate(&self, base_dir: &Path) -> Result<Settings> {
        let music_path = std::path::absolute(base_dir.join(&self.music_path))?;
        let database_path = std::path::absolute(base_dir.join(&self.database_path))?;

        let default_count = self
            .playlist_formats
            .iter()
            .filter(|format| format.default)
            .count();
        if default_count == 0 {
            return Err(LibraryError::Config(
                "a default playlist format must be specified".to_string(),
            ));
        }
        if default_count > 1 {
            return Err(LibraryError::Config(
                "two or more default playlist formats are specified".to_string(),
            ));
        }

        let playlist_formats = self
            .playlist_formats
            .iter()
            .map(|format| format.build(base_dir))
            .collect::<Result<Vec<_>>>()?;

        Ok(Settings {
            albumart_filename: self.albumart_filename.clone(),
            playlist_formats,
            ignore_playlists: self
                .db_ignore_playlists
                .iter()
                .filter(|name| !name.is_empty())
                .cloned()
                .collect(),
            transcoder: self.transcoder.build()?,
            sort_tags: SortTagSettings {
                title: self.sort_tags.title.build(&music_path, "title"),
                artist: self.sort_tags.artist.build(&music_path, "artist"),
                album: self.sort_tags.album.build(&music_path, "album"),
            },
            music_path,
            database_path,
        })
    }
}

impl PlaylistFormatConfig {
    fn build(&self, base_dir: &Path) -> Result<PlaylistFormat> {
        let substitutions = self
            .substitutions
            .iter()
            .map(|substitution| match substitution {
                SubstitutionConfig::Flagged(pattern, replacement, true) => {
                    Substitution::regex(pattern, replacement.as_str())
                }
                SubstitutionConfig::Flagged(pattern, replacement, false)
                | SubstitutionConfig::Literal(pattern, replacement) => {
                    Ok(Substitution::literal(pattern.as_str(), replacement.as_str()))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PlaylistFormat {
            directory: std::path::absolute(base_dir.join(&self.directory))?,
            variant: self.format,
            is_default: self.default,
            title_format: self.title_format.clone(),
            mp3_only: self.mp3_only,
            absolute_paths: self.absolute_paths,
            substitutions,
        })
    }
}

impl TranscoderConfig {
    fn build(&self) -> Result<TranscoderSettings> {
        let constant_bitrate = self
            .constant_bitrate
            .as_deref()
            .map(parse_bitrate)
            .transpose()?;
        Ok(TranscoderSettings {
            decoder: self.decoder.clone(),
            encoder: self.encoder.clone(),
            constant_bitrate,
            vbr_quality: self.vbr_quality,
        })
    }
}

/// `"192k"`, `"192K"` and `"192"` all mean 192 kbit/s.
fn parse_bitrate(value: &str) -> Result<u32> {
    let trimmed = value.trim().to_ascii_lowercase();
    trimmed
        .trim_end_matches('k')
        .parse()
        .map_err(|_| LibraryError::Config(format!("invalid constant bitrate '{value}'")))
}

impl SortTagConfig {
    fn build(&self, music_path: &Path, field: &str) -> SortTagPolicy {
        let inside_root = |paths: &[PathBuf], list: &str| -> Vec<PathBuf> {
            paths
                .iter()
                .filter_map(|path| match path_guard::relpath(music_path, path) {
                    Ok(relpath) => Some(relpath),
                    Err(err) => {
                        warn!("Ignoring {field} sort tag {list} entry {}: {err}", path.display());
                        None
                    }
                })
                .collect()
        };

        let whitelist = match &self.whitelist {
            WhitelistConfig::All(true) => SortTagWhitelist::All,
            WhitelistConfig::All(false) => SortTagWhitelist::Paths(Vec::new()),
            WhitelistConfig::Paths(paths) => {
                SortTagWhitelist::Paths(inside_root(paths, "whitelist"))
            }
        };
        SortTagPolicy {
            whitelist,
            blacklist: inside_root(&self.blacklist, "blacklist"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::{Config, SubstitutionConfig, WhitelistConfig};
    use crate::error::LibraryError;
    use crate::playlist::PlaylistVariant;
    use crate::sort_key::SortTagWhitelist;

    const FULL_CONFIG: &str = r#"
music_path = "music"
database_path = "leviathan.sqlite"
db_ignore_playlists = ["Scratch", ""]

[[playlist_formats]]
directory = "playlists"
format = "extm3u"
default = true

[[playlist_formats]]
directory = "playlists/mp3"
format = "pls"
mp3_only = true
absolute_paths = false
title_format = "$artist - $title"
substitutions = [["/", "\\"], ["^(.*)$", "X:$1", true]]

[transcoder]
constant_bitrate = "256K"

[sort_tags.artist]
whitelist = ["Various/Compilation", "../outside"]
blacklist = ["Various/Compilation/01 Intro.flac"]

[sort_tags.album]
whitelist = true
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let parsed: Config = toml::from_str(
            r#"
music_path = "/music"
database_path = "/music/.leviathan.sqlite"

[[playlist_formats]]
directory = "/music/playlists"
default = true
"#,
        )
        .expect("config should parse");

        assert_eq!(parsed.albumart_filename, "albumart.jpg");
        assert!(parsed.db_ignore_playlists.is_empty());
        assert_eq!(parsed.transcoder.decoder, PathBuf::from("ffmpeg"));
        assert_eq!(parsed.transcoder.encoder, PathBuf::from("lame"));
        let format = &parsed.playlist_formats[0];
        assert_eq!(format.format, PlaylistVariant::M3u);
        assert_eq!(format.title_format, "$title");
        assert!(format.absolute_paths);
        assert!(!format.mp3_only);
        assert_eq!(parsed.sort_tags.title.whitelist, WhitelistConfig::All(false));
    }

    #[test]
    fn test_full_config_validates_into_settings() {
        let parsed: Config = toml::from_str(FULL_CONFIG).expect("config should parse");
        assert_eq!(
            parsed.playlist_formats[1].substitutions[1],
            SubstitutionConfig::Flagged("^(.*)$".to_string(), "X:$1".to_string(), true)
        );

        let base = Path::new("/srv/leviathan");
        let settings = parsed.validate(base).expect("config should validate");
        assert_eq!(settings.music_path, base.join("music"));
        assert_eq!(settings.database_path, base.join("leviathan.sqlite"));
        assert_eq!(
            settings.playlists_path().expect("a default format should exist"),
            base.join("playlists")
        );
        assert_eq!(
            settings
                .default_format()
                .expect("a default format should exist")
                .variant,
            PlaylistVariant::Extm3u
        );
        assert_eq!(settings.ignore_playlists, vec!["Scratch".to_string()]);
        assert_eq!(settings.transcoder.constant_bitrate, Some(256));
        assert_eq!(settings.transcoder.vbr_quality, None);

        let mirror = &settings.playlist_formats[1];
        assert!(mirror.mp3_only);
        assert!(!mirror.absolute_paths);
        assert_eq!(mirror.substitutions.len(), 2);
        assert_eq!(mirror.substitutions[0].apply("a/b"), "a\\b");
        assert_eq!(mirror.substitutions[1].apply("a\nb"), "X:a\nX:b");

        assert_eq!(
            settings.sort_tags.artist.whitelist,
            SortTagWhitelist::Paths(vec![PathBuf::from("Various/Compilation")])
        );
        assert_eq!(
            settings.sort_tags.artist.blacklist,
            vec![PathBuf::from("Various/Compilation/01 Intro.flac")]
        );
        assert_eq!(settings.sort_tags.album.whitelist, SortTagWhitelist::All);
        assert_eq!(
            settings.sort_tags.title.whitelist,
            SortTagWhitelist::Paths(Vec::new())
        );
    }

    #[test]
    fn test_validate_requires_exactly_one_default_format() {
        let mut parsed: Config = toml::from_str(FULL_CONFIG).expect("config should parse");
        parsed.playlist_formats[1].default = true;
        let error = parsed
            .validate(Path::new("/srv"))
            .expect_err("two defaults should be rejected");
        assert!(matches!(error, LibraryError::Config(_)));

        parsed.playlist_formats.iter_mut().for_each(|format| format.default = false);
        let error = parsed
            .validate(Path::new("/srv"))
            .expect_err("a missing default should be rejected");
        assert!(matches!(error, LibraryError::Config(_)));
    }

    #[test]
    fn test_default_format_without_formats_is_a_config_error() {
        let parsed: Config = toml::from_str(FULL_CONFIG).expect("config should parse");
        let mut settings = parsed.validate(Path::new("/srv")).expect("config should validate");
        settings.playlist_formats.clear();
        assert!(matches!(settings.default_format(), Err(LibraryError::Config(_))));
        assert!(matches!(settings.playlists_path(), Err(LibraryError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_bitrate() {
        let mut parsed: Config = toml::from_str(FULL_CONFIG).expect("config should parse");
        parsed.transcoder.constant_bitrate = Some("fast".to_string());
        let error = parsed
            .validate(Path::new("/srv"))
            .expect_err("non-numeric bitrate should be rejected");
        assert!(matches!(error, LibraryError::Config(_)));
    }
}
