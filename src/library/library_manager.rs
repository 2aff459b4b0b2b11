//! Library synchronization between the music tree, the database, and playlist files.
//!
//! The database is the source of truth for playlist membership. Every
//! membership change regenerates all configured files of the affected
//! playlists before the call returns; files are never patched in place, except
//! for the path rewrite that follows a move.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::move_plan::{utf8_pairs, MovePlan};
use super::sanitize::{self, SanitizeReport};
use crate::config::Settings;
use crate::db_manager::{DbManager, MemberSource};
use crate::error::{LibraryError, Result};
use crate::media_file_discovery::{collect_audio_files_from_folder, collect_playlist_files};
use crate::metadata::{LoftyTagReader, MetadataExtractor, TagReader};
use crate::models::{Album, Artist, Playlist, Song, SongColumn};
use crate::path_guard;
use crate::playlist::{self, write_atomically};
use crate::transcode;

/// Counts reported by a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub songs_added: usize,
    /// Audio files already in the database; they are not re-read.
    pub songs_tracked: usize,
    /// Audio files without readable tags, or outside the music root.
    pub songs_skipped: usize,
    pub playlists_imported: usize,
}

/// Per-entry failures that skip the entry instead of aborting a sweep.
fn is_skippable(err: &LibraryError) -> bool {
    matches!(
        err,
        LibraryError::NotFound(_)
            | LibraryError::PathViolation { .. }
            | LibraryError::PathEncoding(_)
    )
}

fn move_file(old_path: &Path, new_path: &Path) -> Result<()> {
    if let Some(parent) = new_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(old_path, new_path)?;
    debug!("Moved {} to {}", old_path.display(), new_path.display());
    Ok(())
}

/// Puts back files moved by an operation that failed later on.
fn restore_moved_files(moved: &[(PathBuf, PathBuf)]) {
    for (old_path, new_path) in moved.iter().rev() {
        if let Err(err) = fs::rename(new_path, old_path) {
            warn!(
                "Could not move {} back to {}: {}",
                new_path.display(),
                old_path.display(),
                err
            );
        }
    }
}

/// Coordinates scans, song and playlist edits, moves, and playlist file output.
pub struct LibraryManager {
    settings: Settings,
    db_manager: DbManager,
    extractor: MetadataExtractor,
}

impl LibraryManager {
    /// Opens the library database and reads tags with lofty.
    pub fn open(settings: Settings) -> Result<Self> {
        Self::with_tag_reader(settings, Box::new(LoftyTagReader))
    }

    pub fn with_tag_reader(settings: Settings, reader: Box<dyn TagReader>) -> Result<Self> {
        settings.default_format()?;
        let db_manager = DbManager::open(&settings.database_path)?;
        let extractor = MetadataExtractor::new(
            settings.music_path.clone(),
            settings.sort_tags.clone(),
            reader,
        );
        Ok(Self {
            settings,
            db_manager,
            extractor,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn db_manager(&self) -> &DbManager {
        &self.db_manager
    }

    fn music_path(&self) -> &Path {
        &self.settings.music_path
    }

    fn is_ignored(&self, playlist_name: &str) -> bool {
        self.settings
            .ignore_playlists
            .iter()
            .any(|ignored| ignored == playlist_name)
    }

    /// Canonical relpath of a song path, in the form songs are stored under.
    fn song_relpath(&self, song_path: &Path) -> Result<String> {
        let relpath = path_guard::relpath(self.music_path(), song_path)?;
        Ok(path_guard::path_str(&relpath)?.to_string())
    }

    /// Songs and playlists on disk that the database does not know yet, then
    /// regenerates every playlist file.
    pub fn scan(&self) -> Result<ScanSummary> {
        let mut summary = self.scan_songs()?;
        summary.playlists_imported = self.scan_playlists()?;
        self.save_all_playlists()?;
        Ok(summary)
    }

    /// Adds audio files under the music root that are not tracked yet.
    /// Tracked songs are not re-read and vanished files are not removed.
    pub fn scan_songs(&self) -> Result<ScanSummary> {
        if !self.music_path().is_dir() {
            return Err(LibraryError::NotFound(format!(
                "music directory {}",
                self.music_path().display()
            )));
        }

        let mut summary = ScanSummary::default();
        for file_path in collect_audio_files_from_folder(self.music_path()) {
            let relpath = match self.song_relpath(&file_path) {
                Ok(relpath) => relpath,
                Err(err) if is_skippable(&err) => {
                    debug!("Library scan: skipping {}: {}", file_path.display(), err);
                    summary.songs_skipped += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };
            if self.db_manager.find_song_by_relpath(&relpath)?.is_some() {
                summary.songs_tracked += 1;
                continue;
            }

            match self.extractor.extract(&file_path) {
                Ok(Some(record)) => {
                    self.db_manager.upsert_song(&record)?;
                    summary.songs_added += 1;
                }
                Ok(None) => summary.songs_skipped += 1,
                Err(err) if is_skippable(&err) => {
                    warn!("Library scan: skipping {}: {}", relpath, err);
                    summary.songs_skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            "Library scan completed: added {} song(s), {} already tracked, {} skipped",
            summary.songs_added, summary.songs_tracked, summary.songs_skipped
        );
        Ok(summary)
    }

    /// Imports every default-format file in the playlist directory whose name
    /// is not ignored. Returns the number of playlists imported.
    pub fn scan_playlists(&self) -> Result<usize> {
        let default_format = self.settings.default_format()?;
        let extension = default_format.variant.extension();

        let mut imported = 0;
        for path in collect_playlist_files(&default_format.directory) {
            if !path
                .extension()
                .is_some_and(|found| found.eq_ignore_ascii_case(extension))
            {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                warn!("Skipping playlist with a non UTF-8 name: {}", path.display());
                continue;
            };
            if self.is_ignored(name) {
                debug!("Skipping ignored playlist {}", name);
                continue;
            }
            let (_, members) = self.import_playlist_file(name)?;
            debug!("Imported playlist {} with {} song(s)", name, members);
            imported += 1;
        }

        info!("Playlist scan completed: imported {} playlist(s)", imported);
        Ok(imported)
    }

    /// Song to reference from a playlist entry: the tracked song, or a new
    /// record read from the file. `None` when the file has no readable tags.
    fn member_source(&self, song_path: &Path) -> Result<Option<MemberSource>> {
        let relpath = self.song_relpath(song_path)?;
        if let Some(song) = self.db_manager.find_song_by_relpath(&relpath)? {
            return Ok(Some(MemberSource::Existing(song.id)));
        }
        Ok(self.extractor.extract(song_path)?.map(MemberSource::New))
    }

    /// Creates (or reuses) the playlist row and adds every song listed in its
    /// default-format file, when one exists.
    fn import_playlist_file(&self, name: &str) -> Result<(Playlist, usize)> {
        let path = self.settings.default_format()?.path(name)?;

        let mut sources = Vec::new();
        if path.is_file() {
            for song_path in playlist::load(&path, self.music_path())? {
                match self.member_source(&song_path) {
                    Ok(Some(source)) => sources.push(source),
                    Ok(None) => {
                        debug!("Playlist {}: no readable tags in {}", name, song_path.display())
                    }
                    Err(err) if is_skippable(&err) => {
                        warn!("Playlist {}: skipping {}: {}", name, song_path.display(), err)
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        let playlist = self.db_manager.insert_playlist(name)?;
        let members = self.db_manager.import_playlist(playlist.id, &sources)?;
        Ok((playlist, members))
    }

    /// Reads `song_path` and stores it, replacing the record of a tracked song
    /// at the same relpath. `None` when the file has no readable tags.
    pub fn add_song(&self, song_path: &Path) -> Result<Option<Song>> {
        let Some(record) = self.extractor.extract(song_path)? else {
            return Ok(None);
        };
        let song_id = self.db_manager.upsert_song(&record)?;
        let song = self.db_manager.song_by_id(song_id)?;
        self.regenerate(&self.db_manager.playlists_for_song(song_id)?)?;
        Ok(Some(song))
    }

    /// Re-reads the tags of a tracked song.
    pub fn update_song(&self, song_path: &Path) -> Result<Song> {
        let relpath = self.song_relpath(song_path)?;
        self.db_manager.song_by_relpath(&relpath)?;
        self.add_song(song_path)?
            .ok_or_else(|| LibraryError::NotFound(format!("readable tags in {relpath}")))
    }

    /// Forgets a song and rewrites every playlist that listed it. The file is left on disk.
    pub fn remove_song(&self, song_path: &Path) -> Result<Song> {
        let relpath = self.song_relpath(song_path)?;
        let song = self.db_manager.song_by_relpath(&relpath)?;
        let playlists = self.db_manager.remove_song(song.id)?;
        info!(
            "Removed song {} from the library and {} playlist(s)",
            song.relpath,
            playlists.len()
        );
        self.regenerate(&playlists)?;
        Ok(song)
    }

    /// Tracks the playlist `name`. An existing default-format file is imported;
    /// otherwise empty files are created.
    pub fn add_playlist(&self, name: &str) -> Result<Playlist> {
        let (playlist, members) = self.import_playlist_file(name)?;
        info!("Added playlist {} with {} song(s)", playlist.name, members);
        self.save_playlist_files(&playlist)?;
        Ok(playlist)
    }

    /// Renames a playlist and moves each of its files to match.
    pub fn rename_playlist(&self, name: &str, new_name: &str) -> Result<Playlist> {
        let playlist = self.db_manager.playlist_by_name(name)?;
        let moves = self
            .settings
            .playlist_formats
            .iter()
            .map(|format| Ok((format.path(name)?, format.path(new_name)?)))
            .collect::<Result<Vec<_>>>()?;
        if self.db_manager.find_playlist_by_name(new_name)?.is_some() {
            return Err(LibraryError::InvalidPlaylist {
                path: self.settings.default_format()?.path(new_name)?,
                reason: format!("a playlist named '{new_name}' already exists"),
            });
        }

        let mut moved = Vec::new();
        for (old_path, new_path) in moves {
            if !old_path.is_file() {
                continue;
            }
            if let Err(err) = move_file(&old_path, &new_path) {
                restore_moved_files(&moved);
                return Err(err);
            }
            moved.push((old_path, new_path));
        }
        if let Err(err) = self.db_manager.rename_playlist(playlist.id, new_name) {
            restore_moved_files(&moved);
            return Err(err);
        }
        info!("Renamed playlist {} to {}", name, new_name);
        self.db_manager.playlist_by_id(playlist.id)
    }

    /// Forgets a playlist and deletes each of its files.
    pub fn remove_playlist(&self, name: &str) -> Result<()> {
        let playlist = self.db_manager.playlist_by_name(name)?;
        self.db_manager.remove_playlist(playlist.id)?;
        for format in &self.settings.playlist_formats {
            let path = format.path(name)?;
            if path.is_file() {
                fs::remove_file(&path)?;
                debug!("Deleted {}", path.display());
            }
        }
        info!("Removed playlist {}", name);
        Ok(())
    }

    /// Adds a song to a playlist, tracking the song first when needed.
    pub fn add_song_to_playlist(&self, playlist_name: &str, song_path: &Path) -> Result<Song> {
        let playlist = self.db_manager.playlist_by_name(playlist_name)?;
        let source = self.member_source(song_path)?.ok_or_else(|| {
            LibraryError::NotFound(format!("readable tags in {}", song_path.display()))
        })?;
        let song_id = self.db_manager.add_member(playlist.id, &source)?;
        self.save_playlist_files(&playlist)?;
        self.db_manager.song_by_id(song_id)
    }

    /// Returns whether the song was a member.
    pub fn remove_song_from_playlist(&self, playlist_name: &str, song_path: &Path) -> Result<bool> {
        let playlist = self.db_manager.playlist_by_name(playlist_name)?;
        let song = self
            .db_manager
            .song_by_relpath(&self.song_relpath(song_path)?)?;
        if !self.db_manager.remove_entry(song.id, playlist.id)? {
            return Ok(false);
        }
        self.save_playlist_files(&playlist)?;
        Ok(true)
    }

    pub fn move_song_between_playlists(
        &self,
        song_path: &Path,
        from_playlist: &str,
        to_playlist: &str,
    ) -> Result<()> {
        let from = self.db_manager.playlist_by_name(from_playlist)?;
        let to = self.db_manager.playlist_by_name(to_playlist)?;
        let song = self
            .db_manager
            .song_by_relpath(&self.song_relpath(song_path)?)?;
        if !self.db_manager.has_entry(song.id, from.id)? {
            return Err(LibraryError::NotFound(format!(
                "song {} in playlist '{}'",
                song.relpath, from.name
            )));
        }
        self.db_manager.move_entry(song.id, from.id, to.id)?;
        self.regenerate(&[from, to])
    }

    /// Members of a playlist in output order.
    pub fn playlist_songs(&self, playlist_name: &str) -> Result<Vec<Song>> {
        let playlist = self.db_manager.playlist_by_name(playlist_name)?;
        self.db_manager.playlist_songs(playlist.id)
    }

    /// Writes every configured file of a playlist. Returns the paths written.
    pub fn save_playlist(&self, playlist_name: &str) -> Result<Vec<PathBuf>> {
        let playlist = self.db_manager.playlist_by_name(playlist_name)?;
        self.save_playlist_files(&playlist)
    }

    /// Writes every playlist that is not ignored. Returns how many were written.
    pub fn save_all_playlists(&self) -> Result<usize> {
        let mut saved = 0;
        for playlist in self.db_manager.playlists()? {
            if self.is_ignored(&playlist.name) {
                continue;
            }
            self.save_playlist_files(&playlist)?;
            saved += 1;
        }
        debug!("Saved {} playlist(s)", saved);
        Ok(saved)
    }

    fn save_playlist_files(&self, playlist: &Playlist) -> Result<Vec<PathBuf>> {
        let songs = self.db_manager.playlist_songs(playlist.id)?;
        self.settings
            .playlist_formats
            .iter()
            .map(|format| format.write(&playlist.name, &songs, self.music_path()))
            .collect()
    }

    fn regenerate(&self, playlists: &[Playlist]) -> Result<()> {
        for playlist in playlists {
            self.save_playlist_files(playlist)?;
        }
        Ok(())
    }

    /// Moves a file or directory inside the music root and updates the relpath
    /// of every song that moved.
    ///
    /// Afterwards every playlist file has the old absolute path replaced by the
    /// new one as plain text. Any line containing the old path as a substring
    /// is rewritten, and files written with relative paths keep the old ones
    /// until the next save.
    pub fn move_path(&self, src: &Path, dst: &Path) -> Result<MovePlan> {
        let plan = MovePlan::new(self.music_path(), src, dst)?;
        info!(
            "Moving {} to {}",
            plan.source().display(),
            plan.destination().display()
        );
        self.apply_move(plan)
    }

    /// Performs the remaining entries of `plan`, as built by [`MovePlan::new`]
    /// or returned inside [`LibraryError::MoveInterrupted`].
    ///
    /// When a rename fails, the songs already moved keep their new relpaths and
    /// the playlists listing them are regenerated before `MoveInterrupted` is
    /// returned.
    pub fn apply_move(&self, mut plan: MovePlan) -> Result<MovePlan> {
        self.require_untracked_destinations(&plan)?;

        let moved_before = plan.completed().len();
        let applied = plan.apply(self.music_path());
        let moved = utf8_pairs(&plan.completed()[moved_before..]);
        let updated = self.db_manager.update_song_relpaths(&moved)?;
        debug!("Updated the relpath of {} song(s)", updated);

        if let Err(err) = applied {
            warn!(
                "Moving {} stopped with {} file(s) left: {}",
                plan.source().display(),
                plan.remaining().count(),
                err
            );
            self.regenerate_moved(&moved)?;
            return Err(LibraryError::MoveInterrupted {
                plan: Box::new(plan),
                source: Box::new(err),
            });
        }

        let old_path = self.music_path().join(plan.source());
        let new_path = self.music_path().join(plan.destination());
        self.rewrite_playlist_paths(&old_path.to_string_lossy(), &new_path.to_string_lossy())?;
        Ok(plan)
    }

    /// Songs stay tracked after their file vanishes, so a destination can be
    /// free on disk but still taken in the database.
    fn require_untracked_destinations(&self, plan: &MovePlan) -> Result<()> {
        for (_, new_relpath) in plan.remaining() {
            let Some(relpath) = new_relpath.to_str() else {
                continue;
            };
            if self.db_manager.find_song_by_relpath(relpath)?.is_some() {
                return Err(LibraryError::InvalidMove {
                    src: plan.source().to_path_buf(),
                    dst: plan.destination().to_path_buf(),
                    reason: format!("{relpath} is still tracked; remove that song first"),
                });
            }
        }
        Ok(())
    }

    /// Regenerates every playlist containing one of the moved songs.
    fn regenerate_moved(&self, moved: &[(String, String)]) -> Result<()> {
        let mut affected = BTreeMap::new();
        for (_, new_relpath) in moved {
            let Some(song) = self.db_manager.find_song_by_relpath(new_relpath)? else {
                continue;
            };
            for playlist in self.db_manager.playlists_for_song(song.id)? {
                affected.insert(playlist.id, playlist);
            }
        }
        let affected: Vec<Playlist> = affected.into_values().collect();
        self.regenerate(&affected)
    }

    fn rewrite_playlist_paths(&self, old_path: &str, new_path: &str) -> Result<()> {
        for playlist in self.db_manager.playlists()? {
            for format in &self.settings.playlist_formats {
                let path = format.path(&playlist.name)?;
                if !path.is_file() {
                    continue;
                }
                let contents = fs::read_to_string(&path)?;
                if contents.contains(old_path) {
                    write_atomically(&path, &contents.replace(old_path, new_path))?;
                    debug!("Rewrote moved paths in {}", path.display());
                }
            }
        }
        Ok(())
    }

    /// Transcodes tracks lacking an MP3 sibling, then rewrites every playlist
    /// so MP3-only formats list the new files.
    pub fn to_mp3(&self) -> Result<Vec<PathBuf>> {
        let written = transcode::to_mp3(self.music_path(), &self.settings.transcoder)?;
        self.save_all_playlists()?;
        Ok(written)
    }

    pub fn sanitize(&self) -> SanitizeReport {
        sanitize::sanitize(self.music_path(), &self.settings.albumart_filename)
    }

    pub fn songs(&self) -> Result<Vec<Song>> {
        self.db_manager.songs()
    }

    pub fn song(&self, song_path: &Path) -> Result<Song> {
        self.db_manager
            .song_by_relpath(&self.song_relpath(song_path)?)
    }

    pub fn playlists(&self) -> Result<Vec<Playlist>> {
        self.db_manager.playlists()
    }

    pub fn artists(&self) -> Result<Vec<Artist>> {
        self.db_manager.artists()
    }

    pub fn albums(&self) -> Result<Vec<Album>> {
        self.db_manager.albums()
    }

    pub fn search(
        &self,
        column: SongColumn,
        term: &str,
        exact: bool,
        sort: &[SongColumn],
    ) -> Result<Vec<Song>> {
        self.db_manager.search(column, term, exact, sort)
    }
}
