//! SQLite library index: songs, playlists, playlist membership, and metadata.
//!
//! Every public operation opens its own connection. Operations that touch more
//! than one row set run inside a single transaction.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{LibraryError, Result};
use crate::models::{Album, Artist, Playlist, Song, SongColumn, SongRecord};

/// Schema version written by this build. Older databases are rejected.
pub const DB_VERSION: u32 = 4;

const DB_VERSION_KEY: &str = "db_version";

const SONG_COLUMNS: &str = "songs.id, songs.relpath, songs.title, songs.sort_title, \
     songs.artist, songs.sort_artist, songs.album, songs.sort_album, songs.length, \
     songs.disc_number, songs.track_number";

/// Output order of playlist members. `relpath` makes the order total.
const PLAYLIST_ORDER: &str = "songs.disc_number, songs.track_number, songs.sort_title, \
     songs.sort_artist, songs.sort_album, songs.length, songs.relpath";

const LIBRARY_ORDER: &str =
    "songs.sort_title, songs.sort_artist, songs.sort_album, songs.length, songs.relpath";

const SCHEMA: &str = "
    CREATE TABLE leviathan_meta (
        id INTEGER PRIMARY KEY,
        key TEXT NOT NULL UNIQUE,
        value TEXT NOT NULL
    );
    CREATE TABLE songs (
        id INTEGER PRIMARY KEY,
        relpath TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        sort_title TEXT NOT NULL,
        artist TEXT NOT NULL,
        sort_artist TEXT NOT NULL,
        album TEXT NOT NULL,
        sort_album TEXT NOT NULL,
        length REAL,
        disc_number INTEGER,
        track_number INTEGER
    );
    CREATE TABLE playlists (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    );
    CREATE TABLE playlist_entries (
        id INTEGER PRIMARY KEY,
        song INTEGER NOT NULL REFERENCES songs(id),
        playlist INTEGER NOT NULL REFERENCES playlists(id)
    );
    CREATE INDEX playlist_entries_song ON playlist_entries (song);
    CREATE INDEX playlist_entries_playlist ON playlist_entries (playlist);
    CREATE UNIQUE INDEX playlist_entries_member ON playlist_entries (song, playlist);
";

/// The song a new membership row points at.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberSource {
    Existing(i64),
    /// Inserted (or updated by relpath) in the same transaction as the membership.
    New(SongRecord),
}

fn song_from_row(row: &Row) -> rusqlite::Result<Song> {
    Ok(Song {
        id: row.get(0)?,
        relpath: row.get(1)?,
        title: row.get(2)?,
        sort_title: row.get(3)?,
        artist: row.get(4)?,
        sort_artist: row.get(5)?,
        album: row.get(6)?,
        sort_album: row.get(7)?,
        length: row.get(8)?,
        disc_number: row.get(9)?,
        track_number: row.get(10)?,
    })
}

fn playlist_from_row(row: &Row) -> rusqlite::Result<Playlist> {
    Ok(Playlist {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

/// Escapes `%`, `_` and the escape character itself for `LIKE ... ESCAPE '\'`.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn upsert_song_in(conn: &Connection, record: &SongRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO songs (relpath, title, sort_title, artist, sort_artist, album, sort_album,
                            length, disc_number, track_number)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(relpath) DO UPDATE SET
            title = excluded.title,
            sort_title = excluded.sort_title,
            artist = excluded.artist,
            sort_artist = excluded.sort_artist,
            album = excluded.album,
            sort_album = excluded.sort_album,
            length = excluded.length,
            disc_number = excluded.disc_number,
            track_number = excluded.track_number",
        params![
            record.relpath,
            record.title,
            record.sort_title,
            record.artist,
            record.sort_artist,
            record.album,
            record.sort_album,
            record.length,
            record.disc_number,
            record.track_number
        ],
    )?;
    Ok(conn.query_row(
        "SELECT id FROM songs WHERE relpath = ?1",
        params![record.relpath],
        |row| row.get(0),
    )?)
}

fn add_member_in(conn: &Connection, playlist_id: i64, source: &MemberSource) -> Result<i64> {
    let song_id = match source {
        MemberSource::Existing(song_id) => *song_id,
        MemberSource::New(record) => upsert_song_in(conn, record)?,
    };
    conn.execute(
        "INSERT OR IGNORE INTO playlist_entries (song, playlist) VALUES (?1, ?2)",
        params![song_id, playlist_id],
    )?;
    Ok(song_id)
}

fn playlists_for_song_in(conn: &Connection, song_id: i64) -> Result<Vec<Playlist>> {
    let mut stmt = conn.prepare(
        "SELECT playlists.id, playlists.name FROM playlists
         JOIN playlist_entries ON playlist_entries.playlist = playlists.id
         WHERE playlist_entries.song = ?1
         ORDER BY playlists.name",
    )?;
    let playlists = stmt
        .query_map(params![song_id], playlist_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(playlists)
}

#[derive(Debug)]
pub struct DbManager {
    db_path: PathBuf,
}

impl DbManager {
    /// Opens the database at `db_path`, creating the schema for a new file.
    ///
    /// Fails with `SchemaVersionMismatch` when the stored version is older
    /// than [`DB_VERSION`]; there is no migration.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db_manager = Self {
            db_path: db_path.to_path_buf(),
        };
        let mut conn = db_manager.connect()?;

        let table_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
            [],
            |row| row.get(0),
        )?;
        if table_count == 0 {
            let tx = conn.transaction()?;
            tx.execute_batch(SCHEMA)?;
            tx.execute(
                "INSERT INTO leviathan_meta (key, value) VALUES (?1, ?2)",
                params![DB_VERSION_KEY, DB_VERSION.to_string()],
            )?;
            tx.commit()?;
            debug!("Created library database {}", db_path.display());
            return Ok(db_manager);
        }

        let has_meta: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'leviathan_meta'",
            [],
            |row| row.get(0),
        )?;
        let found = if has_meta {
            conn.query_row(
                "SELECT value FROM leviathan_meta WHERE key = ?1",
                params![DB_VERSION_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|value| value.trim().parse::<u32>().ok())
            .unwrap_or(0)
        } else {
            0
        };

        if found < DB_VERSION {
            return Err(LibraryError::SchemaVersionMismatch {
                found,
                expected: DB_VERSION,
            });
        }
        if found > DB_VERSION {
            warn!(
                "Library database {} has schema version {} (newer than {})",
                db_path.display(),
                found,
                DB_VERSION
            );
        }
        Ok(db_manager)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 15000;",
        )?;
        Ok(conn)
    }

    pub fn meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connect()?;
        Ok(conn
            .query_row(
                "SELECT value FROM leviathan_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO leviathan_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn query_songs<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Song>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let songs = stmt
            .query_map(params, song_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(songs)
    }

    /// All songs in library order.
    pub fn songs(&self) -> Result<Vec<Song>> {
        self.query_songs(
            &format!("SELECT {SONG_COLUMNS} FROM songs ORDER BY {LIBRARY_ORDER}"),
            [],
        )
    }

    pub fn song_by_id(&self, id: i64) -> Result<Song> {
        let conn = self.connect()?;
        conn.query_row(
            &format!("SELECT {SONG_COLUMNS} FROM songs WHERE songs.id = ?1"),
            params![id],
            song_from_row,
        )
        .optional()?
        .ok_or_else(|| LibraryError::NotFound(format!("song with id {id}")))
    }

    pub fn find_song_by_relpath(&self, relpath: &str) -> Result<Option<Song>> {
        let conn = self.connect()?;
        Ok(conn
            .query_row(
                &format!("SELECT {SONG_COLUMNS} FROM songs WHERE songs.relpath = ?1"),
                params![relpath],
                song_from_row,
            )
            .optional()?)
    }

    pub fn song_by_relpath(&self, relpath: &str) -> Result<Song> {
        self.find_song_by_relpath(relpath)?
            .ok_or_else(|| LibraryError::NotFound(format!("song {relpath}")))
    }

    /// Inserts `record`, or updates the row with the same relpath. Returns the song id.
    pub fn upsert_song(&self, record: &SongRecord) -> Result<i64> {
        let conn = self.connect()?;
        upsert_song_in(&conn, record)
    }

    /// Rewrites song relpaths for each `(old, new)` pair in one transaction.
    /// Returns how many rows changed; pairs with no matching song are skipped.
    pub fn update_song_relpaths(&self, renames: &[(String, String)]) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare("UPDATE songs SET relpath = ?2 WHERE relpath = ?1")?;
            for (old_relpath, new_relpath) in renames {
                updated += stmt.execute(params![old_relpath, new_relpath])?;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    /// Deletes a song and all of its memberships. Returns the playlists it belonged to.
    pub fn remove_song(&self, song_id: i64) -> Result<Vec<Playlist>> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let playlists = playlists_for_song_in(&tx, song_id)?;
        tx.execute(
            "DELETE FROM playlist_entries WHERE song = ?1",
            params![song_id],
        )?;
        let removed = tx.execute("DELETE FROM songs WHERE id = ?1", params![song_id])?;
        if removed == 0 {
            return Err(LibraryError::NotFound(format!("song with id {song_id}")));
        }
        tx.commit()?;
        Ok(playlists)
    }

    /// All playlists ordered by name.
    pub fn playlists(&self) -> Result<Vec<Playlist>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id, name FROM playlists ORDER BY name")?;
        let playlists = stmt
            .query_map([], playlist_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(playlists)
    }

    pub fn playlists_for_song(&self, song_id: i64) -> Result<Vec<Playlist>> {
        let conn = self.connect()?;
        playlists_for_song_in(&conn, song_id)
    }

    pub fn find_playlist_by_name(&self, name: &str) -> Result<Option<Playlist>> {
        let conn = self.connect()?;
        Ok(conn
            .query_row(
                "SELECT id, name FROM playlists WHERE name = ?1",
                params![name],
                playlist_from_row,
            )
            .optional()?)
    }

    pub fn playlist_by_name(&self, name: &str) -> Result<Playlist> {
        self.find_playlist_by_name(name)?
            .ok_or_else(|| LibraryError::NotFound(format!("playlist '{name}'")))
    }

    pub fn playlist_by_id(&self, id: i64) -> Result<Playlist> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT id, name FROM playlists WHERE id = ?1",
            params![id],
            playlist_from_row,
        )
        .optional()?
        .ok_or_else(|| LibraryError::NotFound(format!("playlist with id {id}")))
    }

    /// Returns the playlist named `name`, creating the row when missing.
    pub fn insert_playlist(&self, name: &str) -> Result<Playlist> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR IGNORE INTO playlists (name) VALUES (?1)",
            params![name],
        )?;
        Ok(conn.query_row(
            "SELECT id, name FROM playlists WHERE name = ?1",
            params![name],
            playlist_from_row,
        )?)
    }

    pub fn rename_playlist(&self, playlist_id: i64, new_name: &str) -> Result<()> {
        let conn = self.connect()?;
        let renamed = conn.execute(
            "UPDATE playlists SET name = ?2 WHERE id = ?1",
            params![playlist_id, new_name],
        )?;
        if renamed == 0 {
            return Err(LibraryError::NotFound(format!(
                "playlist with id {playlist_id}"
            )));
        }
        Ok(())
    }

    /// Deletes a playlist row and all of its memberships.
    pub fn remove_playlist(&self, playlist_id: i64) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM playlist_entries WHERE playlist = ?1",
            params![playlist_id],
        )?;
        let removed = tx.execute("DELETE FROM playlists WHERE id = ?1", params![playlist_id])?;
        if removed == 0 {
            return Err(LibraryError::NotFound(format!(
                "playlist with id {playlist_id}"
            )));
        }
        tx.commit()?;
        Ok(())
    }

    /// Adds one member (creating its song first when needed). Returns the song id.
    pub fn add_member(&self, playlist_id: i64, source: &MemberSource) -> Result<i64> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let song_id = add_member_in(&tx, playlist_id, source)?;
        tx.commit()?;
        Ok(song_id)
    }

    /// Adds every member of an imported playlist file in one transaction.
    pub fn import_playlist(&self, playlist_id: i64, sources: &[MemberSource]) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        for source in sources {
            add_member_in(&tx, playlist_id, source)?;
        }
        tx.commit()?;
        Ok(sources.len())
    }

    pub fn has_entry(&self, song_id: i64, playlist_id: i64) -> Result<bool> {
        let conn = self.connect()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) > 0 FROM playlist_entries WHERE song = ?1 AND playlist = ?2",
            params![song_id, playlist_id],
            |row| row.get(0),
        )?)
    }

    /// Returns whether a membership row was deleted.
    pub fn remove_entry(&self, song_id: i64, playlist_id: i64) -> Result<bool> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM playlist_entries WHERE song = ?1 AND playlist = ?2",
            params![song_id, playlist_id],
        )?;
        Ok(removed > 0)
    }

    /// Moves a membership between playlists in one transaction.
    pub fn move_entry(&self, song_id: i64, from_playlist: i64, to_playlist: i64) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM playlist_entries WHERE song = ?1 AND playlist = ?2",
            params![song_id, from_playlist],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO playlist_entries (song, playlist) VALUES (?1, ?2)",
            params![song_id, to_playlist],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Members of a playlist in output order.
    pub fn playlist_songs(&self, playlist_id: i64) -> Result<Vec<Song>> {
        self.query_songs(
            &format!(
                "SELECT {SONG_COLUMNS} FROM songs
                 JOIN playlist_entries ON playlist_entries.song = songs.id
                 WHERE playlist_entries.playlist = ?1
                 ORDER BY {PLAYLIST_ORDER}"
            ),
            params![playlist_id],
        )
    }

    pub fn artists(&self) -> Result<Vec<Artist>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT artist, MIN(sort_artist) AS sort_name FROM songs
             GROUP BY artist
             ORDER BY sort_name, artist",
        )?;
        let artists = stmt
            .query_map([], |row| {
                Ok(Artist {
                    name: row.get(0)?,
                    sort_name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(artists)
    }

    pub fn artist_songs(&self, artist: &str) -> Result<Vec<Song>> {
        self.query_songs(
            &format!(
                "SELECT {SONG_COLUMNS} FROM songs WHERE songs.artist = ?1 ORDER BY {LIBRARY_ORDER}"
            ),
            params![artist],
        )
    }

    fn query_albums<P: rusqlite::Params>(&self, filter: &str, params: P) -> Result<Vec<Album>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT album, artist FROM songs {filter}
             GROUP BY album, artist
             ORDER BY MIN(sort_album), MIN(sort_artist), album, artist"
        ))?;
        let albums = stmt
            .query_map(params, |row| {
                Ok(Album {
                    name: row.get(0)?,
                    artist: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(albums)
    }

    /// Distinct `(album, artist)` pairs.
    pub fn albums(&self) -> Result<Vec<Album>> {
        self.query_albums("", [])
    }

    pub fn albums_by_artist(&self, artist: &str) -> Result<Vec<Album>> {
        self.query_albums("WHERE artist = ?1", params![artist])
    }

    /// Songs of one album in track order.
    pub fn album_songs(&self, album: &str, artist: &str) -> Result<Vec<Song>> {
        self.query_songs(
            &format!(
                "SELECT {SONG_COLUMNS} FROM songs
                 WHERE songs.album = ?1 AND songs.artist = ?2
                 ORDER BY {PLAYLIST_ORDER}"
            ),
            params![album, artist],
        )
    }

    /// Searches one column. `exact = false` matches `term` anywhere in the value.
    /// An empty `sort` falls back to library order.
    pub fn search(
        &self,
        column: SongColumn,
        term: &str,
        exact: bool,
        sort: &[SongColumn],
    ) -> Result<Vec<Song>> {
        let order = if sort.is_empty() {
            LIBRARY_ORDER.to_string()
        } else {
            sort.iter()
                .map(|column| format!("songs.{}", column.as_sql()))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let (condition, value) = if exact {
            (format!("songs.{} = ?1", column.as_sql()), term.to_string())
        } else {
            (
                format!("songs.{} LIKE ?1 ESCAPE '\\'", column.as_sql()),
                format!("%{}%", escape_like(term)),
            )
        };
        self.query_songs(
            &format!("SELECT {SONG_COLUMNS} FROM songs WHERE {condition} ORDER BY {order}"),
            params![value],
        )
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::{params, Connection};
    use tempfile::TempDir;

    use super::{escape_like, DbManager, MemberSource, DB_VERSION};
    use crate::error::LibraryError;
    use crate::models::{SongColumn, SongRecord};

    fn record(relpath: &str, title: &str, track_number: Option<u32>) -> SongRecord {
        SongRecord {
            relpath: relpath.to_string(),
            title: title.to_string(),
            sort_title: title.to_lowercase(),
            artist: "Artist".to_string(),
            sort_artist: "artist".to_string(),
            album: "Album".to_string(),
            sort_album: "album".to_string(),
            length: Some(120.0),
            disc_number: None,
            track_number,
        }
    }

    fn open_db() -> (TempDir, DbManager) {
        let dir = TempDir::new().expect("temp dir should be created");
        let db = DbManager::open(&dir.path().join("library.sqlite")).expect("db should open");
        (dir, db)
    }

    #[test]
    fn test_open_creates_schema_and_version() {
        let (_dir, db) = open_db();
        assert_eq!(
            db.meta("db_version").expect("meta should be readable"),
            Some(DB_VERSION.to_string())
        );
        DbManager::open(db.path()).expect("reopening a current database should succeed");
    }

    #[test]
    fn test_open_rejects_older_schema() {
        let (_dir, db) = open_db();
        db.set_meta("db_version", "3").expect("meta should be writable");
        let error = DbManager::open(db.path()).expect_err("old schema should be rejected");
        assert!(matches!(
            error,
            LibraryError::SchemaVersionMismatch {
                found: 3,
                expected: DB_VERSION
            }
        ));
    }

    #[test]
    fn test_open_rejects_database_without_meta_table() {
        let dir = TempDir::new().expect("temp dir should be created");
        let path = dir.path().join("foreign.sqlite");
        let conn = Connection::open(&path).expect("sqlite file should be created");
        conn.execute("CREATE TABLE songs (id INTEGER PRIMARY KEY)", params![])
            .expect("table should be created");
        drop(conn);

        let error = DbManager::open(&path).expect_err("unversioned schema should be rejected");
        assert!(matches!(
            error,
            LibraryError::SchemaVersionMismatch { found: 0, .. }
        ));
    }

    #[test]
    fn test_upsert_song_updates_by_relpath() {
        let (_dir, db) = open_db();
        let first_id = db
            .upsert_song(&record("A/B/01.mp3", "Old", Some(1)))
            .expect("insert should succeed");
        let second_id = db
            .upsert_song(&record("A/B/01.mp3", "New", Some(1)))
            .expect("update should succeed");

        assert_eq!(first_id, second_id);
        let song = db.song_by_relpath("A/B/01.mp3").expect("song should exist");
        assert_eq!(song.title, "New");
        assert_eq!(song.track_number, Some(1));
        assert_eq!(db.songs().expect("songs should list").len(), 1);
    }

    #[test]
    fn test_lookup_misses_are_not_found() {
        let (_dir, db) = open_db();
        assert!(matches!(db.song_by_id(42), Err(LibraryError::NotFound(_))));
        assert!(matches!(
            db.song_by_relpath("missing.mp3"),
            Err(LibraryError::NotFound(_))
        ));
        assert!(matches!(
            db.playlist_by_name("Missing"),
            Err(LibraryError::NotFound(_))
        ));
        assert!(matches!(db.remove_song(42), Err(LibraryError::NotFound(_))));
    }

    #[test]
    fn test_membership_is_unique_and_ordered_by_metadata() {
        let (_dir, db) = open_db();
        let playlist = db.insert_playlist("Favorites").expect("playlist should be created");
        let beta = db
            .add_member(playlist.id, &MemberSource::New(record("A/B/beta.mp3", "Beta", None)))
            .expect("member should be added");
        db.add_member(playlist.id, &MemberSource::New(record("A/B/alpha.mp3", "Alpha", None)))
            .expect("member should be added");
        db.add_member(playlist.id, &MemberSource::Existing(beta))
            .expect("duplicate member should be ignored");

        let titles: Vec<_> = db
            .playlist_songs(playlist.id)
            .expect("members should list")
            .into_iter()
            .map(|song| song.title)
            .collect();
        assert_eq!(titles, vec!["Alpha", "Beta"]);
    }

    #[test]
    fn test_playlist_order_puts_track_numbers_before_titles() {
        let (_dir, db) = open_db();
        let playlist = db.insert_playlist("Album").expect("playlist should be created");
        let sources = [
            MemberSource::New(record("A/B/02.mp3", "Aardvark", Some(2))),
            MemberSource::New(record("A/B/01.mp3", "Zebra", Some(1))),
            MemberSource::New(record("A/B/xx.mp3", "Middle", None)),
        ];
        assert_eq!(
            db.import_playlist(playlist.id, &sources)
                .expect("import should succeed"),
            3
        );

        let relpaths: Vec<_> = db
            .playlist_songs(playlist.id)
            .expect("members should list")
            .into_iter()
            .map(|song| song.relpath)
            .collect();
        assert_eq!(relpaths, vec!["A/B/xx.mp3", "A/B/01.mp3", "A/B/02.mp3"]);
    }

    #[test]
    fn test_remove_song_cascades_to_memberships() {
        let (_dir, db) = open_db();
        let first = db.insert_playlist("First").expect("playlist should be created");
        let second = db.insert_playlist("Second").expect("playlist should be created");
        let song_id = db
            .add_member(first.id, &MemberSource::New(record("A/B/01.mp3", "One", None)))
            .expect("member should be added");
        db.add_member(second.id, &MemberSource::Existing(song_id))
            .expect("member should be added");

        let affected = db.remove_song(song_id).expect("song should be removed");
        assert_eq!(affected, vec![first.clone(), second.clone()]);
        assert!(db.playlist_songs(first.id).expect("members should list").is_empty());
        assert!(!db.has_entry(song_id, second.id).expect("entry lookup should succeed"));
    }

    #[test]
    fn test_move_entry_and_update_relpaths() {
        let (_dir, db) = open_db();
        let from = db.insert_playlist("From").expect("playlist should be created");
        let to = db.insert_playlist("To").expect("playlist should be created");
        let song_id = db
            .add_member(from.id, &MemberSource::New(record("Old/01.mp3", "One", None)))
            .expect("member should be added");

        db.move_entry(song_id, from.id, to.id).expect("move should succeed");
        assert!(!db.has_entry(song_id, from.id).expect("entry lookup should succeed"));
        assert!(db.has_entry(song_id, to.id).expect("entry lookup should succeed"));

        let updated = db
            .update_song_relpaths(&[
                ("Old/01.mp3".to_string(), "New/01.mp3".to_string()),
                ("Old/missing.mp3".to_string(), "New/missing.mp3".to_string()),
            ])
            .expect("relpath update should succeed");
        assert_eq!(updated, 1);
        assert_eq!(
            db.song_by_id(song_id).expect("song should exist").relpath,
            "New/01.mp3"
        );
    }

    #[test]
    fn test_rename_and_remove_playlist() {
        let (_dir, db) = open_db();
        let playlist = db.insert_playlist("Draft").expect("playlist should be created");
        db.add_member(playlist.id, &MemberSource::New(record("A/01.mp3", "One", None)))
            .expect("member should be added");

        db.rename_playlist(playlist.id, "Final").expect("rename should succeed");
        assert_eq!(
            db.playlist_by_id(playlist.id).expect("playlist should exist").name,
            "Final"
        );

        db.remove_playlist(playlist.id).expect("remove should succeed");
        assert!(db.playlists().expect("playlists should list").is_empty());
        assert_eq!(db.songs().expect("songs should list").len(), 1);
    }

    #[test]
    fn test_albums_and_artists_are_grouped() {
        let (_dir, db) = open_db();
        let mut other = record("Other/01.mp3", "Solo", None);
        other.artist = "Another".to_string();
        other.sort_artist = "another".to_string();
        other.album = "Zeta".to_string();
        other.sort_album = "zeta".to_string();
        for song in [record("A/01.mp3", "One", Some(1)), record("A/02.mp3", "Two", Some(2)), other] {
            db.upsert_song(&song).expect("song should be stored");
        }

        let artists: Vec<_> = db
            .artists()
            .expect("artists should list")
            .into_iter()
            .map(|artist| artist.name)
            .collect();
        assert_eq!(artists, vec!["Another", "Artist"]);

        let albums = db.albums().expect("albums should list");
        assert_eq!(albums.len(), 2);
        assert_eq!(albums[0].name, "Album");
        assert_eq!(
            db.albums_by_artist("Another").expect("albums should list")[0].name,
            "Zeta"
        );
        assert_eq!(
            db.album_songs("Album", "Artist")
                .expect("album songs should list")
                .len(),
            2
        );
        assert_eq!(db.artist_songs("Another").expect("songs should list").len(), 1);
    }

    #[test]
    fn test_search_escapes_like_wildcards() {
        let (_dir, db) = open_db();
        db.upsert_song(&record("A/01.mp3", "100% Pure", None))
            .expect("song should be stored");
        db.upsert_song(&record("A/02.mp3", "1000 Pure", None))
            .expect("song should be stored");

        let matches = db
            .search(SongColumn::Title, "0%", false, &[])
            .expect("search should succeed");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].title, "100% Pure");

        let exact = db
            .search(SongColumn::Relpath, "A/02.mp3", true, &[SongColumn::Title])
            .expect("search should succeed");
        assert_eq!(exact.len(), 1);
        assert_eq!(escape_like(r"a_b\c"), r"a\_b\\c");
    }
}
