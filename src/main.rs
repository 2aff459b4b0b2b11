use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};

use leviathan::config::{default_config_path, Config};
use leviathan::models::{Song, SongColumn};
use leviathan::{LibraryError, LibraryManager, Result};

#[derive(Parser)]
#[command(name = "leviathan")]
#[command(about = "Music library indexer with mirrored playlist files", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to leviathan.toml in the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add new songs and playlists found on disk
    Scan {
        #[arg(value_enum, default_value_t = ScanTarget::All)]
        target: ScanTarget,
    },
    /// Move a file or directory inside the music root
    #[command(alias = "mv")]
    Move { src: PathBuf, dst: PathBuf },
    /// Manage playlists
    #[command(alias = "pls")]
    Playlist {
        #[command(subcommand)]
        command: PlaylistCommand,
    },
    /// Manage songs
    Song {
        #[command(subcommand)]
        command: SongCommand,
    },
    /// Transcode tracks without an MP3 copy, then rewrite all playlists
    ToMp3,
    /// Fix permissions and extract missing album art
    Sanitize,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScanTarget {
    Songs,
    Playlists,
    All,
}

#[derive(Subcommand)]
enum PlaylistCommand {
    /// Track a playlist, importing its file when one exists
    Add { name: String },
    /// Forget a playlist and delete its files
    #[command(alias = "rm")]
    Delete { name: String },
    /// List playlists, or the songs of one playlist
    Ls { name: Option<String> },
    /// Rewrite one playlist, or every playlist that is not ignored
    Save { name: Option<String> },
    Rename { name: String, new_name: String },
    AddSong { name: String, song: PathBuf },
    RemoveSong { name: String, song: PathBuf },
    MoveSong { song: PathBuf, from: String, to: String },
}

#[derive(Subcommand)]
enum SongCommand {
    Add { path: PathBuf },
    /// Re-read the tags of a tracked song
    Update { path: PathBuf },
    /// Forget a song; the file stays on disk
    #[command(alias = "rm")]
    Remove { path: PathBuf },
    /// Search songs by one field
    Find {
        #[arg(value_parser = parse_column)]
        field: SongColumn,
        term: String,
        /// Match any value containing the term
        #[arg(long)]
        like: bool,
        /// Sort fields, comma separated
        #[arg(long, value_parser = parse_column, value_delimiter = ',', default_value = "sort_title")]
        sort: Vec<SongColumn>,
    },
}

fn parse_column(value: &str) -> std::result::Result<SongColumn, String> {
    value.parse()
}

/// Paths typed on the command line are relative to the working directory when
/// they exist there, and to the music root otherwise.
fn cli_path(path: PathBuf) -> PathBuf {
    if path.is_relative() && path.exists() {
        std::path::absolute(&path).unwrap_or(path)
    } else {
        path
    }
}

fn print_songs(songs: &[Song]) {
    for song in songs {
        println!("{}", song.relpath);
    }
}

fn open_library(config_path: Option<PathBuf>) -> Result<LibraryManager> {
    let config_path = config_path
        .or_else(default_config_path)
        .ok_or_else(|| LibraryError::Config("no configuration directory found".to_string()))?;
    let config_path = std::path::absolute(&config_path)?;
    let base_dir = config_path.parent().unwrap_or(Path::new("/"));
    let settings = Config::load(&config_path)?.validate(base_dir)?;
    LibraryManager::open(settings)
}

fn run_playlist(library: &LibraryManager, command: PlaylistCommand) -> Result<()> {
    match command {
        PlaylistCommand::Add { name } => {
            library.add_playlist(&name)?;
        }
        PlaylistCommand::Delete { name } => library.remove_playlist(&name)?,
        PlaylistCommand::Ls { name: Some(name) } => print_songs(&library.playlist_songs(&name)?),
        PlaylistCommand::Ls { name: None } => {
            for playlist in library.playlists()? {
                println!("{}", playlist.name);
            }
        }
        PlaylistCommand::Save { name: Some(name) } => {
            library.save_playlist(&name)?;
        }
        PlaylistCommand::Save { name: None } => {
            library.save_all_playlists()?;
        }
        PlaylistCommand::Rename { name, new_name } => {
            library.rename_playlist(&name, &new_name)?;
        }
        PlaylistCommand::AddSong { name, song } => {
            library.add_song_to_playlist(&name, &cli_path(song))?;
        }
        PlaylistCommand::RemoveSong { name, song } => {
            if !library.remove_song_from_playlist(&name, &cli_path(song.clone()))? {
                info!("{} is not in playlist {}", song.display(), name);
            }
        }
        PlaylistCommand::MoveSong { song, from, to } => {
            library.move_song_between_playlists(&cli_path(song), &from, &to)?
        }
    }
    Ok(())
}

fn run_song(library: &LibraryManager, command: SongCommand) -> Result<()> {
    match command {
        SongCommand::Add { path } => {
            if library.add_song(&cli_path(path.clone()))?.is_none() {
                info!("{} has no readable tags", path.display());
            }
        }
        SongCommand::Update { path } => {
            library.update_song(&cli_path(path))?;
        }
        SongCommand::Remove { path } => {
            library.remove_song(&cli_path(path))?;
        }
        SongCommand::Find {
            field,
            term,
            like,
            sort,
        } => print_songs(&library.search(field, &term, !like, &sort)?),
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let library = open_library(cli.config)?;
    match cli.command {
        Command::Scan { target } => match target {
            ScanTarget::Songs => {
                library.scan_songs()?;
            }
            ScanTarget::Playlists => {
                library.scan_playlists()?;
                library.save_all_playlists()?;
            }
            ScanTarget::All => {
                library.scan()?;
            }
        },
        Command::Move { src, dst } => {
            library.move_path(&cli_path(src), &cli_path(dst))?;
        }
        Command::Playlist { command } => run_playlist(&library, command)?,
        Command::Song { command } => run_song(&library, command)?,
        Command::ToMp3 => {
            let written = library.to_mp3()?;
            info!("Wrote {} MP3 file(s)", written.len());
        }
        Command::Sanitize => {
            let report = library.sanitize();
            for album in &report.missing_albumart {
                println!("missing album art: {}", album.display());
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut clog = colog::default_builder();
    clog.filter(
        None,
        if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        },
    );
    clog.init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
