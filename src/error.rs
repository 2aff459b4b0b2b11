//! Crate-wide error type.

use std::path::PathBuf;

use thiserror::Error;

use crate::library::MovePlan;

/// Errors surfaced by the library engine and its collaborators.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// A path resolves outside the root it must stay inside.
    #[error("the path {} is not within {}", path.display(), root.display())]
    PathViolation { path: PathBuf, root: PathBuf },

    /// Song or playlist lookup miss.
    #[error("not found: {0}")]
    NotFound(String),

    /// The database was written by an older schema.
    #[error(
        "the database schema version is old (found {found}, expected {expected}); \
         please delete and recreate the database"
    )]
    SchemaVersionMismatch { found: u32, expected: u32 },

    /// A transcoder process exited abnormally. `code` is `None` when it was killed by a signal.
    #[error("{process} exited with code {}", code.map_or_else(|| "<signal>".to_string(), |c| c.to_string()))]
    TranscodeFailure { process: String, code: Option<i32> },

    /// A path could not be represented as UTF-8.
    #[error("the path {} is not valid UTF-8", .0.display())]
    PathEncoding(PathBuf),

    /// A move whose source and destination cannot be reconciled.
    #[error("cannot move {} to {}: {reason}", src.display(), dst.display())]
    InvalidMove {
        src: PathBuf,
        dst: PathBuf,
        reason: String,
    },

    /// A move stopped part way. `plan` lists the files already moved and the
    /// ones left; applying it again resumes the move.
    #[error(
        "moving {} stopped after {} file(s): {source}",
        plan.source().display(),
        plan.completed().len()
    )]
    MoveInterrupted {
        plan: Box<MovePlan>,
        source: Box<LibraryError>,
    },

    #[error("invalid playlist {}: {reason}", path.display())]
    InvalidPlaylist { path: PathBuf, reason: String },

    #[error("could not write tags to {}: {reason}", path.display())]
    TagWrite { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, LibraryError>;

#[cfg(test)]
mod tests {
    use super::LibraryError;

    #[test]
    fn test_transcode_failure_message_names_process_and_code() {
        let error = LibraryError::TranscodeFailure {
            process: "lame".to_string(),
            code: Some(3),
        };
        assert_eq!(error.to_string(), "lame exited with code 3");
    }

    #[test]
    fn test_transcode_failure_message_without_code_mentions_signal() {
        let error = LibraryError::TranscodeFailure {
            process: "ffmpeg".to_string(),
            code: None,
        };
        assert_eq!(error.to_string(), "ffmpeg exited with code <signal>");
    }
}
