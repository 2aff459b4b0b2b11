//! Music library indexing with playlist files mirrored in several formats.

pub mod config;
pub mod db_manager;
pub mod error;
pub mod library;
pub mod media_file_discovery;
pub mod metadata;
pub mod models;
pub mod path_guard;
pub mod playlist;
pub mod sort_key;
pub mod text_template;
pub mod transcode;

pub use error::{LibraryError, Result};
pub use library::LibraryManager;
