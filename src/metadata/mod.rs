//! Audio file metadata: raw tag access and song record extraction.

pub mod extractor;
pub mod metadata_tags;

pub use extractor::{audio_format, AudioFormat, MetadataExtractor};
pub use metadata_tags::{LoftyTagReader, RawTags, TagReader};
