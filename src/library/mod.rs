//! The sync engine and the filesystem operations it drives.

pub mod library_manager;
pub mod move_plan;
pub mod sanitize;

pub use library_manager::{LibraryManager, ScanSummary};
pub use move_plan::MovePlan;
pub use sanitize::SanitizeReport;
