//! Shared utilities across vmigrate modules.

pub mod files;

pub use files::{backup_once, backup_path, patch_file, write_atomic, BACKUP_SUFFIX};
