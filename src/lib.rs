//! vmigrate library exports for testing.
//!
//! Integration tests in `tests/` drive the converter and fixer through a
//! fake `CommandRunner`; nothing here needs libguestfs.

pub mod common;
pub mod config;
pub mod converter;
pub mod fixer;
pub mod guest;
pub mod logging;
pub mod migrate;
pub mod ova;
pub mod patch;
pub mod preflight;
pub mod process;
pub mod timing;
pub mod tools;
