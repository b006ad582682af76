//! Typed command builders for the external tools vmigrate drives.
//!
//! Each builder only describes an invocation and renders it to a
//! [`Cmd`](crate::process::Cmd); running it is the caller's business.

pub mod bootloader;
pub mod customize;
pub mod guestfs;
pub mod v2v;

pub use bootloader::GrubMkconfig;
pub use customize::{Customize, CustomizeOp};
pub use guestfs::Guestfs;
pub use v2v::{InputMode, V2v};
