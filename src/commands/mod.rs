//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `migrate` - Full migration (`migrate`) or conversion only (`convert`)
//! - `fix` - Post-boot fixer, run on the migrated guest
//! - `inspect` - Read-only checks of a converted image
//! - `preflight` - Run preflight checks
//! - `show` - Display information

mod fix;
mod inspect;
pub mod migrate;
mod preflight;
pub mod show;

pub use fix::cmd_fix;
pub use inspect::cmd_inspect;
pub use migrate::{cmd_convert, cmd_migrate};
pub use preflight::cmd_preflight;
pub use show::cmd_show;
