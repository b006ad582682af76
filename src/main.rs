//! vmigrate - move VMware/KVM guests to qcow2 cloud images.
//!
//! Converts an OVA or qcow2 source with virt-v2v, applies offline
//! customizations, and ships a post-boot fixer for what can only be
//! repaired on the running guest.

mod commands;
mod common;
mod config;
mod converter;
mod fixer;
mod guest;
mod logging;
mod migrate;
mod ova;
mod patch;
mod preflight;
mod process;
mod timing;
mod tools;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use config::Config;

#[derive(Parser)]
#[command(name = "vmigrate")]
#[command(about = "Migrate OVA/qcow2 virtual machines to cloud qcow2 images")]
#[command(
    after_help = "QUICK START:\n  vmigrate preflight                 Check host tools\n  vmigrate migrate vm.ova vm.qcow2   Convert and archive\n  vmigrate fix                       Run on the migrated guest after first boot"
)]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert, check and archive (log, fixer, report) beside the destination
    Migrate {
        /// Source image (.ova or .qcow2)
        source: PathBuf,
        /// Destination qcow2 image
        dest: PathBuf,
    },

    /// Convert only, without sanity checks or archiving
    Convert {
        /// Source image (.ova or .qcow2)
        source: PathBuf,
        /// Destination qcow2 image
        dest: PathBuf,
    },

    /// Repair the migrated guest (run on the guest after first boot)
    Fix {
        /// Guest root to repair
        #[arg(long, default_value = "/")]
        root: PathBuf,
    },

    /// Check a converted image: size, boot mode, fstab mount points
    Inspect {
        /// Converted qcow2 image
        image: PathBuf,
    },

    /// Run preflight checks (host tools, script, bases directory)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let base_dir = std::env::current_dir().context("Cannot determine current directory")?;
    let config = Config::load(&base_dir);

    match cli.command {
        Commands::Migrate { source, dest } => {
            commands::cmd_migrate(&config, &source, &dest, cli.verbose)?;
        }

        Commands::Convert { source, dest } => {
            commands::cmd_convert(&config, &source, &dest, cli.verbose)?;
        }

        Commands::Fix { root } => {
            logging::init(cli.verbose, None);
            commands::cmd_fix(&root)?;
        }

        Commands::Inspect { image } => {
            logging::init(cli.verbose, None);
            commands::cmd_inspect(&config, &image)?;
        }

        Commands::Preflight { strict } => {
            logging::init(cli.verbose, None);
            commands::cmd_preflight(&config, strict)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
            };
            commands::cmd_show(show_target, &config)?;
        }
    }

    Ok(())
}
