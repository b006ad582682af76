//! Conversion stage: source image in, customized qcow2 out.
//!
//! Steps:
//! 1. Run virt-v2v into a private build directory
//! 2. Locate the produced artifact (its name varies across virt-v2v versions)
//! 3. Detect the guest boot mode
//! 4. Run the personalization script, protecting the credential databases
//! 5. Apply the offline customization list in one virt-customize run
//! 6. Move the artifact to its destination
//!
//! Only a missing artifact is fatal. Every later step degrades to a warning.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::{Config, BACKEND_VAR};
use crate::guest::{BootMode, Distro};
use crate::logging::MigrationLog;
use crate::patch::fstab::DISABLED_SUFFIX;
use crate::patch::{SCSI_DISK, VIRTIO_DISK};
use crate::process::{Cmd, CommandResult, CommandRunner};
use crate::timing::Timer;
use crate::tools::bootloader::regeneration_chain;
use crate::tools::{Customize, CustomizeOp, Guestfs, InputMode, V2v};

/// Guest files saved before personalization and put back afterwards.
pub const CREDENTIAL_FILES: &[&str] = &["/etc/passwd", "/etc/shadow", "/etc/group", "/etc/gshadow"];

/// sshd drop-in enabling root and password logins on the migrated guest.
pub const SSHD_DROPIN: &str = "/etc/ssh/sshd_config.d/50-vmigrate.conf";

const SSHD_POLICY: &str = "PermitRootLogin yes\nPasswordAuthentication yes\n";

/// A converted image that made it to its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converted {
    pub dest: PathBuf,
    pub boot_mode: BootMode,
    /// Tolerated problems met along the way.
    pub warnings: Vec<String>,
}

/// How a conversion ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// virt-v2v exited 0.
    Success(Converted),
    /// virt-v2v exited non-zero but still left an artifact behind.
    DegradedSuccess { converted: Converted, exit_code: i32 },
    /// No artifact; nothing was written to the destination.
    Failure {
        exit_code: Option<i32>,
        reason: String,
    },
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ConversionOutcome::Failure { .. })
    }

    pub fn converted(&self) -> Option<&Converted> {
        match self {
            ConversionOutcome::Success(c) => Some(c),
            ConversionOutcome::DegradedSuccess { converted, .. } => Some(converted),
            ConversionOutcome::Failure { .. } => None,
        }
    }

    /// Engine exit code, when the engine ran at all.
    pub fn engine_exit_code(&self) -> Option<i32> {
        match self {
            ConversionOutcome::Success(_) => Some(0),
            ConversionOutcome::DegradedSuccess { exit_code, .. } => Some(*exit_code),
            ConversionOutcome::Failure { exit_code, .. } => *exit_code,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConversionOutcome::Success(_) => "success",
            ConversionOutcome::DegradedSuccess { .. } => "degraded",
            ConversionOutcome::Failure { .. } => "failure",
        }
    }
}

/// Find the artifact virt-v2v left in `dir`.
///
/// Known names are tried first; otherwise the first `*.qcow2` file found
/// (in sorted order) wins.
pub fn locate_artifact(dir: &Path, candidates: &[String]) -> Option<PathBuf> {
    if let Some(found) = candidates
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
    {
        return Some(found);
    }

    let mut scanned: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "qcow2"))
        .collect();
    scanned.sort();
    scanned.into_iter().next()
}

/// Shell snippet that disables fstab lines whose device node is absent.
///
/// Mirrors [`crate::patch::fstab::disable_missing_devices`] for use inside
/// the customization appliance.
pub fn fstab_repair_script() -> String {
    fstab_repair_script_for("/etc/fstab")
}

/// [`fstab_repair_script`] against an arbitrary fstab path.
///
/// Leading blanks are ignored when matching the device but kept in the
/// output, so indented entries are handled like the Rust repair does.
pub fn fstab_repair_script_for(fstab: &str) -> String {
    format!(
        concat!(
            "f='{fstab}'; [ -f \"$f\" ] || exit 0; ",
            "[ -e \"$f.pre-fix\" ] || cp -p \"$f\" \"$f.pre-fix\"; ",
            "tmp=\"$f.vmigrate\"; ",
            "while IFS= read -r line || [ -n \"$line\" ]; do ",
            "l=${{line#\"${{line%%[![:space:]]*}}\"}}; ",
            "case \"$l\" in ",
            "/dev/*) dev=${{l%%[[:space:]]*}}; ",
            "base=$(printf '%s' \"$dev\" | sed 's/[0-9]*$//'); ",
            "if [ -b \"$dev\" ] || [ -b \"$base\" ]; then printf '%s\\n' \"$line\"; ",
            "else printf '# %s %s\\n' \"$line\" '{suffix}'; fi ;; ",
            "*) printf '%s\\n' \"$line\" ;; ",
            "esac; done < \"$f\" > \"$tmp\" && cat \"$tmp\" > \"$f\"; rm -f \"$tmp\""
        ),
        fstab = fstab,
        suffix = DISABLED_SUFFIX
    )
}

fn rewrite_vda_command(path: &str) -> String {
    format!(
        "[ -f {path} ] && sed -i 's|{from}|{to}|g' {path} || true",
        path = path,
        from = VIRTIO_DISK,
        to = SCSI_DISK
    )
}

/// The ordered offline customization list for a guest in `boot_mode`.
pub fn customization_ops(boot_mode: BootMode) -> Vec<CustomizeOp> {
    vec![
        CustomizeOp::Mkdir("/etc/ssh/sshd_config.d".to_string()),
        CustomizeOp::Write {
            path: SSHD_DROPIN.to_string(),
            content: SSHD_POLICY.to_string(),
        },
        CustomizeOp::RunCommand(rewrite_vda_command("/etc/fstab")),
        CustomizeOp::RunCommand(rewrite_vda_command("/etc/default/grub")),
        // The distro is unknown before the guest boots, so try every vendor dir
        CustomizeOp::RunCommand(regeneration_chain(boot_mode, Distro::Unknown)),
        CustomizeOp::RunCommand(fstab_repair_script()),
        CustomizeOp::SelinuxRelabel,
    ]
}

/// Move `src` to `dest` without ever exposing a half-written `dest`.
///
/// Tries a rename first; across filesystems, copies to `dest.partial` and
/// renames that into place.
pub fn move_into_place(src: &Path, dest: &Path) -> Result<()> {
    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }

    let mut partial = dest.as_os_str().to_os_string();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let copied = fs::copy(src, &partial)
        .map_err(anyhow::Error::from)
        .and_then(|_| fs::rename(&partial, dest).map_err(anyhow::Error::from));
    if let Err(e) = copied {
        let _ = fs::remove_file(&partial);
        return Err(e).with_context(|| {
            format!("Failed to move {} to {}", src.display(), dest.display())
        });
    }
    let _ = fs::remove_file(src);
    Ok(())
}

/// Runs the conversion stage.
pub struct Converter<'a> {
    config: &'a Config,
    runner: &'a dyn CommandRunner,
    log: &'a MigrationLog,
}

impl<'a> Converter<'a> {
    pub fn new(config: &'a Config, runner: &'a dyn CommandRunner, log: &'a MigrationLog) -> Self {
        Self {
            config,
            runner,
            log,
        }
    }

    /// Run a tool, recording it in the migration log. Spawn errors become `None`.
    fn run_logged(&self, cmd: Cmd) -> Option<CommandResult> {
        match self.runner.run(cmd.clone()) {
            Ok(result) => {
                self.log.record(&cmd, &result);
                Some(result)
            }
            Err(e) => {
                self.log.append(&format!("$ {}\n{:#}", cmd.display(), e));
                warn!("{}: {:#}", cmd.program(), e);
                None
            }
        }
    }

    /// Convert `source` and place the result at `dest`.
    pub fn convert(&self, source: &Path, dest: &Path) -> Result<ConversionOutcome> {
        let mode = InputMode::from_path(source)?;
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "image".to_string());

        fs::create_dir_all(&self.config.work_dir)?;
        let build = tempfile::Builder::new()
            .prefix("vmigrate-build-")
            .tempdir_in(&self.config.work_dir)
            .with_context(|| {
                format!("Failed to create build directory in {}", self.config.work_dir.display())
            })?;
        let out_dir = build.path().join("out");
        let creds_dir = build.path().join("credentials");
        fs::create_dir_all(&out_dir)?;
        fs::create_dir_all(&creds_dir)?;

        // Step 1: conversion engine
        let v2v = V2v {
            mode,
            source: source.to_path_buf(),
            output_dir: out_dir.clone(),
            output_name: stem,
            backend: self.config.backend.clone(),
        };
        info!(
            "Converting {} ({} input) with {}={}",
            source.display(),
            mode.flag(),
            BACKEND_VAR,
            self.config.backend
        );
        let timer = Timer::start("virt-v2v");
        let engine = self.run_logged(v2v.to_cmd());
        timer.finish();
        let exit_code = engine.as_ref().map(CommandResult::code);

        // Step 2: the artifact decides success, not the exit code
        let Some(artifact) = locate_artifact(&out_dir, &v2v.artifact_candidates()) else {
            return Ok(ConversionOutcome::Failure {
                exit_code,
                reason: format!("virt-v2v produced no qcow2 in {}", out_dir.display()),
            });
        };
        if exit_code != Some(0) {
            warn!(
                "virt-v2v exited with {:?} but produced {}; continuing",
                exit_code,
                artifact.display()
            );
        }
        info!("Artifact: {}", artifact.display());
        fs::set_permissions(&artifact, fs::Permissions::from_mode(0o644))
            .with_context(|| format!("Failed to chmod {}", artifact.display()))?;

        let mut warnings = Vec::new();
        let guest = Guestfs::new(&artifact, &self.config.backend);

        // Step 3: boot mode
        let boot_mode = self.detect_boot_mode(&guest);
        info!("Boot mode: {}", boot_mode);

        // Step 4: personalization with credential round-trip
        self.personalize(&guest, &creds_dir, &mut warnings);

        // Step 5: offline customization
        let customize = Customize::new(&artifact, &self.config.backend)
            .ops(customization_ops(boot_mode));
        info!("Applying {} customization steps", customize.get_ops().len());
        let timer = Timer::start("virt-customize");
        match self.run_logged(customize.to_cmd()) {
            Some(r) if r.success() => {}
            Some(r) => warnings.push(format!("virt-customize exited with code {}", r.code())),
            None => warnings.push("virt-customize could not be started".to_string()),
        }
        timer.finish();

        // Step 6: hand over
        move_into_place(&artifact, dest)?;
        info!("Image written to {}", dest.display());

        for w in &warnings {
            warn!("{}", w);
        }

        let converted = Converted {
            dest: dest.to_path_buf(),
            boot_mode,
            warnings,
        };
        Ok(match exit_code {
            Some(0) => ConversionOutcome::Success(converted),
            code => ConversionOutcome::DegradedSuccess {
                converted,
                exit_code: code.unwrap_or(-1),
            },
        })
    }

    /// UEFI iff `/boot/efi/EFI` lists anything.
    pub fn detect_boot_mode(&self, guest: &Guestfs) -> BootMode {
        let listing = self
            .run_logged(guest.ls("/boot/efi/EFI"))
            .filter(CommandResult::success)
            .map(|r| r.stdout)
            .unwrap_or_default();
        BootMode::from_efi_listing(&listing)
    }

    /// Run the personalization script with credential databases saved around it.
    fn personalize(&self, guest: &Guestfs, creds_dir: &Path, warnings: &mut Vec<String>) {
        let mut saved = Vec::new();
        for file in CREDENTIAL_FILES {
            let name = file.rsplit('/').next().unwrap_or(*file);
            let copied = self
                .run_logged(guest.copy_out(file, creds_dir))
                .is_some_and(|r| r.success());
            if copied && creds_dir.join(name).is_file() {
                saved.push((*file, creds_dir.join(name)));
            } else {
                warnings.push(format!("Could not back up {}", file));
            }
        }

        info!("Running personalization script {}", self.config.script.display());
        let script = Cmd::new(&self.config.python)
            .arg_path(&self.config.script)
            .arg_path(guest.image())
            .env(BACKEND_VAR, &self.config.backend)
            .allow_fail();
        let timer = Timer::start("personalization");
        match self.run_logged(script) {
            Some(r) if r.success() => {}
            Some(r) => warnings.push(format!("Personalization script exited with code {}", r.code())),
            None => warnings.push("Personalization script could not be started".to_string()),
        }
        timer.finish();

        for (file, host_copy) in saved {
            let restored = self
                .run_logged(guest.copy_in(&host_copy, "/etc"))
                .is_some_and(|r| r.success());
            if restored {
                info!("Restored {}", file);
            } else {
                warnings.push(format!("Failed to restore {}", file));
            }
        }
    }
}
