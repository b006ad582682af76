//! End-to-end migration: validation, conversion, sanity checks, archiving.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::Config;
use crate::converter::{ConversionOutcome, Converter};
use crate::guest::BootMode;
use crate::logging::{MigrationLog, TAIL_LINES};
use crate::ova;
use crate::patch::fstab::{self, FstabEntry};
use crate::preflight;
use crate::process::{CommandResult, CommandRunner};
use crate::tools::{Guestfs, InputMode};

/// Timestamp suffix for archived files.
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}

/// Check the source and destination paths before doing any work.
pub fn validate_paths(source: &Path, dest: &Path) -> Result<InputMode> {
    if !source.is_file() {
        bail!("Source image not found: {}", source.display());
    }
    let mode = InputMode::from_path(source)?;

    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if !parent.is_dir() {
        bail!("Destination directory does not exist: {}", parent.display());
    }
    if dest.is_dir() {
        bail!("Destination is a directory: {}", dest.display());
    }
    if dest
        .extension()
        .map_or(true, |ext| !ext.eq_ignore_ascii_case("qcow2"))
    {
        warn!("Destination {} does not end in .qcow2", dest.display());
    }
    if dest.exists() {
        warn!("Destination {} exists and will be replaced", dest.display());
    }
    Ok(mode)
}

/// Console lines announcing the disk count of an OVA.
pub fn disk_count_lines(count: usize) -> Vec<String> {
    let mut lines = vec![format!("Nombre de disques détectés: {}", count)];
    if count > 1 {
        lines.push(format!(
            "WARNING: {} disks found; only the first (system) disk is migrated. \
             Mount points on the other disks will be disabled in fstab.",
            count
        ));
    }
    lines
}

/// Count and report the disks of an OVA. `None` for plain disk sources.
pub fn report_disk_count(source: &Path, mode: InputMode) -> Result<Option<usize>> {
    if mode != InputMode::Ova {
        return Ok(None);
    }
    let count = ova::count_disks(source)?;
    for line in disk_count_lines(count) {
        println!("{}", line);
    }
    if count > 1 {
        warn!("Multi-disk OVA ({} disks), migrating the system disk only", count);
    }
    Ok(Some(count))
}

/// What the read-only post-conversion inspection found.
#[derive(Debug, Clone, Serialize)]
pub struct SanityReport {
    pub size_bytes: u64,
    pub boot_mode: BootMode,
    /// Active fstab entries that look like they need another disk.
    pub suspicious_mounts: Vec<String>,
    /// fstab lines the migration already disabled.
    pub disabled_mounts: Vec<String>,
}

impl SanityReport {
    pub fn print(&self) {
        println!("=== Image Check ===");
        println!("  Size: {} MB", self.size_bytes / 1024 / 1024);
        println!("  Boot mode: {}", self.boot_mode);
        if self.suspicious_mounts.is_empty() {
            println!("  fstab: no additional-disk mount points");
        } else {
            println!("  fstab: mount points that may need a missing disk:");
            for line in &self.suspicious_mounts {
                println!("    {}", line);
            }
        }
        for line in &self.disabled_mounts {
            println!("  disabled: {}", line);
        }
        println!();
    }
}

/// Re-open `image` read-only and report size, boot mode and fstab findings.
pub fn sanity_check(image: &Path, config: &Config, runner: &dyn CommandRunner) -> Result<SanityReport> {
    let size_bytes = fs::metadata(image)
        .with_context(|| format!("Cannot stat {}", image.display()))?
        .len();

    let guest = Guestfs::new(image, &config.backend);
    let run = |cmd| runner.run(cmd).ok().filter(CommandResult::success);

    let listing = run(guest.ls("/boot/efi/EFI"))
        .map(|r| r.stdout)
        .unwrap_or_default();
    let boot_mode = BootMode::from_efi_listing(&listing);

    let fstab_content = match run(guest.cat("/etc/fstab")) {
        Some(r) => r.stdout,
        None => {
            warn!("Could not read /etc/fstab from {}", image.display());
            String::new()
        }
    };

    Ok(SanityReport {
        size_bytes,
        boot_mode,
        suspicious_mounts: fstab::suspicious_mounts(&fstab_content)
            .into_iter()
            .map(|FstabEntry { line, .. }| line)
            .collect(),
        disabled_mounts: fstab::previously_disabled(&fstab_content),
    })
}

/// Machine-readable record archived beside the image.
#[derive(Debug, Serialize)]
pub struct MigrationReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub outcome: &'static str,
    pub engine_exit_code: Option<i32>,
    pub disk_count: Option<usize>,
    pub sha256: Option<String>,
    pub warnings: Vec<String>,
    pub image: Option<SanityReport>,
    pub timestamp: String,
}

/// Files written next to the destination.
#[derive(Debug, Clone)]
pub struct Archive {
    pub log: PathBuf,
    pub fixer: Option<PathBuf>,
    pub report: PathBuf,
}

fn sibling(dest: &Path, suffix: &str) -> PathBuf {
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    dest.with_file_name(format!("{}.{}", stem, suffix))
}

/// Copy the log, the fixer and the JSON report beside `dest`.
pub fn archive(
    dest: &Path,
    log: &MigrationLog,
    fixer: Option<&Path>,
    report: &MigrationReport,
    stamp: &str,
) -> Result<Archive> {
    let log_copy = sibling(dest, &format!("migration-{}.log", stamp));
    fs::copy(log.path(), &log_copy)
        .with_context(|| format!("Failed to archive log to {}", log_copy.display()))?;

    let fixer_copy = match fixer {
        Some(exe) => {
            let target = sibling(dest, &format!("post-boot-fix-{}", stamp));
            fs::copy(exe, &target)
                .with_context(|| format!("Failed to archive fixer to {}", target.display()))?;
            fs::set_permissions(&target, fs::Permissions::from_mode(0o755))?;
            Some(target)
        }
        None => None,
    };

    let report_path = sibling(dest, &format!("migration-{}.json", stamp));
    fs::write(&report_path, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;

    Ok(Archive {
        log: log_copy,
        fixer: fixer_copy,
        report: report_path,
    })
}

/// SHA-256 of a file, hex encoded.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1 << 20];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// Operator instructions printed after a successful migration.
pub fn print_next_steps(dest: &Path, archive: Option<&Archive>, disk_count: Option<usize>) {
    println!("=== Next Steps ===");
    println!("  1. Upload {} as a qcow2 image.", dest.display());
    println!("  2. Boot an instance from it and watch the serial console.");
    match archive.and_then(|a| a.fixer.as_ref()) {
        Some(fixer) => {
            let name = fixer
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!("  3. Copy {} to the instance and run:", fixer.display());
            println!("       sudo ./{} fix", name);
        }
        None => println!("  3. Run `vmigrate fix` on the instance."),
    }
    println!("  4. Reboot (SELinux relabel runs on the first boot).");
    if let Some(count) = disk_count.filter(|&c| c > 1) {
        println!(
            "\n  Only the system disk was migrated. {} other disk(s) must be \
             moved separately and attached as volumes.",
            count - 1
        );
    }
    if let Some(archive) = archive {
        println!("\n  Log:    {}", archive.log.display());
        println!("  Report: {}", archive.report.display());
    }
}

/// Post-conversion steps never fail a migration whose image is in place.
fn degrade<T>(step: &str, result: Result<T>, warnings: &mut Vec<String>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            let msg = format!("{}: {:#}", step, e);
            warn!("{}", msg);
            println!("  warning: {}", msg);
            warnings.push(msg);
            None
        }
    }
}

/// Reason, engine exit code and the tail of the log, on stderr.
pub fn print_failure(exit_code: Option<i32>, reason: &str, log: &MigrationLog) {
    eprintln!("Conversion failed: {}", reason);
    if let Some(code) = exit_code {
        eprintln!("virt-v2v exit code: {}", code);
    }
    eprintln!("--- last {} lines of {} ---", TAIL_LINES, log.path().display());
    for line in log.tail(TAIL_LINES) {
        eprintln!("{}", line);
    }
}

/// Options for [`run_migration`].
pub struct MigrateOptions<'a> {
    pub source: &'a Path,
    pub dest: &'a Path,
    /// Executable archived as the post-boot fixer.
    pub fixer: Option<&'a Path>,
}

/// The wrapper: preflight, bases, conversion, sanity checks, archive.
pub fn run_migration(
    config: &Config,
    runner: &dyn CommandRunner,
    log: &MigrationLog,
    opts: &MigrateOptions<'_>,
) -> Result<ConversionOutcome> {
    println!("=== Migrating {} ===\n", opts.source.display());

    let mode = validate_paths(opts.source, opts.dest)?;
    preflight::run_preflight_or_fail(config, runner)?;
    preflight::ensure_bases(config, runner)?;

    let disk_count = report_disk_count(opts.source, mode)?;

    let outcome = Converter::new(config, runner, log).convert(opts.source, opts.dest)?;

    let converted = match &outcome {
        ConversionOutcome::Failure { exit_code, reason } => {
            print_failure(*exit_code, reason, log);
            bail!("Migration failed: no converted image was produced");
        }
        ConversionOutcome::DegradedSuccess { converted, exit_code } => {
            println!(
                "\nConversion finished with warnings (virt-v2v exit code {}), image present.",
                exit_code
            );
            converted
        }
        ConversionOutcome::Success(converted) => {
            println!("\nConversion succeeded.");
            converted
        }
    };
    for w in &converted.warnings {
        println!("  warning: {}", w);
    }
    println!();

    let mut warnings = converted.warnings.clone();
    let sanity = degrade(
        "Image check failed",
        sanity_check(opts.dest, config, runner),
        &mut warnings,
    );
    if let Some(sanity) = &sanity {
        sanity.print();
    }
    let sha256 = degrade("Checksum failed", sha256_file(opts.dest), &mut warnings);

    let stamp = timestamp();
    let report = MigrationReport {
        source: opts.source.to_path_buf(),
        destination: opts.dest.to_path_buf(),
        outcome: outcome.label(),
        engine_exit_code: outcome.engine_exit_code(),
        disk_count,
        sha256,
        warnings,
        image: sanity,
        timestamp: stamp.clone(),
    };
    info!("Archiving migration artifacts");
    // The report is already written or lost; archive trouble is only shown
    let archive = degrade(
        "Archiving failed",
        archive(opts.dest, log, opts.fixer, &report, &stamp),
        &mut Vec::new(),
    );

    print_next_steps(opts.dest, archive.as_ref(), disk_count);
    Ok(outcome)
}
