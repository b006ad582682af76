//! Post-boot fixer, run on the migrated guest itself.
//!
//! Every step is idempotent and backs a file up to `<file>.pre-fix` before
//! the first change. Running the fixer twice leaves the system (and the
//! backups) as the first run left them.
//!
//! The fixer normally works on `/`. Given another root it edits files under
//! that tree and runs guest commands through `chroot`.

mod report;

pub use report::FixReport;

use anyhow::Result;
use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::common::{backup_once, patch_file};
use crate::guest::{BootMode, Distro};
use crate::patch::{self, fstab, grub};
use crate::process::{Cmd, CommandResult, CommandRunner};
use crate::tools::GrubMkconfig;

/// NetworkManager drop-in turning off EUI-64 IPv6 addresses.
pub const NM_DROPIN: &str = "/etc/NetworkManager/conf.d/00-vmigrate-ipv6.conf";

const NM_DROPIN_CONTENT: &str = "[connection]\nipv6.addr-gen-mode=stable-privacy\n";

/// udev rules that pin NIC names to the old MAC addresses.
pub const PERSISTENT_NET_RULES: &[&str] = &[
    "/etc/udev/rules.d/70-persistent-net.rules",
    "/etc/udev/rules.d/75-persistent-net-generator.rules",
];

/// Unit enabled so the new hypervisor can talk to the guest.
pub const GUEST_AGENT: &str = "qemu-guest-agent";

/// Sentinel requesting a full SELinux relabel on next boot.
pub const AUTORELABEL: &str = "/.autorelabel";

/// Initramfs generators, preferred first.
const INITRAMFS_TOOLS: &[&str] = &["dracut", "mkinitrd"];

/// Directories searched for guest binaries when not running on `/`.
const GUEST_BIN_DIRS: &[&str] = &["usr/sbin", "usr/bin", "sbin", "bin"];

/// True if `/etc/selinux/config` content puts SELinux in enforcing mode.
pub fn selinux_enforcing(config: &str) -> bool {
    config.lines().any(|line| {
        let line = line.trim();
        !line.starts_with('#')
            && line
                .strip_prefix("SELINUX=")
                .is_some_and(|v| v.trim().trim_matches('"').eq_ignore_ascii_case("enforcing"))
    })
}

type DeviceCheck<'a> = Box<dyn Fn(&str) -> bool + 'a>;

/// Applies the post-boot repairs to a guest root.
pub struct Fixer<'a> {
    root: PathBuf,
    runner: &'a dyn CommandRunner,
    device_present: DeviceCheck<'a>,
}

impl<'a> Fixer<'a> {
    pub fn new(root: &Path, runner: &'a dyn CommandRunner) -> Self {
        let dev_root = root.to_path_buf();
        Self {
            root: root.to_path_buf(),
            runner,
            device_present: Box::new(move |dev: &str| {
                fs::metadata(dev_root.join(dev.trim_start_matches('/')))
                    .map(|m| m.file_type().is_block_device())
                    .unwrap_or(false)
            }),
        }
    }

    /// Replace the block-device check used by the fstab repair.
    pub fn with_device_check(mut self, check: impl Fn(&str) -> bool + 'a) -> Self {
        self.device_present = Box::new(check);
        self
    }

    fn host_root(&self) -> bool {
        self.root == Path::new("/")
    }

    /// Guest path `/etc/fstab` -> `<root>/etc/fstab`.
    fn path(&self, guest_path: &str) -> PathBuf {
        self.root.join(guest_path.trim_start_matches('/'))
    }

    fn has_tool(&self, tool: &str) -> bool {
        if self.host_root() {
            self.runner.exists(tool)
        } else {
            GUEST_BIN_DIRS
                .iter()
                .any(|dir| self.root.join(dir).join(tool).is_file())
        }
    }

    /// Wrap a command so it runs inside the guest root.
    fn guest_cmd(&self, cmd: Cmd) -> Cmd {
        if self.host_root() {
            return cmd;
        }
        Cmd::new("chroot")
            .arg_path(&self.root)
            .arg(cmd.program())
            .args(cmd.get_args())
            .allow_fail()
    }

    fn run(&self, cmd: Cmd) -> Option<CommandResult> {
        self.runner.run(self.guest_cmd(cmd).allow_fail()).ok()
    }

    /// Run every step and return the summary.
    pub fn run_all(&self) -> Result<FixReport> {
        let boot_mode = BootMode::detect(&self.root);
        let distro = Distro::detect(&self.root);
        info!("Boot mode: {}, distro: {}", boot_mode, distro);

        let mut report = FixReport::new(boot_mode, distro);

        self.fix_fstab(&mut report)?;
        self.fix_grub_defaults(&mut report)?;
        self.regenerate_grub(&mut report);
        self.rebuild_initramfs(&mut report);
        self.ensure_nm_dropin(&mut report)?;
        self.enable_guest_agent(&mut report);
        self.remove_persistent_net_rules(&mut report)?;
        self.ensure_machine_id(&mut report);
        self.schedule_relabel(&mut report)?;

        Ok(report)
    }

    /// vda -> sda, then disable entries whose disk is gone.
    pub fn fix_fstab(&self, report: &mut FixReport) -> Result<()> {
        let path = self.path("/etc/fstab");
        let Ok(content) = fs::read_to_string(&path) else {
            report.warn("/etc/fstab not found, skipping");
            return Ok(());
        };

        let rewritten = patch::rewrite_vda(&content);
        let repair = fstab::disable_missing_devices(&rewritten, |dev| (self.device_present)(dev));

        if patch_file(&path, &repair.content)? {
            info!("Updated /etc/fstab");
            report.touched("/etc/fstab");
        }
        for line in &repair.disabled {
            info!("Disabled fstab entry: {}", line);
        }
        report.disabled_fstab.extend(repair.disabled);
        Ok(())
    }

    /// vda -> sda and serial console in `/etc/default/grub`; vda -> sda in grub.cfg.
    pub fn fix_grub_defaults(&self, report: &mut FixReport) -> Result<()> {
        let defaults = self.path("/etc/default/grub");
        match fs::read_to_string(&defaults) {
            Ok(content) => {
                let rewritten = patch::rewrite_vda(&content);
                let patched = grub::ensure_serial_console(&rewritten).unwrap_or(rewritten);
                if patch_file(&defaults, &patched)? {
                    info!("Updated /etc/default/grub");
                    report.touched("/etc/default/grub");
                }
            }
            Err(_) => report.warn("/etc/default/grub not found, serial console not configured"),
        }

        for cfg in ["/boot/grub2/grub.cfg", "/boot/grub/grub.cfg"] {
            let path = self.path(cfg);
            if let Ok(content) = fs::read_to_string(&path) {
                if patch_file(&path, &patch::rewrite_vda(&content))? {
                    report.touched(cfg);
                }
            }
        }
        Ok(())
    }

    /// Regenerate grub.cfg with the first tool/target that works.
    pub fn regenerate_grub(&self, report: &mut FixReport) {
        let candidates = GrubMkconfig::candidates(report.boot_mode, report.distro);
        let mut attempted = false;

        for candidate in candidates {
            if !self.has_tool(&candidate.tool) || !self.path(candidate.output_dir()).is_dir() {
                continue;
            }
            attempted = true;
            info!("Regenerating {} with {}", candidate.output, candidate.tool);
            match self.run(candidate.to_cmd()) {
                Some(r) if r.success() => {
                    report.touched(candidate.output.clone());
                    return;
                }
                Some(r) => tracing::debug!("{} failed: {}", candidate.tool, r.stderr_trimmed()),
                None => {}
            }
        }

        if attempted {
            report.warn("grub configuration could not be regenerated");
        } else {
            report.warn("no grub-mkconfig tool or grub directory found");
        }
    }

    /// Rebuild the initramfs of the running kernel.
    pub fn rebuild_initramfs(&self, report: &mut FixReport) {
        let Some(tool) = INITRAMFS_TOOLS.iter().find(|t| self.has_tool(t)) else {
            report.warn("neither dracut nor mkinitrd found, initramfs not rebuilt");
            return;
        };

        let kernel = self
            .runner
            .run(Cmd::new("uname").arg("-r").allow_fail())
            .ok()
            .filter(CommandResult::success)
            .map(|r| r.stdout_trimmed().to_string())
            .filter(|k| !k.is_empty());
        let Some(kernel) = kernel else {
            report.warn("could not determine the running kernel version");
            return;
        };

        let image = format!("/boot/initramfs-{}.img", kernel);
        info!("Rebuilding {} with {}", image, tool);
        match self.run(Cmd::new(tool).args(["-f", &image, &kernel])) {
            Some(r) if r.success() => report.touched(image),
            Some(r) => report.warn(format!("{} exited with code {}", tool, r.code())),
            None => report.warn(format!("{} could not be started", tool)),
        }
    }

    /// Create the IPv6 address-generation drop-in if absent.
    pub fn ensure_nm_dropin(&self, report: &mut FixReport) -> Result<()> {
        let path = self.path(NM_DROPIN);
        if path.exists() {
            return Ok(());
        }
        crate::common::write_atomic(&path, NM_DROPIN_CONTENT)?;
        info!("Created {}", NM_DROPIN);
        report.touched(NM_DROPIN);
        Ok(())
    }

    /// `systemctl enable` the guest agent; already-enabled or missing is fine.
    pub fn enable_guest_agent(&self, report: &mut FixReport) {
        if !self.has_tool("systemctl") {
            report.warn("systemctl not found, guest agent not enabled");
            return;
        }
        match self.run(Cmd::new("systemctl").args(["enable", GUEST_AGENT])) {
            Some(r) if r.success() => info!("Enabled {}", GUEST_AGENT),
            _ => report.warn(format!("could not enable {} (is it installed?)", GUEST_AGENT)),
        }
    }

    pub fn remove_persistent_net_rules(&self, report: &mut FixReport) -> Result<()> {
        for rule in PERSISTENT_NET_RULES {
            let path = self.path(rule);
            if path.exists() {
                // udev only reads `*.rules`, so the backup stays inert
                backup_once(&path)?;
                fs::remove_file(&path)?;
                info!("Removed {}", rule);
                report.touched(*rule);
            }
        }
        Ok(())
    }

    /// Regenerate `/etc/machine-id` only when it is missing or empty.
    pub fn ensure_machine_id(&self, report: &mut FixReport) {
        let path = self.path("/etc/machine-id");
        let current = fs::read_to_string(&path).unwrap_or_default();
        if !current.trim().is_empty() {
            return;
        }

        let cmd = if self.has_tool("systemd-machine-id-setup") {
            Cmd::new("systemd-machine-id-setup")
        } else if self.has_tool("dbus-uuidgen") {
            Cmd::new("dbus-uuidgen").arg("--ensure=/etc/machine-id")
        } else {
            report.warn("no machine-id generator found");
            return;
        };

        match self.run(cmd) {
            Some(r) if r.success() => report.touched("/etc/machine-id"),
            _ => report.warn("machine-id regeneration failed"),
        }
    }

    /// Touch `/.autorelabel` when SELinux is enforcing.
    pub fn schedule_relabel(&self, report: &mut FixReport) -> Result<()> {
        let config = fs::read_to_string(self.path("/etc/selinux/config")).unwrap_or_default();
        if !selinux_enforcing(&config) {
            return Ok(());
        }
        report.relabel_scheduled = true;
        let sentinel = self.path(AUTORELABEL);
        if !sentinel.exists() {
            fs::write(&sentinel, "")?;
            info!("Scheduled SELinux relabel");
            report.touched(AUTORELABEL);
        }
        Ok(())
    }
}
