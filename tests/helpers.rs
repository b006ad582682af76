//! Shared test utilities for vmigrate tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use anyhow::Result;
use vmigrate::config::Config;
use vmigrate::logging::MigrationLog;
use vmigrate::process::{Cmd, CommandResult, CommandRunner};

/// Scripted stand-in for the libguestfs tools and everything else we shell out to.
pub struct FakeRunner {
    /// Exit code returned by virt-v2v.
    pub v2v_exit: i32,
    /// Whether virt-v2v leaves `<name>-sda` in its output directory.
    pub v2v_creates_artifact: bool,
    /// stdout of `guestfish ... ls /boot/efi/EFI`.
    pub efi_listing: String,
    /// stdout of `guestfish ... cat /etc/fstab`.
    pub guest_fstab: String,
    /// Exit codes for specific programs (default 0).
    pub exit_codes: HashMap<String, i32>,
    /// stdout for specific programs.
    pub stdouts: HashMap<String, String>,
    /// Programs reported missing by `exists`.
    pub missing: Vec<String>,
    /// Directory created when the bootstrap script runs.
    pub bootstrap_creates: Option<PathBuf>,
    /// Every command seen, in order.
    pub calls: RefCell<Vec<Cmd>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            v2v_exit: 0,
            v2v_creates_artifact: true,
            efi_listing: String::new(),
            guest_fstab: String::new(),
            exit_codes: HashMap::new(),
            stdouts: HashMap::new(),
            missing: Vec::new(),
            bootstrap_creates: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn exit_code(mut self, program: &str, code: i32) -> Self {
        self.exit_codes.insert(program.to_string(), code);
        self
    }

    pub fn stdout(mut self, program: &str, out: &str) -> Self {
        self.stdouts.insert(program.to_string(), out.to_string());
        self
    }

    pub fn missing(mut self, program: &str) -> Self {
        self.missing.push(program.to_string());
        self
    }

    /// Programs run, in order.
    pub fn programs(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|c| c.program().to_string())
            .collect()
    }

    /// All recorded invocations of `program`.
    pub fn calls_to(&self, program: &str) -> Vec<Cmd> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program() == program)
            .cloned()
            .collect()
    }

    fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    fn respond(&self, cmd: &Cmd) -> CommandResult {
        let args = cmd.get_args();
        let program = cmd.program();
        let code = self.exit_codes.get(program).copied().unwrap_or(0);
        let stdout = self.stdouts.get(program).cloned().unwrap_or_default();

        match program {
            "virt-v2v" => {
                if self.v2v_creates_artifact {
                    if let (Some(dir), Some(name)) =
                        (Self::arg_after(args, "-os"), Self::arg_after(args, "-on"))
                    {
                        fs::write(Path::new(dir).join(format!("{}-sda", name)), "QFI\u{fb}")
                            .unwrap();
                    }
                }
                CommandResult::from_code(self.v2v_exit, "", "virt-v2v: warning: fake run")
            }
            "guestfish" if args.iter().any(|a| a == "ls") => {
                CommandResult::from_code(code, self.efi_listing.clone(), "")
            }
            "guestfish" if args.iter().any(|a| a == "cat") => {
                CommandResult::from_code(code, self.guest_fstab.clone(), "")
            }
            "virt-copy-out" => {
                if code == 0 {
                    if let [.., guest, host] = args {
                        let name = guest.rsplit('/').next().unwrap_or(guest.as_str());
                        fs::write(Path::new(host).join(name), format!("saved {}\n", guest))
                            .unwrap();
                    }
                }
                CommandResult::from_code(code, "", "")
            }
            "sh" => {
                if let Some(dir) = &self.bootstrap_creates {
                    fs::create_dir_all(dir).unwrap();
                }
                CommandResult::from_code(code, stdout, "")
            }
            _ => CommandResult::from_code(code, stdout, ""),
        }
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, cmd: Cmd) -> Result<CommandResult> {
        self.calls.borrow_mut().push(cmd.clone());
        let result = self.respond(&cmd);
        cmd.check(result)
    }

    fn exists(&self, program: &str) -> bool {
        !self.missing.iter().any(|m| m == program)
    }
}

/// Temporary layout for a migration: sources, destination, script dir, work dir.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub root: PathBuf,
    pub config: Config,
    pub log: MigrationLog,
}

impl TestEnv {
    /// Create a new environment with the personalization script and bases/ in place.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();

        fs::create_dir_all(root.join("scripts/bases")).expect("Failed to create bases dir");
        fs::write(root.join("scripts/migrate_centos.py"), "print('ok')\n")
            .expect("Failed to create script");
        fs::create_dir_all(root.join("out")).expect("Failed to create out dir");

        let mut vars = HashMap::new();
        vars.insert(
            "VMIGRATE_SCRIPT".to_string(),
            "scripts/migrate_centos.py".to_string(),
        );
        vars.insert("VMIGRATE_WORK_DIR".to_string(), "work".to_string());
        let config = Config::from_vars(&root, &vars);

        let log = MigrationLog::create(&root.join("work/test.log")).expect("Failed to create log");

        Self {
            _temp_dir: temp_dir,
            root,
            config,
            log,
        }
    }

    /// A dummy source image with the given file name.
    pub fn source(&self, name: &str) -> PathBuf {
        let path = self.root.join(name);
        fs::write(&path, "source").expect("Failed to create source");
        path
    }

    pub fn dest(&self) -> PathBuf {
        self.root.join("out/web01.qcow2")
    }

    /// Build directories left behind in the work dir.
    pub fn leftover_build_dirs(&self) -> usize {
        fs::read_dir(&self.config.work_dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.file_name().to_string_lossy().starts_with("vmigrate-build-"))
                    .count()
            })
            .unwrap_or(0)
    }
}

/// An OVA (tar) holding a descriptor and the given disk entries.
pub fn create_ova(path: &Path, disks: &[&str]) {
    let file = fs::File::create(path).expect("Failed to create OVA");
    let mut builder = tar::Builder::new(file);
    let mut names = vec!["vm.ovf"];
    names.extend_from_slice(disks);
    for name in names {
        let data = b"data";
        let mut header = tar::Header::new_ustar();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, &data[..])
            .expect("Failed to append OVA entry");
    }
    builder.finish().expect("Failed to finish OVA");
}

/// Minimal guest root for the post-boot fixer.
pub fn create_guest_root(root: &Path) {
    for dir in [
        "etc/default",
        "etc/selinux",
        "etc/udev/rules.d",
        "etc/NetworkManager/conf.d",
        "boot/grub2",
        "boot/efi/EFI",
        "usr/bin",
        "usr/sbin",
    ] {
        fs::create_dir_all(root.join(dir)).expect("Failed to create guest dir");
    }

    fs::write(root.join("etc/centos-release"), "CentOS Linux release 7.9.2009 (Core)\n")
        .expect("Failed to create centos-release");
    fs::write(
        root.join("etc/fstab"),
        "# /etc/fstab\n\
         /dev/vda1 / xfs defaults 0 0\n\
         /dev/sdb1 /data xfs defaults 0 0\n\
         UUID=1234 /boot xfs defaults 0 0\n",
    )
    .expect("Failed to create fstab");
    fs::write(
        root.join("etc/default/grub"),
        "GRUB_TIMEOUT=5\nGRUB_CMDLINE_LINUX=\"crashkernel=auto root=/dev/vda1 rhgb quiet\"\n",
    )
    .expect("Failed to create grub defaults");
    fs::write(
        root.join("boot/grub2/grub.cfg"),
        "linux16 /vmlinuz root=/dev/vda1 ro\n",
    )
    .expect("Failed to create grub.cfg");
    fs::write(root.join("etc/selinux/config"), "SELINUX=enforcing\nSELINUXTYPE=targeted\n")
        .expect("Failed to create selinux config");
    fs::write(root.join("etc/udev/rules.d/70-persistent-net.rules"), "# old NICs\n")
        .expect("Failed to create udev rule");
    fs::write(root.join("etc/machine-id"), "").expect("Failed to create machine-id");
}

/// Create a mock executable in the guest root.
pub fn create_mock_binary(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir for binary");
    }
    fs::write(path, "#!/bin/sh\necho mock\n").expect("Failed to create mock binary");
    let mut perms = fs::metadata(path).expect("Failed to get metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("Failed to set permissions");
}

/// Assert that a file contains expected content.
pub fn assert_file_contains(path: &Path, expected: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|_| panic!("Failed to read file: {}", path.display()));
    assert!(
        content.contains(expected),
        "File {} does not contain expected content.\nExpected to find: {}\nActual content: {}",
        path.display(),
        expected,
        content
    );
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected file to exist: {}", path.display());
}
