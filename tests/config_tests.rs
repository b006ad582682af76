//! Configuration loading from `.env` and the process environment.
//!
//! These tests mutate process-wide environment variables and run serially.

use serial_test::serial;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use vmigrate::config::Config;

const KEYS: &[&str] = &[
    "LIBGUESTFS_BACKEND",
    "VMIGRATE_SCRIPT",
    "VMIGRATE_PYTHON",
    "VMIGRATE_BASES_DIR",
    "VMIGRATE_BOOTSTRAP",
    "VMIGRATE_WORK_DIR",
];

fn clear_env() {
    for key in KEYS {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_dotenv_values_are_used() {
    clear_env();
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(".env"),
        "LIBGUESTFS_BACKEND=libvirt\nVMIGRATE_PYTHON=/usr/bin/python3.9\nVMIGRATE_SCRIPT=tools/migrate_centos.py\n",
    )
    .unwrap();

    let config = Config::load(dir.path());
    assert_eq!(config.backend, "libvirt");
    assert_eq!(config.python, "/usr/bin/python3.9");
    assert_eq!(config.script, dir.path().join("tools/migrate_centos.py"));
    assert_eq!(config.bases_dir, dir.path().join("tools/bases"));
}

#[test]
#[serial]
fn test_environment_overrides_dotenv() {
    clear_env();
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".env"), "LIBGUESTFS_BACKEND=libvirt\n").unwrap();
    std::env::set_var("LIBGUESTFS_BACKEND", "direct");
    std::env::set_var("VMIGRATE_WORK_DIR", "/var/tmp/vmigrate");

    let config = Config::load(dir.path());
    clear_env();

    assert_eq!(config.backend, "direct");
    assert_eq!(config.work_dir, PathBuf::from("/var/tmp/vmigrate"));
}

#[test]
#[serial]
fn test_defaults_without_dotenv() {
    clear_env();
    let dir = TempDir::new().unwrap();

    let config = Config::load(dir.path());
    assert_eq!(config.backend, "direct");
    assert_eq!(config.script, dir.path().join("migrate_centos.py"));
    assert_eq!(config.bootstrap, dir.path().join("create_bases.sh"));
    assert_eq!(config.work_dir, std::env::temp_dir());
}
