//! Configuration management for vmigrate.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over the .env file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Backend handed to libguestfs when nothing else is configured.
pub const DEFAULT_BACKEND: &str = "direct";

/// Environment variable selecting the libguestfs backend.
pub const BACKEND_VAR: &str = "LIBGUESTFS_BACKEND";

/// Personalization script looked up in the base directory by default.
pub const DEFAULT_SCRIPT_NAME: &str = "migrate_centos.py";

/// Bootstrap script that populates the bases directory.
pub const DEFAULT_BOOTSTRAP_NAME: &str = "create_bases.sh";

/// vmigrate configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// libguestfs backend forced on every guest tool (default: direct)
    pub backend: String,
    /// Guest personalization script run against the converted image
    pub script: PathBuf,
    /// Interpreter used to run the personalization script
    pub python: String,
    /// Overlay tree copied into the guest by the personalization script
    pub bases_dir: PathBuf,
    /// Script that creates `bases_dir` when it is missing
    pub bootstrap: PathBuf,
    /// Parent of the private build directories
    pub work_dir: PathBuf,
}

impl Config {
    /// Load configuration from .env file and environment.
    ///
    /// The .env file is looked up in `base_dir`.
    pub fn load(base_dir: &Path) -> Self {
        let mut env_vars = HashMap::new();

        let env_path = base_dir.join(".env");
        if let Ok(iter) = dotenvy::from_path_iter(&env_path) {
            for (key, value) in iter.flatten() {
                env_vars.insert(key, value);
            }
        }

        // Environment variables override .env file
        for (key, value) in std::env::vars() {
            env_vars.insert(key, value);
        }

        Self::from_vars(base_dir, &env_vars)
    }

    /// Build a config from an explicit variable map.
    pub fn from_vars(base_dir: &Path, vars: &HashMap<String, String>) -> Self {
        let resolve = |s: &String| {
            let path = PathBuf::from(s);
            if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            }
        };

        let backend = vars
            .get(BACKEND_VAR)
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_BACKEND.to_string());

        let script = vars
            .get("VMIGRATE_SCRIPT")
            .map(resolve)
            .unwrap_or_else(|| base_dir.join(DEFAULT_SCRIPT_NAME));

        // bases/ and the bootstrap script sit next to the personalization script
        let script_dir = script
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| base_dir.to_path_buf());

        let python = vars
            .get("VMIGRATE_PYTHON")
            .cloned()
            .unwrap_or_else(|| "python3".to_string());

        let bases_dir = vars
            .get("VMIGRATE_BASES_DIR")
            .map(resolve)
            .unwrap_or_else(|| script_dir.join("bases"));

        let bootstrap = vars
            .get("VMIGRATE_BOOTSTRAP")
            .map(resolve)
            .unwrap_or_else(|| script_dir.join(DEFAULT_BOOTSTRAP_NAME));

        let work_dir = vars
            .get("VMIGRATE_WORK_DIR")
            .map(resolve)
            .unwrap_or_else(std::env::temp_dir);

        Self {
            backend,
            script,
            python,
            bases_dir,
            bootstrap,
            work_dir,
        }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  {}: {}", BACKEND_VAR, self.backend);
        println!("  VMIGRATE_SCRIPT: {}", self.script.display());
        println!("  VMIGRATE_PYTHON: {}", self.python);
        println!("  VMIGRATE_BASES_DIR: {}", self.bases_dir.display());
        println!("  VMIGRATE_BOOTSTRAP: {}", self.bootstrap.display());
        println!("  VMIGRATE_WORK_DIR: {}", self.work_dir.display());
        if self.script.is_file() {
            println!("  Personalization script: FOUND");
        } else {
            println!("  Personalization script: NOT FOUND");
        }
        if self.bases_dir.is_dir() {
            println!("  Bases directory: FOUND");
        } else {
            println!("  Bases directory: NOT FOUND (created on first migrate)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(Path::new("/opt/mig"), &HashMap::new());
        assert_eq!(config.backend, "direct");
        assert_eq!(config.script, PathBuf::from("/opt/mig/migrate_centos.py"));
        assert_eq!(config.bases_dir, PathBuf::from("/opt/mig/bases"));
        assert_eq!(config.bootstrap, PathBuf::from("/opt/mig/create_bases.sh"));
        assert_eq!(config.python, "python3");
    }

    #[test]
    fn test_bases_follow_script_location() {
        let config = Config::from_vars(
            Path::new("/opt/mig"),
            &vars(&[("VMIGRATE_SCRIPT", "/srv/tools/personalize.py")]),
        );
        assert_eq!(config.bases_dir, PathBuf::from("/srv/tools/bases"));
        assert_eq!(config.bootstrap, PathBuf::from("/srv/tools/create_bases.sh"));
    }

    #[test]
    fn test_relative_paths_resolve_against_base() {
        let config = Config::from_vars(
            Path::new("/opt/mig"),
            &vars(&[("VMIGRATE_BASES_DIR", "overlay"), ("VMIGRATE_WORK_DIR", "tmp")]),
        );
        assert_eq!(config.bases_dir, PathBuf::from("/opt/mig/overlay"));
        assert_eq!(config.work_dir, PathBuf::from("/opt/mig/tmp"));
    }

    #[test]
    fn test_backend_override_and_empty_value() {
        let config = Config::from_vars(Path::new("/"), &vars(&[(BACKEND_VAR, "libvirt")]));
        assert_eq!(config.backend, "libvirt");

        let config = Config::from_vars(Path::new("/"), &vars(&[(BACKEND_VAR, "")]));
        assert_eq!(config.backend, "direct");
    }
}
