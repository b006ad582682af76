//! Host tool availability checks.

use crate::config::Config;
use crate::process::CommandRunner;
use crate::tools::{customize, guestfs, v2v};

use super::types::CheckResult;

/// Tools every migration needs, with the package that ships them.
pub const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    (v2v::PROGRAM, "virt-v2v", "Converts the source image to qcow2"),
    (customize::PROGRAM, "guestfs-tools", "Applies offline guest fixes"),
    (guestfs::GUESTFISH, "guestfish", "Inspects the converted image"),
    (guestfs::COPY_OUT, "guestfs-tools", "Backs up guest credential files"),
    (guestfs::COPY_IN, "guestfs-tools", "Restores guest credential files"),
];

/// Check host tools are installed.
pub fn check_host_tools(config: &Config, runner: &dyn CommandRunner) -> Vec<CheckResult> {
    let mut results: Vec<CheckResult> = REQUIRED_TOOLS
        .iter()
        .map(|(tool, package, purpose)| check_tool_exists(runner, tool, package, purpose))
        .collect();

    results.push(check_tool_exists(
        runner,
        &config.python,
        "python3",
        "Runs the personalization script",
    ));

    results
}

/// Check if a tool exists in PATH.
fn check_tool_exists(
    runner: &dyn CommandRunner,
    tool: &str,
    package: &str,
    purpose: &str,
) -> CheckResult {
    if runner.exists(tool) {
        CheckResult::pass(tool)
    } else {
        CheckResult::fail(
            tool,
            &format!("Not found. Install '{}' package. {}", package, purpose),
        )
    }
}
