//! Host tool availability checks.

use crate::process;

use super::types::CheckResult;

/// Tools the workflow runs on the host, with the package providing them.
pub const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    ("pisi", "pisi", "Installs packages into the target"),
    ("chroot", "coreutils", "Runs fix-up commands inside the target"),
    ("mount", "util-linux", "Bind-mounts /proc and /sys"),
    ("umount", "util-linux", "Releases the bind mounts"),
    ("mknod", "coreutils", "Creates temporary device nodes"),
];

/// Check host tools are installed.
pub fn check_host_tools() -> Vec<CheckResult> {
    REQUIRED_TOOLS
        .iter()
        .map(|(tool, package, purpose)| check_tool_exists(tool, package, purpose))
        .collect()
}

/// Check if a tool exists in PATH.
pub fn check_tool_exists(tool: &str, package: &str, purpose: &str) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, &path),
        None => CheckResult::fail(
            tool,
            &format!("Not found. Install '{}' package. {}", package, purpose),
        ),
    }
}
