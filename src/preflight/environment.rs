//! Build environment checks (privileges, target directory).

use std::fs;
use std::path::Path;

use super::types::CheckResult;

/// Mounting, mknod and chroot all need root.
pub fn check_privileges() -> CheckResult {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    if euid == 0 {
        CheckResult::pass("root privileges")
    } else {
        CheckResult::fail(
            "root privileges",
            &format!("Running as uid {}. mount, mknod and chroot need root.", euid),
        )
    }
}

/// The target must exist already, be a directory and be writable.
pub fn check_target(target: &Path) -> CheckResult {
    let name = "target directory";
    if !target.is_absolute() {
        return CheckResult::fail(name, &format!("{} is not an absolute path", target.display()));
    }
    if !target.is_dir() {
        return CheckResult::fail(
            name,
            &format!("{} does not exist. Create it first.", target.display()),
        );
    }

    let probe = target.join(".ptsp-preflight");
    match fs::write(&probe, "test") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            CheckResult::pass_with(name, &target.display().to_string())
        }
        Err(e) => CheckResult::fail(name, &format!("Cannot write to {}: {}", target.display(), e)),
    }
}

/// Warn if /proc or /sys already have something mounted on them.
pub fn check_stale_mounts(target: &Path) -> CheckResult {
    let name = "stale mounts";
    let Ok(mounts) = fs::read_to_string("/proc/self/mounts") else {
        return CheckResult::warn(name, "Cannot read /proc/self/mounts");
    };

    let stale = stale_mount_points(&mounts, target);
    if stale.is_empty() {
        CheckResult::pass(name)
    } else {
        CheckResult::warn(
            name,
            &format!("Already mounted: {}. Unmount before building.", stale.join(", ")),
        )
    }
}

/// Mount points from a mounts table that sit on the target's proc or sys.
pub fn stale_mount_points(mounts: &str, target: &Path) -> Vec<String> {
    let wanted: Vec<String> = ["proc", "sys"]
        .iter()
        .map(|d| target.join(d).to_string_lossy().into_owned())
        .collect();

    mounts
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter(|point| wanted.iter().any(|w| w.as_str() == *point))
        .map(str::to_string)
        .collect()
}
