//! Preflight checks for the client image build.
//!
//! Validates host tools, privileges and the target directory before the
//! build touches anything. Run with `ptsp-build --check -o <dir>`.

mod environment;
mod host_tools;
mod types;

use std::path::Path;

use anyhow::{bail, Result};

pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Check the host and the target before anything is installed.
pub fn run_preflight(target: &Path) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Checking host for a PTSP build...");
    checks.extend(host_tools::check_host_tools());

    checks.push(environment::check_privileges());
    checks.push(environment::check_target(target));
    checks.push(environment::check_stale_mounts(target));

    println!();

    PreflightReport { checks }
}

/// Print the report and refuse to build on any failure. Warnings pass.
pub fn run_preflight_or_fail(target: &Path) -> Result<()> {
    let report = run_preflight(target);
    report.print();

    if !report.all_passed() {
        bail!(
            "{} preflight check(s) failed, nothing was changed in {}",
            report.fail_count(),
            target.display()
        );
    }

    println!("Preflight OK\n");
    Ok(())
}
