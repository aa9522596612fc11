//! Shared test utilities for ptsp-build tests.

#![allow(dead_code)]

use anyhow::Result;
use ptsp_build::build::{BuildContext, BuildOptions};
use ptsp_build::interrupt::Interrupt;
use ptsp_build::process::{Cmd, CommandResult, Runner};
use ptsp_build::profile::{Profile, Repository};
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

#[path = "../src/process/testing.rs"]
pub mod recording;

use recording::RecordingRunner;

pub const KERNEL: &str = "kernel-2.6.25.20-114";
pub const INITRAMFS: &str = "initramfs-2.6.25.20-114";

/// Test environment with a pre-populated fake target tree.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Target root filesystem
    pub target: PathBuf,
}

impl TestEnv {
    /// Create a target that looks like pisi already installed into it.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let target = temp_dir.path().join("img");
        create_mock_target(&target);
        Self {
            _temp_dir: temp_dir,
            target,
        }
    }

    /// Build context over `runner` with a short bus timeout.
    pub fn context<'a>(
        &self,
        profile: Profile,
        repository: &str,
        additional: &[&str],
        runner: &'a dyn Runner,
        interrupt: Interrupt,
    ) -> BuildContext<'a> {
        let repository = Repository::new(&profile.repository.name, repository);
        BuildContext::new(
            &self.target,
            repository,
            additional.iter().map(|s| s.to_string()).collect(),
            profile,
            runner,
            interrupt,
        )
        .expect("Failed to create build context")
        .with_options(BuildOptions {
            bus_timeout: Duration::from_millis(50),
            bus_interval: Duration::from_millis(10),
        })
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.target.join(rel)
    }

    pub fn display(&self) -> String {
        self.target.display().to_string()
    }
}

/// Create a minimal installed-looking tree.
pub fn create_mock_target(target: &Path) {
    let files = [
        ("usr/share/baselayout/fstab", "proc /proc proc defaults 0 0\n"),
        ("usr/share/baselayout/hosts", "127.0.0.1 localhost\n"),
        ("usr/share/baselayout/passwd", "root:x:0:0:root:/root:/bin/bash\n"),
        ("usr/share/doc/bash/README", "docs\n"),
        ("usr/share/man/man1/bash.1", "man\n"),
        ("usr/include/stdio.h", "\n"),
        ("usr/lib/libc.a", ""),
        ("usr/lib/libfoo.la", ""),
        ("usr/lib/libfoo.so.1", ""),
        ("lib/udev/devices/null", ""),
        ("boot/kernel-2.6.25.20-114", ""),
        ("boot/initramfs-2.6.25.20-114", ""),
        ("boot/kernel-2.6.25.9-110", ""),
    ];

    for (rel, content) in files {
        let path = target.join(rel);
        fs::create_dir_all(path.parent().unwrap()).expect("Failed to create parent dir");
        fs::write(&path, content).expect("Failed to write mock file");
    }
    fs::create_dir_all(target.join("etc")).expect("Failed to create etc");
}

/// Recording runner that also plays the part of mknod, so device nodes
/// actually appear (as plain files) and disappear in the target.
pub struct DeviceRunner {
    pub inner: RecordingRunner,
    target: PathBuf,
    /// Set if any chroot command ran without /dev/null present.
    pub chroot_without_devices: Cell<bool>,
}

impl DeviceRunner {
    pub fn new(inner: RecordingRunner, target: &Path) -> Self {
        Self {
            inner,
            target: target.to_path_buf(),
            chroot_without_devices: Cell::new(false),
        }
    }
}

impl Runner for DeviceRunner {
    fn execute(&self, cmd: &Cmd) -> Result<CommandResult> {
        let argv = cmd.argv();
        if argv[0] == "mknod" {
            fs::write(&argv[3], "")?;
        }
        if argv[0] == "chroot" && !self.target.join("dev/null").exists() {
            self.chroot_without_devices.set(true);
        }
        self.inner.execute(cmd)
    }

    fn spawn_detached(&self, cmd: &Cmd) -> Result<()> {
        self.inner.spawn_detached(cmd)
    }
}

/// Assert that a symlink exists and points to the expected target.
pub fn assert_symlink(path: &Path, expected_target: &str) {
    assert!(
        path.is_symlink(),
        "Expected symlink at {}, but it's not a symlink",
        path.display()
    );

    let target = fs::read_link(path).expect("Failed to read symlink");
    assert_eq!(
        target.to_string_lossy(),
        expected_target,
        "Symlink {} points to {:?}, expected {}",
        path.display(),
        target,
        expected_target
    );
}

/// Assert that a path (file, dir or dangling link) is gone.
pub fn assert_absent(path: &Path) {
    assert!(
        path.symlink_metadata().is_err(),
        "Expected {} to be removed",
        path.display()
    );
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected file to exist: {}", path.display());
}
