//! Bind mounts of the host's /proc and /sys.
//!
//! [`BindMounts`] owns the mounts. Dropping it without calling
//! [`BindMounts::release`] lazily unmounts everything it still holds, so a
//! failed or interrupted build never leaves the target mounted.

use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use crate::process::{Cmd, Runner};

/// Host directories exposed inside the target, in mount order.
pub const BIND_MOUNTS: &[&str] = &["proc", "sys"];

/// Active bind mounts below a target directory.
pub struct BindMounts<'a> {
    runner: &'a dyn Runner,
    mounted: Vec<PathBuf>,
}

impl<'a> BindMounts<'a> {
    /// Bind-mount `/<name>` onto `<target>/<name>` for each of [`BIND_MOUNTS`].
    ///
    /// If a later mount fails, the earlier ones are released before
    /// returning the error.
    pub fn mount(runner: &'a dyn Runner, target: &std::path::Path) -> Result<Self> {
        println!("Mounting /proc and /sys...");
        let mut mounts = Self {
            runner,
            mounted: Vec::new(),
        };

        for name in BIND_MOUNTS {
            let point = target.join(name);
            fs::create_dir_all(&point)?;
            Cmd::new("mount")
                .arg("--bind")
                .arg(format!("/{}", name))
                .arg_path(&point)
                .run_on(runner)?;
            mounts.mounted.push(point);
        }
        Ok(mounts)
    }

    /// Mount points currently held.
    pub fn mounted(&self) -> &[PathBuf] {
        &self.mounted
    }

    /// Unmount in reverse order, failing on the first error.
    ///
    /// Whatever could not be unmounted is still force-unmounted on drop.
    pub fn release(mut self) -> Result<()> {
        println!("Unmounting /proc and /sys...");
        while let Some(point) = self.mounted.last() {
            Cmd::new("umount").arg_path(point).run_on(self.runner)?;
            self.mounted.pop();
        }
        Ok(())
    }

    fn force_release(&mut self) {
        while let Some(point) = self.mounted.pop() {
            let _ = Cmd::new("umount")
                .arg("-l")
                .arg_path(&point)
                .allow_fail()
                .run_on(self.runner);
        }
    }
}

impl Drop for BindMounts<'_> {
    fn drop(&mut self) {
        if !self.mounted.is_empty() {
            eprintln!("  [WARN] Build did not finish, force-unmounting /proc and /sys");
            self.force_release();
        }
    }
}
