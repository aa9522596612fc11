//! /etc seeding and the release marker.

use anyhow::{bail, Context, Result};
use std::fs::{self, File, FileTimes};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use super::context::BuildContext;

/// Template directory shipped by the baselayout package.
pub const BASELAYOUT_DIR: &str = "usr/share/baselayout";

/// Release marker, relative to the target.
pub const RELEASE_FILE: &str = "etc/pardus-release";

/// Copy every file directly inside the baselayout template into `/etc`.
///
/// Only one level is copied. Mode and timestamps are preserved.
pub fn seed_etc(ctx: &BuildContext) -> Result<usize> {
    println!("Seeding /etc from baselayout...");
    let copied = copy_shallow(&ctx.path(BASELAYOUT_DIR), &ctx.path("etc"))?;
    println!("  Copied {} files", copied);
    Ok(copied)
}

/// Shallow copy of `src` into `dst`. Returns the number of entries copied.
pub fn copy_shallow(src: &Path, dst: &Path) -> Result<usize> {
    if !src.is_dir() {
        bail!("Baselayout template not found at {}", src.display());
    }
    fs::create_dir_all(dst)?;

    let mut entries = fs::read_dir(src)
        .with_context(|| format!("Failed to read {}", src.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    let mut copied = 0;
    for entry in entries {
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            println!("  [SKIP] {} is a directory", from.display());
            continue;
        }

        let existing = to.symlink_metadata().ok();
        if file_type.is_symlink() {
            let link = fs::read_link(&from)?;
            if existing.is_some() {
                fs::remove_file(&to)?;
            }
            std::os::unix::fs::symlink(&link, &to)
                .with_context(|| format!("Failed to link {}", to.display()))?;
        } else {
            // Never write through a link already sitting in etc/.
            if existing.is_some_and(|m| m.file_type().is_symlink()) {
                fs::remove_file(&to)?;
            }
            copy_preserving(&from, &to)?;
        }
        copied += 1;
    }
    Ok(copied)
}

/// Copy a regular file keeping permissions, atime and mtime.
fn copy_preserving(from: &Path, to: &Path) -> Result<()> {
    let meta = fs::metadata(from)?;
    fs::copy(from, to)
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;

    // Read-only templates still need a writable handle for set_times.
    let mode = meta.permissions().mode();
    fs::set_permissions(to, fs::Permissions::from_mode(mode | 0o200))?;

    let times = FileTimes::new()
        .set_accessed(meta.accessed()?)
        .set_modified(meta.modified()?);
    File::options()
        .write(true)
        .open(to)?
        .set_times(times)
        .with_context(|| format!("Failed to set timestamps on {}", to.display()))?;
    fs::set_permissions(to, meta.permissions())?;
    Ok(())
}

/// Write the release marker: exactly one line, the profile's release string.
pub fn write_release(ctx: &BuildContext) -> Result<()> {
    let path = ctx.path(RELEASE_FILE);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, format!("{}\n", ctx.profile.release))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("  Release: {}", ctx.profile.release);
    Ok(())
}
