//! Kernel artifact linking.
//!
//! Pardus installs kernels as `boot/kernel-<version>` and initramfs images as
//! `boot/initramfs-<version>`. The client boots through the stable
//! `boot/latestkernel` and `boot/latestinitramfs` links, which always point
//! at the newest image.

use anyhow::{bail, Context, Result};
use std::cmp::Ordering;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use super::context::BuildContext;

pub const LATEST_KERNEL: &str = "boot/latestkernel";
pub const LATEST_INITRAMFS: &str = "boot/latestinitramfs";

/// Compare two file names, treating runs of digits as numbers.
///
/// `kernel-2.6.25.10` sorts after `kernel-2.6.25.9`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a, b);
    loop {
        match (a.is_empty(), b.is_empty()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }

        let a_digit = a.starts_with(|c: char| c.is_ascii_digit());
        let b_digit = b.starts_with(|c: char| c.is_ascii_digit());
        let a_len = run_len(a, a_digit);
        let b_len = run_len(b, b_digit);
        let (a_run, a_rest) = a.split_at(a_len);
        let (b_run, b_rest) = b.split_at(b_len);

        let ord = if a_digit && b_digit {
            let a_num = a_run.trim_start_matches('0');
            let b_num = b_run.trim_start_matches('0');
            a_num
                .len()
                .cmp(&b_num.len())
                .then_with(|| a_num.cmp(b_num))
        } else {
            a_run.cmp(b_run)
        };
        if ord != Ordering::Equal {
            return ord;
        }
        a = a_rest;
        b = b_rest;
    }
}

fn run_len(s: &str, digits: bool) -> usize {
    s.find(|c: char| c.is_ascii_digit() != digits)
        .unwrap_or(s.len())
}

/// Newest file in `dir` whose name starts with `prefix`.
///
/// Symlinks are ignored so an existing `latest*` link never wins.
pub fn find_newest(dir: &Path, prefix: &str) -> Result<Option<String>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut newest: Option<String> = None;
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_symlink() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(prefix) || name.len() == prefix.len() {
            continue;
        }
        let replace = match &newest {
            Some(current) => compare_versions(&name, current) == Ordering::Greater,
            None => true,
        };
        if replace {
            newest = Some(name);
        }
    }
    Ok(newest)
}

/// Point `link` at `target` (a name relative to the link's directory).
pub fn replace_symlink(target: &str, link: &Path) -> Result<()> {
    match fs::remove_file(link) {
        Err(e) if e.kind() != ErrorKind::NotFound => {
            return Err(e).with_context(|| format!("Failed to remove {}", link.display()))
        }
        _ => {}
    }
    std::os::unix::fs::symlink(target, link)
        .with_context(|| format!("Failed to link {} -> {}", link.display(), target))?;
    Ok(())
}

/// Link the newest kernel (and initramfs), index modules, build the initramfs.
///
/// Returns the kernel version.
pub fn link_kernel(ctx: &BuildContext) -> Result<String> {
    let spec = &ctx.profile.kernel;
    let boot = ctx.path("boot");
    println!("Linking kernel artifacts...");

    let Some(image) = find_newest(&boot, &spec.image_prefix)? else {
        bail!(
            "No kernel image matching '{}*' in {}",
            spec.image_prefix,
            boot.display()
        );
    };
    let version = image[spec.image_prefix.len()..].to_string();
    replace_symlink(&image, &ctx.path(LATEST_KERNEL))?;
    println!("  latestkernel -> {}", image);

    ctx.chrun(["/sbin/depmod", "-a", version.as_str()])?;

    if let Some(generator) = &spec.initramfs_generator {
        ctx.chrun(generator.iter().map(|a| a.replace("{version}", &version)))?;
    }

    if let Some(prefix) = &spec.initramfs_prefix {
        match find_newest(&boot, prefix)? {
            Some(initramfs) => {
                replace_symlink(&initramfs, &ctx.path(LATEST_INITRAMFS))?;
                println!("  latestinitramfs -> {}", initramfs);
            }
            None => eprintln!("  [WARN] No initramfs matching '{}*' in boot/", prefix),
        }
    }

    Ok(version)
}
