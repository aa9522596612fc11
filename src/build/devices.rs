//! Temporary device nodes.
//!
//! Chrooted tools expect /dev/null and friends. The nodes only live for the
//! chroot phase; the installer creates the real ones on the client.

use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;

use super::context::BuildContext;
use crate::process::Cmd;
use crate::profile::DeviceNode;

/// mknod(1) invocation for `node`.
pub fn mknod_command(ctx: &BuildContext, node: &DeviceNode) -> Cmd {
    Cmd::new("mknod")
        .args(["-m", &format!("{:o}", node.mode)])
        .arg_path(&ctx.path(&node.path))
        .args([
            node.kind.letter().to_string(),
            node.major.to_string(),
            node.minor.to_string(),
        ])
}

/// Create every device node the profile lists, replacing stale entries.
pub fn create_devices(ctx: &BuildContext) -> Result<()> {
    println!("Creating device nodes...");
    for node in &ctx.profile.devices {
        let path = ctx.path(&node.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        remove_entry(&path)?;
        ctx.run(mknod_command(ctx, node))?;
    }
    Ok(())
}

/// Remove the device nodes again. Already missing nodes are fine.
pub fn remove_devices(ctx: &BuildContext) -> Result<()> {
    println!("Removing temporary device nodes...");
    for node in &ctx.profile.devices {
        let path = ctx.path(&node.path);
        remove_entry(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

fn remove_entry(path: &std::path::Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::Interrupt;
    use crate::process::testing::RecordingRunner;
    use crate::profile::Profile;

    #[test]
    fn mknod_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        let profile = Profile::pardus_2008();
        let ctx = BuildContext::new(
            dir.path(),
            profile.repository.clone(),
            Vec::new(),
            profile,
            &runner,
            Interrupt::new(),
        )
        .unwrap();

        create_devices(&ctx).unwrap();
        let lines = runner.lines();
        let root = dir.path().display();
        assert_eq!(
            lines,
            vec![
                format!("mknod -m 666 {}/dev/null c 1 3", root),
                format!("mknod -m 600 {}/dev/console c 5 1", root),
                format!("mknod -m 666 {}/dev/urandom c 1 9", root),
            ]
        );
        assert!(dir.path().join("dev").is_dir());
    }

    #[test]
    fn stale_entries_are_replaced_and_removal_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("dev")).unwrap();
        fs::write(dir.path().join("dev/null"), "not a device").unwrap();

        let runner = RecordingRunner::new();
        let profile = Profile::pardus_2008();
        let ctx = BuildContext::new(
            dir.path(),
            profile.repository.clone(),
            Vec::new(),
            profile,
            &runner,
            Interrupt::new(),
        )
        .unwrap();

        create_devices(&ctx).unwrap();
        assert!(!dir.path().join("dev/null").exists());

        fs::write(dir.path().join("dev/console"), "").unwrap();
        remove_devices(&ctx).unwrap();
        remove_devices(&ctx).unwrap();
        assert!(!dir.path().join("dev/console").exists());
    }
}
