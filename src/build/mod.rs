//! The client image build workflow.
//!
//! One linear sequence of steps, each a function of [`BuildContext`]:
//!
//! - `packages`: repository registration and installation
//! - `etc`: /etc seeding and the release marker
//! - `devices`: temporary device nodes
//! - `mounts`: /proc and /sys bind mounts
//! - `bus`: message bus bootstrap inside the chroot
//! - `users`: account provisioning inside the chroot
//! - `kernel`: latestkernel/latestinitramfs links, depmod, initramfs
//! - `shrink`: exclude-list pruning
//!
//! The bind mounts are held by a guard for the whole chroot phase, so they
//! are released on success, on a failing command and on interruption alike.

pub mod bus;
pub mod context;
pub mod devices;
pub mod etc;
pub mod kernel;
pub mod mounts;
pub mod packages;
pub mod shrink;
pub mod users;

use anyhow::Result;
use std::fmt;
use std::time::Instant;

pub use context::{BuildContext, BuildOptions};
use mounts::BindMounts;

use crate::interrupt::Interrupted;
use crate::timing::{format_duration, Timer};

/// Workflow states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    RepoRegistered,
    Installed,
    EtcSeeded,
    DevicesCreated,
    Mounted,
    ChrootConfigured,
    UsersProvisioned,
    KernelLinked,
    ReleaseStamped,
    Shrunk,
    DevicesRemoved,
    Unmounted,
}

impl Stage {
    /// What runs to reach this stage.
    pub fn description(self) -> &'static str {
        match self {
            Stage::RepoRegistered => "Register repositories",
            Stage::Installed => "Install packages",
            Stage::EtcSeeded => "Seed /etc",
            Stage::DevicesCreated => "Create device nodes",
            Stage::Mounted => "Mount /proc and /sys",
            Stage::ChrootConfigured => "Configure system",
            Stage::UsersProvisioned => "Provision users",
            Stage::KernelLinked => "Link kernel",
            Stage::ReleaseStamped => "Write release",
            Stage::Shrunk => "Shrink image",
            Stage::DevicesRemoved => "Remove device nodes",
            Stage::Unmounted => "Unmount /proc and /sys",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Run one step: check for interruption, time it, label its errors.
fn step<T>(ctx: &BuildContext, stage: Stage, f: impl FnOnce() -> Result<T>) -> Result<T> {
    ctx.checkpoint()?;
    println!();
    let timer = Timer::start(stage.description());
    match f() {
        Ok(value) => {
            timer.finish();
            Ok(value)
        }
        Err(e) if e.downcast_ref::<Interrupted>().is_some() => Err(e),
        Err(e) => Err(e.context(format!("{} failed", stage))),
    }
}

/// Build the client image into `ctx.target`.
pub fn build_image(ctx: &BuildContext) -> Result<()> {
    println!(
        "=== Building {} client image in {} ===",
        ctx.profile.name,
        ctx.target.display()
    );
    let start = Instant::now();

    step(ctx, Stage::RepoRegistered, || packages::register_repositories(ctx))?;
    step(ctx, Stage::Installed, || packages::install_all(ctx))?;
    step(ctx, Stage::EtcSeeded, || etc::seed_etc(ctx))?;
    step(ctx, Stage::DevicesCreated, || devices::create_devices(ctx))?;

    let mounts = step(ctx, Stage::Mounted, || {
        BindMounts::mount(ctx.runner(), &ctx.target)
    })?;

    // Any early return from here on drops `mounts`, which force-unmounts.
    step(ctx, Stage::ChrootConfigured, || configure_system(ctx))?;
    step(ctx, Stage::UsersProvisioned, || {
        users::provision(ctx)?;
        bus::stop_bus(ctx)
    })?;
    step(ctx, Stage::KernelLinked, || {
        for cmd in &ctx.profile.pre_kernel {
            ctx.chrun(cmd)?;
        }
        kernel::link_kernel(ctx)
    })?;
    step(ctx, Stage::ReleaseStamped, || etc::write_release(ctx))?;
    step(ctx, Stage::Shrunk, || {
        for cmd in &ctx.profile.finalize {
            ctx.chrun(cmd)?;
        }
        shrink::shrink(ctx)
    })?;
    step(ctx, Stage::DevicesRemoved, || devices::remove_devices(ctx))?;
    step(ctx, Stage::Unmounted, || mounts.release())?;

    println!(
        "\n=== Build complete ({}) ===",
        format_duration(start.elapsed())
    );
    Ok(())
}

/// Library cache, environment, bus and package configuration.
fn configure_system(ctx: &BuildContext) -> Result<()> {
    for cmd in &ctx.profile.prepare {
        ctx.chrun(cmd)?;
    }
    bus::start_bus(ctx)?;
    for cmd in &ctx.profile.post_bus {
        ctx.chrun(cmd)?;
    }
    Ok(())
}
