//! Repository registration and package installation via pisi.
//!
//! Install order is part of the contract: components, then the profile's
//! mandatory packages, then caller supplied packages, each in listed order.
//! pisi resolves dependencies per invocation, so reordering changes the
//! resulting image.

use anyhow::Result;

use super::context::BuildContext;
use crate::process::Cmd;

/// Package manager binary on the host.
pub const PISI: &str = "pisi";

/// What a single install invocation installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallItem {
    Component(String),
    Package(String),
}

/// `pisi --yes-all -D<target>`, shared by every invocation.
fn pisi(ctx: &BuildContext) -> Cmd {
    Cmd::new(PISI)
        .arg("--yes-all")
        .arg(format!("-D{}", ctx.target.display()))
}

/// Register the primary repository, then the profile's extras.
pub fn register_repositories(ctx: &BuildContext) -> Result<()> {
    println!("Registering repositories...");
    let repos = std::iter::once(&ctx.repository).chain(&ctx.profile.extra_repositories);
    for repo in repos {
        ctx.run(
            pisi(ctx)
                .args(["add-repo", &repo.name, &repo.url])
                .error_msg(format!("Failed to add repository '{}'", repo.name)),
        )?;
    }
    Ok(())
}

/// Everything to install, in install order.
pub fn install_plan(ctx: &BuildContext) -> Vec<InstallItem> {
    let profile = &ctx.profile;
    profile
        .components
        .iter()
        .cloned()
        .map(InstallItem::Component)
        .chain(profile.packages.iter().cloned().map(InstallItem::Package))
        .chain(ctx.additional.iter().cloned().map(InstallItem::Package))
        .collect()
}

/// Command for one install step.
pub fn install_command(ctx: &BuildContext, item: &InstallItem) -> Cmd {
    let cmd = pisi(ctx)
        .args(["--ignore-comar", "--ignore-file-conflicts", "install"])
        .stream();

    match item {
        InstallItem::Component(name) => {
            let mut cmd = cmd.args(["--component", name.as_str()]);
            for pattern in &ctx.profile.component_excludes {
                cmd = cmd.args(["--exclude", pattern.as_str()]);
            }
            cmd
        }
        InstallItem::Package(name) => cmd.arg(name),
    }
}

/// Install everything in the plan, one pisi invocation per item.
pub fn install_all(ctx: &BuildContext) -> Result<()> {
    let plan = install_plan(ctx);
    println!("Installing {} items...", plan.len());

    for item in &plan {
        ctx.checkpoint()?;
        match item {
            InstallItem::Component(name) => println!("  Component: {}", name),
            InstallItem::Package(name) => println!("  Package: {}", name),
        }
        ctx.run(install_command(ctx, item))?;
    }
    Ok(())
}
