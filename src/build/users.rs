//! User and group provisioning inside the chroot.
//!
//! Every account is checked against the target's own databases with
//! getent(1) first and only created when missing. groupadd/useradd exit 9
//! when the name is already taken, which also counts as success.

use anyhow::Result;

use super::context::BuildContext;
use crate::profile::{GroupSpec, UserSpec};

/// Exit code of groupadd/useradd for "name already exists".
const ALREADY_EXISTS: i32 = 9;

/// Configuration service client inside the target.
const HAV: &str = "/usr/bin/hav";

fn exists(ctx: &BuildContext, database: &str, name: &str) -> Result<bool> {
    let result = ctx.run(ctx.chroot(["getent", database, name]).allow_fail())?;
    Ok(result.success() && !result.stdout_trimmed().is_empty())
}

/// Create the group unless the target already has it.
pub fn ensure_group(ctx: &BuildContext, group: &GroupSpec) -> Result<()> {
    if exists(ctx, "group", &group.name)? {
        println!("  Group {} exists", group.name);
        return Ok(());
    }

    let mut cmd = ctx.chroot(["groupadd"]);
    if group.system {
        cmd = cmd.arg("-r");
    }
    if let Some(gid) = group.gid {
        cmd = cmd.args(["-g".to_string(), gid.to_string()]);
    }
    ctx.run(cmd.arg(&group.name).ok_code(ALREADY_EXISTS))?;
    println!("  Created group {}", group.name);
    Ok(())
}

/// Create the user unless the target already has it.
pub fn ensure_user(ctx: &BuildContext, user: &UserSpec) -> Result<()> {
    if exists(ctx, "passwd", &user.name)? {
        println!("  User {} exists", user.name);
        return Ok(());
    }

    let mut cmd = ctx.chroot(["useradd"]);
    if user.system {
        cmd = cmd.arg("-r");
    }
    cmd = cmd.args(["-g", &user.group, "-d", &user.home, "-s", &user.shell]);
    if !user.comment.is_empty() {
        cmd = cmd.args(["-c", &user.comment]);
    }
    ctx.run(cmd.arg(&user.name).ok_code(ALREADY_EXISTS))?;
    println!("  Created user {}", user.name);
    Ok(())
}

/// Set the root password through the configuration service and its shell.
pub fn configure_root(ctx: &BuildContext) -> Result<()> {
    let root = &ctx.profile.root;
    if let Some(password) = &root.password {
        ctx.chrun([
            HAV,
            "call",
            "User.Manager.setUser",
            "uid",
            "0",
            "password",
            password.as_str(),
        ])?;
    }
    if let Some(shell) = &root.shell {
        ctx.chrun(["usermod", "-s", shell.as_str(), "root"])?;
    }
    Ok(())
}

/// Groups first (users may need them), then users, then root.
pub fn provision(ctx: &BuildContext) -> Result<()> {
    println!("Provisioning users and groups...");
    for group in &ctx.profile.groups {
        ensure_group(ctx, group)?;
    }
    for user in &ctx.profile.users {
        ensure_user(ctx, user)?;
    }
    configure_root(ctx)
}
