//! Message bus bootstrap inside the chroot.
//!
//! Package post-install hooks talk to the configuration service over the
//! system bus, so the bus daemon has to be running inside the target before
//! they run.

use anyhow::Result;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use super::context::BuildContext;

/// Poll until something accepts connections on `socket`.
///
/// Returns false if nothing did within `timeout`. A timeout too large to
/// represent as an instant never expires.
pub fn wait_for_socket(socket: &Path, timeout: Duration, interval: Duration) -> bool {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if UnixStream::connect(socket).is_ok() {
            return true;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return false;
        }
        thread::sleep(interval);
    }
}

/// Ensure the machine identity, start the daemon and wait for its socket.
///
/// Readiness is best effort: the build carries on even if the socket never
/// shows up. Returns whether it did.
pub fn start_bus(ctx: &BuildContext) -> Result<bool> {
    let bus = &ctx.profile.bus;
    println!("Starting message bus...");

    if let Some(machine_id) = &bus.machine_id {
        ctx.chrun(machine_id)?;
    }

    ctx.runner().spawn_detached(&ctx.chroot(&bus.daemon))?;

    let socket = ctx.path(&bus.socket);
    let ready = wait_for_socket(&socket, ctx.options.bus_timeout, ctx.options.bus_interval);
    if ready {
        println!("  Bus ready at {}", bus.socket);
    } else {
        eprintln!(
            "  [WARN] {} did not come up within {:.1}s, continuing",
            socket.display(),
            ctx.options.bus_timeout.as_secs_f64()
        );
    }
    ctx.checkpoint()?;
    Ok(ready)
}

/// Stop the bus daemon. Failures are logged and ignored.
pub fn stop_bus(ctx: &BuildContext) -> Result<()> {
    if let Some(stop) = &ctx.profile.bus.stop {
        println!("Stopping message bus...");
        let result = ctx.run(ctx.chroot(stop).allow_fail())?;
        if !result.success() {
            eprintln!("  [WARN] bus stop returned {}", result.code());
        }
    }
    Ok(())
}
