//! Interrupt handling.
//!
//! SIGINT/SIGTERM raise a shared flag instead of killing the process, so the
//! build can stop at the next step boundary and release its bind mounts.

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared interruption flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route Ctrl-C and termination signals to this flag.
    ///
    /// Can only be installed once per process.
    pub fn install_handler(&self) -> anyhow::Result<()> {
        let flag = Arc::clone(&self.flag);
        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                eprintln!("\nStill cleaning up, please wait...");
            } else {
                eprintln!("\nInterrupted, stopping after the current step...");
            }
        })?;
        Ok(())
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with [`Interrupted`] if the flag has been raised.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_set() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}

/// The build was stopped by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("build interrupted")
    }
}

impl Error for Interrupted {}
