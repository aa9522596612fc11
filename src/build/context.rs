//! Build context shared across all build steps.
//!
//! Bundles the target directory, the selected profile and the command
//! runner so each step is a plain function of `&BuildContext`.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::interrupt::Interrupt;
use crate::process::{Cmd, CommandResult, Runner};
use crate::profile::{Profile, Repository};

/// Tunables that are not part of a profile.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// How long to wait for the bus socket.
    pub bus_timeout: Duration,
    /// Delay between socket connection attempts.
    pub bus_interval: Duration,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            bus_timeout: Duration::from_secs(5),
            bus_interval: Duration::from_millis(100),
        }
    }
}

/// Shared context for all build operations.
pub struct BuildContext<'a> {
    /// Root filesystem under construction
    pub target: PathBuf,
    /// Primary package repository
    pub repository: Repository,
    /// Caller supplied packages, installed last
    pub additional: Vec<String>,
    pub profile: Profile,
    pub options: BuildOptions,
    runner: &'a dyn Runner,
    interrupt: Interrupt,
}

impl<'a> BuildContext<'a> {
    /// Create a new build context.
    ///
    /// The target must already exist; the builder never creates it.
    pub fn new(
        target: &Path,
        repository: Repository,
        additional: Vec<String>,
        profile: Profile,
        runner: &'a dyn Runner,
        interrupt: Interrupt,
    ) -> Result<Self> {
        if !target.is_dir() {
            bail!(
                "Target directory {} does not exist.\n\
                 Create it before building the image.",
                target.display()
            );
        }
        if !target.is_absolute() {
            bail!("Target directory {} must be an absolute path", target.display());
        }

        Ok(Self {
            target: target.to_path_buf(),
            repository,
            additional,
            profile,
            options: BuildOptions::default(),
            runner,
            interrupt,
        })
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Path of `rel` inside the target.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.target.join(rel.trim_start_matches('/'))
    }

    pub fn runner(&self) -> &'a dyn Runner {
        self.runner
    }

    /// Stop here if the user asked us to.
    pub fn checkpoint(&self) -> Result<()> {
        self.interrupt.check()?;
        Ok(())
    }

    /// Run a command, treating an interrupt during it as [`Interrupted`].
    ///
    /// [`Interrupted`]: crate::interrupt::Interrupted
    pub fn run(&self, cmd: Cmd) -> Result<CommandResult> {
        let result = cmd.run_on(self.runner);
        self.checkpoint()?;
        result
    }

    /// Build a command that runs `argv` inside the target.
    pub fn chroot<I, S>(&self, argv: I) -> Cmd
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Cmd::chroot(&self.target, argv)
    }

    /// Run `argv` inside the target, failing on non-zero exit.
    pub fn chrun<I, S>(&self, argv: I) -> Result<CommandResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.run(self.chroot(argv))
    }
}
