//! External command execution.
//!
//! Every external tool the builder touches (pisi, chroot, mount, mknod, ...)
//! goes through [`Cmd`]. Commands are argument vectors, never shell strings.
//! The [`Runner`] trait is the seam between the workflow and the host so the
//! whole build can be replayed against a recording runner in tests.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

/// Exit status and captured output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: ExitStatus,
    /// Captured stdout as a string (empty for streamed commands).
    pub stdout: String,
    /// Captured stderr as a string (empty for streamed commands).
    pub stderr: String,
}

impl CommandResult {
    /// Build a result from a raw exit code.
    pub fn from_code(code: i32, stdout: &str) -> Self {
        use std::os::unix::process::ExitStatusExt;
        Self {
            status: ExitStatus::from_raw((code & 0xff) << 8),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    /// Exit status 0.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, -1 when killed by a signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    /// Captured stdout without surrounding whitespace.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// An argument vector plus the rules for judging its exit status.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    /// Never fail on exit status.
    allow_fail: bool,
    /// Exit codes besides 0 that count as success.
    ok_codes: Vec<i32>,
    /// Inherit stdio instead of capturing output.
    stream: bool,
    /// Replaces the command line in error messages.
    error_prefix: Option<String>,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            allow_fail: false,
            ok_codes: Vec::new(),
            stream: false,
            error_prefix: None,
        }
    }

    /// Run `argv` with `root` as the apparent filesystem root.
    pub fn chroot<I, S>(root: &Path, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Cmd::new("chroot").arg_path(root).args(argv)
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Lossy: paths are only ever passed to command line tools.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Accept any exit status.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Treat `code` as success in addition to 0.
    pub fn ok_code(mut self, code: i32) -> Self {
        self.ok_codes.push(code);
        self
    }

    /// Stream output to the terminal instead of capturing it.
    pub fn stream(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Use `msg` instead of the command line when reporting failure.
    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn is_streamed(&self) -> bool {
        self.stream
    }

    /// Full argument vector, program first.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Human readable command line, quoting arguments with whitespace.
    pub fn command_line(&self) -> String {
        self.argv()
            .iter()
            .map(|a| {
                if a.is_empty() || a.chars().any(char::is_whitespace) {
                    format!("'{}'", a)
                } else {
                    a.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Run the command on `runner` and check its exit status.
    pub fn run_on(&self, runner: &dyn Runner) -> Result<CommandResult> {
        let result = runner.execute(self)?;
        self.check(result)
    }

    /// Run the command on the host.
    pub fn run(self) -> Result<CommandResult> {
        self.run_on(&SystemRunner)
    }

    fn check(&self, result: CommandResult) -> Result<CommandResult> {
        if self.allow_fail || result.success() || self.ok_codes.contains(&result.code()) {
            return Ok(result);
        }

        let prefix = self
            .error_prefix
            .clone()
            .unwrap_or_else(|| format!("'{}' returned {}", self.command_line(), result.code()));

        let stderr = result.stderr_trimmed();
        if stderr.is_empty() {
            bail!("{} (exit code {})", prefix, result.code());
        } else {
            bail!("{} (exit code {}):\n{}", prefix, result.code(), stderr);
        }
    }
}

/// Executes commands on behalf of the builder.
pub trait Runner {
    /// Run `cmd` to completion. Only fails if the program could not be started.
    fn execute(&self, cmd: &Cmd) -> Result<CommandResult>;

    /// Start `cmd` in the background, detached from our stdio.
    fn spawn_detached(&self, cmd: &Cmd) -> Result<()>;
}

/// Runs commands on the host system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn execute(&self, cmd: &Cmd) -> Result<CommandResult> {
        println!("  $ {}", cmd.command_line());
        let mut command = cmd.to_command();

        if cmd.stream {
            command.stdin(Stdio::inherit());
            command.stdout(Stdio::inherit());
            command.stderr(Stdio::inherit());
            let status = command.status().with_context(|| {
                format!("Failed to execute '{}'. Is it installed?", cmd.program)
            })?;
            return Ok(CommandResult {
                status,
                stdout: String::new(),
                stderr: String::new(),
            });
        }

        let output = command.output().with_context(|| {
            format!("Failed to execute '{}'. Is it installed?", cmd.program)
        })?;

        Ok(CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn spawn_detached(&self, cmd: &Cmd) -> Result<()> {
        println!("  $ {} &", cmd.command_line());
        let mut command = cmd.to_command();
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
        command.stderr(Stdio::null());
        command.spawn().with_context(|| {
            format!("Failed to start '{}'. Is it installed?", cmd.program)
        })?;
        Ok(())
    }
}

/// Full path of `program` if it is on PATH.
pub fn which(program: &str) -> Option<String> {
    which::which(program)
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
}

#[cfg(test)]
use crate::interrupt::Interrupt;

#[cfg(test)]
pub(crate) mod testing;
