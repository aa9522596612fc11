//! In-memory [`Runner`] that records commands instead of running them.
//!
//! Compiled into the library's unit tests and pulled into `tests/` with a
//! `#[path]` module, so it never ships in the library itself. The parent
//! module must have `Cmd`, `CommandResult`, `Runner`, `Interrupt` and
//! `anyhow::Result` in scope.

use std::cell::RefCell;

use super::*;

/// Records every command instead of running it.
///
/// Commands whose command line contains a `fail_on` needle exit with the
/// configured code. Commands matching `interrupt_after` raise the
/// interrupt flag once they "finish".
#[derive(Default)]
pub struct RecordingRunner {
    commands: RefCell<Vec<Vec<String>>>,
    spawned: RefCell<Vec<Vec<String>>>,
    failures: Vec<(String, i32)>,
    replies: Vec<(String, i32, String)>,
    interrupt_after: Option<(String, Interrupt)>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail commands whose command line contains `needle`.
    pub fn fail_on(mut self, needle: &str, code: i32) -> Self {
        self.failures.push((needle.to_string(), code));
        self
    }

    /// Answer commands containing `needle` with a fixed exit code and stdout.
    pub fn reply(mut self, needle: &str, code: i32, stdout: &str) -> Self {
        self.replies
            .push((needle.to_string(), code, stdout.to_string()));
        self
    }

    /// Trigger `interrupt` after the first command containing `needle`.
    pub fn interrupt_after(mut self, needle: &str, interrupt: Interrupt) -> Self {
        self.interrupt_after = Some((needle.to_string(), interrupt));
        self
    }

    /// Every executed command, as argument vectors.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.borrow().clone()
    }

    /// Every executed command, as command lines.
    pub fn lines(&self) -> Vec<String> {
        self.commands.borrow().iter().map(|c| c.join(" ")).collect()
    }

    /// Every detached command, as command lines.
    pub fn spawned(&self) -> Vec<String> {
        self.spawned.borrow().iter().map(|c| c.join(" ")).collect()
    }

    /// Index of the first command line containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.lines().iter().position(|l| l.contains(needle))
    }

    /// Number of command lines containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.lines().iter().filter(|l| l.contains(needle)).count()
    }
}

impl Runner for RecordingRunner {
    fn execute(&self, cmd: &Cmd) -> Result<CommandResult> {
        let line = cmd.argv().join(" ");
        self.commands.borrow_mut().push(cmd.argv());

        if let Some((needle, interrupt)) = &self.interrupt_after {
            if line.contains(needle.as_str()) {
                interrupt.trigger();
            }
        }

        if let Some((_, code)) = self.failures.iter().find(|(n, _)| line.contains(n.as_str())) {
            return Ok(CommandResult::from_code(*code, ""));
        }
        if let Some((_, code, out)) =
            self.replies.iter().find(|(n, _, _)| line.contains(n.as_str()))
        {
            return Ok(CommandResult::from_code(*code, out));
        }
        Ok(CommandResult::from_code(0, ""))
    }

    fn spawn_detached(&self, cmd: &Cmd) -> Result<()> {
        self.spawned.borrow_mut().push(cmd.argv());
        Ok(())
    }
}
