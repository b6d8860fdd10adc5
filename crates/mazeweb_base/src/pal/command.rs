use std::time::Duration;

/* # Why a CommandSpec value type instead of std::process::Command?

std::process::Command is not inspectable once built and cannot be executed by
an in-memory test double. CommandSpec is a plain description of an invocation
(program plus discrete argument tokens) that RealPal turns into an actual
process and MockPal can match against in tests. Arguments are always passed as
separate tokens, never through a shell, so caller-supplied values (seeds,
sizes) cannot be used for injection.
*/

/// Description of an external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandSpec {
    /// Create a spec for the given program with no arguments and no timeout.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            timeout: None,
        }
    }

    /// Append a single argument token.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several argument tokens.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Bound the execution time. A command exceeding the bound is killed and
    /// reported as `CommandStatus::TimedOut`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The program to execute (path or name resolved via PATH).
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The argument tokens, in order.
    pub fn args_slice(&self) -> &[String] {
        &self.args
    }

    /// The configured execution bound, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl std::fmt::Display for CommandSpec {
    // Display form is for logs only, not for shell consumption.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// How an executed command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// The process exited on its own with the given code.
    Exited(i32),
    /// The process exceeded its timeout and was killed.
    TimedOut,
}

/// Captured outcome of an executed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: CommandStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// An outcome for a process that exited with the given code.
    pub fn exited(code: i32, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            status: CommandStatus::Exited(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// An outcome for a process that was killed after exceeding its timeout.
    pub fn timed_out() -> Self {
        Self {
            status: CommandStatus::TimedOut,
            stdout: vec![],
            stderr: vec![],
        }
    }

    /// True if the process exited with code zero.
    pub fn success(&self) -> bool {
        self.status == CommandStatus::Exited(0)
    }

    /// Captured stdout, lossily decoded as UTF-8.
    pub fn stdout_utf8(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Captured stderr, lossily decoded as UTF-8.
    pub fn stderr_utf8(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}
