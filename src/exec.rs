//! External process execution.
//!
//! Every git and container-runtime call goes through a [`CommandRunner`] so
//! that the lifecycle manager and runtime resolver can be exercised without
//! touching real processes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use crate::error::{Error, Result};

/// A program invocation: program, arguments and optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends a path argument.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn failed(&self, reason: impl Into<String>, code: Option<i32>, output: String) -> Error {
        Error::ExternalCommand {
            command: self.to_string(),
            reason: reason.into(),
            code,
            output,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Strategy for running external commands.
pub trait CommandRunner {
    /// Runs to completion and returns captured stdout and stderr.
    ///
    /// A non-zero exit becomes [`Error::ExternalCommand`] carrying the
    /// captured output.
    fn output(&self, invocation: &Invocation) -> Result<String>;

    /// Runs with stdin, stdout and stderr inherited from this process.
    fn run_inherited(&self, invocation: &Invocation) -> Result<()>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn output(&self, invocation: &Invocation) -> Result<String> {
        (**self).output(invocation)
    }

    fn run_inherited(&self, invocation: &Invocation) -> Result<()> {
        (**self).run_inherited(invocation)
    }
}

/// Runs commands with [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn output(&self, invocation: &Invocation) -> Result<String> {
        tracing::debug!(command = %invocation, "running command");

        let Output {
            status,
            stdout,
            stderr,
        } = invocation
            .to_command()
            .stdin(Stdio::null())
            .output()
            .map_err(|e| invocation.failed(e.to_string(), None, String::new()))?;

        let mut combined = String::from_utf8_lossy(&stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&stderr));

        if !status.success() {
            return Err(invocation.failed(status.to_string(), status.code(), combined));
        }
        Ok(combined)
    }

    fn run_inherited(&self, invocation: &Invocation) -> Result<()> {
        tracing::debug!(command = %invocation, "running interactive command");

        let status = invocation
            .to_command()
            .status()
            .map_err(|e| invocation.failed(e.to_string(), None, String::new()))?;

        if !status.success() {
            return Err(invocation.failed(status.to_string(), status.code(), String::new()));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner that records invocations instead of spawning processes.

    use std::cell::RefCell;

    use super::*;

    type Responder = Box<dyn Fn(&Invocation) -> Result<String>>;

    /// Records every invocation and answers from a closure.
    pub struct ScriptedRunner {
        calls: RefCell<Vec<Invocation>>,
        responder: Responder,
    }

    impl ScriptedRunner {
        /// A runner where every command succeeds with empty output.
        pub fn succeeding() -> Self {
            Self::with(|_| Ok(String::new()))
        }

        pub fn with(responder: impl Fn(&Invocation) -> Result<String> + 'static) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                responder: Box::new(responder),
            }
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.borrow().clone()
        }

        /// Calls rendered as `program arg arg ...`.
        pub fn lines(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|c| c.to_string()).collect()
        }
    }

    /// Builds the error a failing process would produce.
    pub fn failure(invocation: &Invocation, output: &str) -> Error {
        invocation.failed("exit status: 1", Some(1), output.to_string())
    }

    impl CommandRunner for ScriptedRunner {
        fn output(&self, invocation: &Invocation) -> Result<String> {
            self.calls.borrow_mut().push(invocation.clone());
            (self.responder)(invocation)
        }

        fn run_inherited(&self, invocation: &Invocation) -> Result<()> {
            self.calls.borrow_mut().push(invocation.clone());
            (self.responder)(invocation).map(|_| ())
        }
    }
}
