//! External process boundary.
//!
//! The separation engine and the streaming downloader both run as child
//! processes. Everything that launches one goes through [`ProcessInvoker`]
//! so a crash or resource exhaustion in the child surfaces as a non-zero
//! exit status instead of taking down the pipeline, and so tests can
//! substitute a fake engine.

use std::{
    ffi::OsString,
    io,
    path::Path,
    process::{Command, Stdio},
};

/// Captured result of one child process run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait ProcessInvoker: Send + Sync {
    /// Runs `program` to completion. `Err` only when it could not be started.
    fn invoke(&self, program: &Path, args: &[OsString]) -> io::Result<ProcessOutput>;
}

/// Runs real child processes with captured stdout and stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemProcess;

impl ProcessInvoker for SystemProcess {
    fn invoke(&self, program: &Path, args: &[OsString]) -> io::Result<ProcessOutput> {
        log::debug!("Running {:?} {:?}", program, args);

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
