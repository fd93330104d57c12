//! Scripted command runner for testing the disk collector.

use crate::collector::traits::{CommandOutput, CommandRunner};
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
enum Response {
    Output(CommandOutput),
    NotFound,
}

/// Command runner that returns a fixed response and records invocations.
#[derive(Debug)]
pub struct MockCommand {
    response: Response,
    calls: AtomicUsize,
    last_invocation: Mutex<Option<(String, Vec<String>)>>,
}

impl MockCommand {
    fn with_response(response: Response) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
            last_invocation: Mutex::new(None),
        }
    }

    /// Succeeds with the given stdout.
    pub fn stdout(text: impl Into<String>) -> Self {
        Self::with_response(Response::Output(CommandOutput {
            success: true,
            code: Some(0),
            stdout: text.into().into_bytes(),
            stderr: Vec::new(),
        }))
    }

    /// Exits with a non-zero code and the given stderr.
    pub fn failing(code: i32, stderr: impl Into<String>) -> Self {
        Self::with_response(Response::Output(CommandOutput {
            success: false,
            code: Some(code),
            stdout: Vec::new(),
            stderr: stderr.into().into_bytes(),
        }))
    }

    /// Fails to start, as if the program were not installed.
    pub fn missing() -> Self {
        Self::with_response(Response::NotFound)
    }

    /// Number of times the command has been run.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Program and arguments of the most recent invocation.
    pub fn last_invocation(&self) -> Option<(String, Vec<String>)> {
        self.last_invocation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl CommandRunner for MockCommand {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_invocation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) =
            Some((program.to_string(), args.to_vec()));

        match &self.response {
            Response::Output(output) => Ok(output.clone()),
            Response::NotFound => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: command not found", program),
            )),
        }
    }
}
