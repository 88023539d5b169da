//! External command execution with captured output streams.

use crossbeam_utils::thread::ScopedJoinHandle;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::{io, mem, panic, thread};

/// Specification of a single external command invocation.
///
/// Both output sinks are mandatory: all process output must be captured so it
/// can be surfaced in the build log.
pub struct Execution<'a> {
    pub command: String,
    pub args: Vec<String>,
    pub dir: PathBuf,
    pub stdout: &'a mut (dyn Write + Send),
    pub stderr: &'a mut (dyn Write + Send),
}

/// Capability to run an external command.
///
/// One invocation, pass/fail. No retries and no timeouts at this layer; callers
/// that need deadlines must wrap their executor externally.
pub trait Executor {
    fn execute(&mut self, execution: Execution<'_>) -> Result<(), ExecutionError>;
}

/// [`Executor`] that spawns a real child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    fn execute(&mut self, execution: Execution<'_>) -> Result<(), ExecutionError> {
        let Execution {
            command,
            args,
            dir,
            stdout,
            stderr,
        } = execution;

        let mut child = Command::new(&command)
            .args(&args)
            .current_dir(&dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| ExecutionError::Spawn(command.clone(), error))?;

        // Copying the data to the sinks happens in separate threads for stdout and stderr to
        // ensure they're processed in parallel, so interleaved output stays interleaved.
        // Scoped threads avoid requiring 'static lifetimes for the sinks.
        unwind_panic(crossbeam_utils::thread::scope(|scope| {
            let stdout_copy_thread = mem::take(&mut child.stdout)
                .map(|mut out| scope.spawn(move |_| io::copy(&mut out, stdout)));

            let stderr_copy_thread = mem::take(&mut child.stderr)
                .map(|mut err| scope.spawn(move |_| io::copy(&mut err, stderr)));

            let stdout_copy_result = stdout_copy_thread.map_or_else(|| Ok(0), join_and_unwind_panic);
            let stderr_copy_result = stderr_copy_thread.map_or_else(|| Ok(0), join_and_unwind_panic);

            stdout_copy_result.and(stderr_copy_result)
        }))
        .map_err(|error| ExecutionError::Stream(command.clone(), error))?;

        let exit_status = child
            .wait()
            .map_err(|error| ExecutionError::Spawn(command.clone(), error))?;

        if exit_status.success() {
            Ok(())
        } else {
            Err(ExecutionError::ExitStatus(command, exit_status))
        }
    }
}

fn join_and_unwind_panic<T>(handle: ScopedJoinHandle<T>) -> T {
    unwind_panic(handle.join())
}

fn unwind_panic<T>(result: thread::Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic::resume_unwind(err),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ExecutionError {
    #[error("Couldn't start `{0}`: {1}")]
    Spawn(String, #[source] std::io::Error),

    #[error("I/O error while capturing output of `{0}`: {1}")]
    Stream(String, #[source] std::io::Error),

    #[error("`{0}` {1}")]
    ExitStatus(String, ExitStatus),
}
