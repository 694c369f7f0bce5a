//! Process launcher.
//!
//! Resolves the agent executable on `PATH`, spawns it in its own process
//! group with stdout and stderr merged into a single pipe, and hands the
//! input payload to the child through stdin.

use crate::error::{EngineError, EngineResult};
use crate::model::InvocationRequest;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use tracing::debug;

#[cfg(unix)]
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
#[cfg(unix)]
use std::os::fd::{AsRawFd, OwnedFd};

/// A freshly spawned agent process and the read end of its output.
pub struct LaunchedProcess {
    pub child: Child,
    /// Combined stdout/stderr of the child.
    pub output: Box<dyn Read + Send>,
    pub program: PathBuf,
}

/// Resolve a logical command name to an absolute executable path.
///
/// Absolute and relative paths are accepted as long as they point to an
/// executable file.
pub fn resolve_executable(command: &str) -> EngineResult<PathBuf> {
    if command.is_empty() {
        return Err(EngineError::EmptyCommand);
    }
    which::which(command).map_err(|_| EngineError::CommandNotFound {
        command: command.to_string(),
    })
}

/// Spawn the child described by `request`.
///
/// The child gets exactly `request.env`, runs in `request.cwd`, and leads a
/// new process group so teardown can signal everything it started.
pub fn launch(request: &InvocationRequest) -> EngineResult<LaunchedProcess> {
    let (name, args) = request
        .argv
        .split_first()
        .ok_or(EngineError::EmptyCommand)?;
    let program = resolve_executable(name)?;
    let (output, stdout, stderr) = output_pipe(name)?;

    let child = {
        let mut command = Command::new(&program);
        command
            .args(args)
            .env_clear()
            .envs(&request.env)
            .current_dir(&request.cwd)
            .stdin(Stdio::piped())
            .stdout(stdout)
            .stderr(stderr);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        command.spawn().map_err(|source| EngineError::Spawn {
            program: program.clone(),
            cwd: request.cwd.clone(),
            source,
        })?
        // `command` drops here, closing our copies of the pipe's write end.
    };

    debug!(pid = child.id(), program = %program.display(), "agent process spawned");
    Ok(LaunchedProcess {
        child,
        output,
        program,
    })
}

/// Hand the input payload to the child on a short-lived writer thread, then
/// close stdin.
///
/// A child that exits (or closes stdin) before reading everything is not an
/// error here; whatever it did is judged from its output and exit status. The
/// returned thread ends once the payload is written or every reader of the
/// pipe is gone, so a child that never reads cannot stall the supervisor.
pub fn write_input(child: &mut Child, input: String) -> EngineResult<Option<JoinHandle<()>>> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(None);
    };
    if input.is_empty() {
        return Ok(None);
    }
    thread::Builder::new()
        .name("agentbox-stdin".to_string())
        .spawn(move || {
            if let Err(err) = stdin.write_all(input.as_bytes()).and_then(|()| stdin.flush()) {
                debug!(error = %err, "child closed stdin before consuming the input");
            }
        })
        .map(Some)
        .map_err(|source| EngineError::WorkerSpawn {
            name: "stdin writer",
            source,
        })
}

#[cfg(unix)]
fn output_pipe(command: &str) -> EngineResult<(Box<dyn Read + Send>, Stdio, Stdio)> {
    let pipe_error = |source: std::io::Error| EngineError::Pipe {
        command: command.to_string(),
        source,
    };
    let (read_end, write_end) =
        nix::unistd::pipe().map_err(|errno| pipe_error(std::io::Error::from(errno)))?;
    set_cloexec(&read_end).map_err(pipe_error)?;
    set_cloexec(&write_end).map_err(pipe_error)?;
    let stderr_end = write_end.try_clone().map_err(pipe_error)?;
    Ok((
        Box::new(std::fs::File::from(read_end)),
        Stdio::from(write_end),
        Stdio::from(stderr_end),
    ))
}

/// Keep the pipe out of unrelated children spawned concurrently.
#[cfg(unix)]
fn set_cloexec(fd: &OwnedFd) -> std::io::Result<()> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
        .map(|_| ())
        .map_err(std::io::Error::from)
}

// Without a shared pipe only stdout is captured.
#[cfg(not(unix))]
fn output_pipe(_command: &str) -> EngineResult<(Box<dyn Read + Send>, Stdio, Stdio)> {
    Ok((Box::new(std::io::empty()), Stdio::piped(), Stdio::null()))
}
