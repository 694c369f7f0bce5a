use crate::model::ErrorKind;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Faults raised inside one attempt before or while the child is running.
///
/// These never cross the engine's public boundary; they are folded into an
/// [`Outcome`](crate::model::Outcome) by [`EngineError::kind`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("`{command}` was not found on PATH; install it and make sure it is on PATH")]
    CommandNotFound { command: String },

    #[error("no command to run: the argument vector is empty")]
    EmptyCommand,

    #[error("failed to create the output pipe for `{command}`")]
    Pipe {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn `{}` in {}: {source}", .program.display(), .cwd.display())]
    Spawn {
        program: PathBuf,
        cwd: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start the {name} thread")]
    WorkerSpawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CommandNotFound { .. } | Self::EmptyCommand => ErrorKind::CommandNotFound,
            Self::Pipe { .. } | Self::Spawn { .. } | Self::WorkerSpawn { .. } => {
                ErrorKind::SubprocessError
            }
        }
    }
}
