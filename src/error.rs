use std::os::fd::RawFd;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures while setting up or driving redirections.
///
/// Runtime logging failures never surface here; they degrade and are
/// reported through `tracing` instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to create pipe")]
    Pipe(#[source] std::io::Error),

    #[error("failed to redirect fd {fd}")]
    Redirect {
        fd: RawFd,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to register with the multiplexer")]
    Register(#[source] std::io::Error),

    #[error("failed to create the multiplexer")]
    Multiplexer(#[source] std::io::Error),

    #[error("failed to spawn the reactor thread")]
    Spawn(#[source] std::io::Error),

    #[error("reactor already stopped")]
    Stopped,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
