use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures while setting up or tearing down per-thread state.
///
/// The accessor itself never fails at runtime, an unsupported architecture is a build error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("a thread block is already installed on this thread")]
    AlreadyInstalled,
    #[error("failed to point the thread-local base register at the thread block")]
    Install(#[source] io::Error),
    #[error("failed to restore the thread-local base register")]
    Uninstall(#[source] io::Error),
    #[error("failed to allocate stack")]
    Stack(#[source] io::Error),
}
