//! Boundary error types (SPEC_FULL.md §7 EXPANSION): CLI parsing, socket
//! bind, and thread-spawn failures use `thiserror` enums. Internal
//! table/dispatch outcomes stay plain returned enums (`UpdateOutcome`,
//! `InsertOutcome`, ...) — there is no exception-like unwind inside the
//! core, per spec.md §7.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid --addr value '{0}': {1}")]
    BadAddr(String, std::net::AddrParseError),
    #[error("invalid --affinity bitset '{0}'")]
    BadAffinity(String),
    #[error("--threads must be at least 1")]
    ZeroThreads,
    #[error("invalid --dispatch mode '{0}' (expected direct|delegate|combine)")]
    BadDispatch(String),
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: std::net::SocketAddr, source: std::io::Error },
    #[error("failed to spawn worker thread {id}: {source}")]
    ThreadSpawn { id: u32, source: std::io::Error },
    #[error("failed to initialise poll backend on worker {id}: {source}")]
    Backend { id: u32, source: std::io::Error },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
