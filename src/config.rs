//! Server configuration.
//!
//! [`ServerConfig`] is filled in by the `fileserve_server` binary from its command
//! line; tests build it directly.
use std::{
    fmt,
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use clap::ValueEnum;

use crate::protocol::{ServerError, SessionConfig};

pub const DEFAULT_PORT: u16 = 6677;
pub const DEFAULT_WORKERS: usize = 8;

/// Execution backend for accepted connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum PoolKind {
    /// One pooled thread per connection.
    #[default]
    Thread,
    /// One worker process per connection (unix only).
    Process,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Thread => write!(f, "thread"),
            PoolKind::Process => write!(f, "process"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: SocketAddr,
    /// Sandbox root holding every stored file.
    pub root: PathBuf,
    /// Maximum number of connections served at once.
    pub workers: usize,
    pub pool: PoolKind,
    pub session: SessionConfig,
    /// Binary launched by the process backend; the running executable if unset.
    pub worker_program: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            root: PathBuf::from("files"),
            workers: DEFAULT_WORKERS,
            pool: PoolKind::default(),
            session: SessionConfig::default(),
            worker_program: None,
        }
    }
}

impl ServerConfig {
    pub fn new(address: SocketAddr, root: impl Into<PathBuf>) -> Self {
        Self {
            address,
            root: root.into(),
            ..Default::default()
        }
    }

    /// Idle timeout from whole seconds, where 0 disables it.
    pub fn idle_timeout_secs(secs: u64) -> Option<Duration> {
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.workers == 0 {
            return Err(ServerError::Config("worker count must be at least 1".into()));
        }
        if self.session.max_frame_len == 0 {
            return Err(ServerError::Config("max frame length must be positive".into()));
        }
        if self.session.idle_timeout == Some(Duration::ZERO) {
            return Err(ServerError::Config("idle timeout must be positive".into()));
        }
        Ok(())
    }
}
