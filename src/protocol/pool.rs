//! Bounded connection execution.
//!
//! The listener hands every accepted connection to a [`ConnectionPool`]. Two backends
//! exist and are interchangeable from the protocol's point of view:
//!
//! - [`ThreadConnectionPool`] serves the session on a pooled worker thread.
//! - [`ProcessConnectionPool`](super::process::ProcessConnectionPool) (unix only) passes
//!   the socket to a freshly spawned worker process and waits for its exit status.
//!
//! Neither backend shares mutable state between sessions. Each session yields a
//! success flag, workers tally their own flags, and the tallies are summed into
//! [`PoolStats`] when the pool shuts down.
use std::{fmt, io, net::TcpStream, ops::AddAssign, sync::Arc};

use thiserror::Error;

use super::{
    Dispatcher,
    handler::{SessionConfig, serve_connection},
    thread::ThreadPool,
};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool size must be greater than zero")]
    EmptyPool,
    #[error("pool is shut down")]
    ShutDown,
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] io::Error),
    #[error("process pool is not supported on this platform")]
    Unsupported,
}

/// Aggregate outcome of every session a pool served.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl PoolStats {
    pub fn record(&mut self, success: bool) {
        self.processed += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

impl AddAssign for PoolStats {
    fn add_assign(&mut self, rhs: Self) {
        self.processed += rhs.processed;
        self.succeeded += rhs.succeeded;
        self.failed += rhs.failed;
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} connections processed, {} successful, {} failed",
            self.processed, self.succeeded, self.failed
        )
    }
}

/// Bounded executor for accepted connections.
pub trait ConnectionPool: Send {
    /// Hand over `stream`. Blocks while every execution unit is busy.
    fn submit(&self, stream: TcpStream) -> Result<(), PoolError>;

    /// Stop taking connections, let running sessions finish and report.
    fn shutdown(self: Box<Self>) -> PoolStats;
}

/// Serves sessions directly on pooled threads.
pub struct ThreadConnectionPool {
    pool: ThreadPool,
    dispatcher: Arc<Dispatcher>,
    session: SessionConfig,
}

impl ThreadConnectionPool {
    pub fn new(pool: ThreadPool, dispatcher: Dispatcher, session: SessionConfig) -> Self {
        Self {
            pool,
            dispatcher: Arc::new(dispatcher),
            session,
        }
    }
}

impl ConnectionPool for ThreadConnectionPool {
    fn submit(&self, stream: TcpStream) -> Result<(), PoolError> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let session = self.session;

        self.pool
            .execute(move || serve_connection(stream, &dispatcher, session).is_success())
    }

    fn shutdown(self: Box<Self>) -> PoolStats {
        let this = *self;
        this.pool.shutdown()
    }
}
