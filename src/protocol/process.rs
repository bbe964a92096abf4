//! Process-isolated session execution (unix).
//!
//! The parent keeps a [`ThreadPool`] whose workers only supervise: for every accepted
//! connection a worker spawns the server binary in worker mode with the socket as the
//! child's stdin, then waits for the child to exit. The exit status is the session's
//! success flag. The child opens the store itself and shares no memory with the
//! parent.
//!
//! ```text
//!  parent                              child (fileserve_server --serve-inherited ...)
//!  accept() ─▶ worker-N ── spawn ───▶  stdin = socket ─▶ serve_inherited()
//!                 │                                           │
//!                 └──────── wait() ◀──── exit 0 / 1 ◀─────────┘
//! ```
use std::{
    ffi::OsString,
    io,
    net::TcpStream,
    os::fd::{AsFd, OwnedFd},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use log::{debug, error};

use crate::storage::FileStore;

use super::{
    Dispatcher,
    handler::{SessionConfig, SessionReport, serve_connection},
    pool::{ConnectionPool, PoolError, PoolStats},
    server::ServerError,
    thread::ThreadPool,
};

/// Flag putting the server binary into single-connection worker mode.
pub const SERVE_INHERITED_FLAG: &str = "--serve-inherited";

/// How to launch one worker process.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    /// Command line understood by the `fileserve_server` binary.
    pub fn for_root(program: impl Into<PathBuf>, root: &Path, session: SessionConfig) -> Self {
        // Whole seconds on the command line; 0 means no timeout.
        let idle_timeout = session
            .idle_timeout
            .map_or(0, |timeout| timeout.as_secs().max(1));
        let args = vec![
            OsString::from(SERVE_INHERITED_FLAG),
            OsString::from("--idle-timeout"),
            OsString::from(idle_timeout.to_string()),
            OsString::from("--max-frame"),
            OsString::from(session.max_frame_len.to_string()),
            root.as_os_str().to_owned(),
        ];

        Self {
            program: program.into(),
            args,
        }
    }

    fn run(&self, stream: TcpStream) -> bool {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown peer".to_string());

        // The Command, and with it the parent's copy of the socket, is dropped as soon
        // as the child is spawned.
        let spawned = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::from(OwnedFd::from(stream)))
            .stdout(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                error!("failed to spawn worker process for {peer}: {e}");
                return false;
            }
        };

        debug!("worker process {} serving {peer}", child.id());
        match child.wait() {
            Ok(status) => {
                debug!("worker process for {peer} exited with {status}");
                status.success()
            }
            Err(e) => {
                error!("failed to wait for worker process serving {peer}: {e}");
                false
            }
        }
    }
}

/// Serves each session in its own child process, at most `size` at a time.
pub struct ProcessConnectionPool {
    pool: ThreadPool,
    command: WorkerCommand,
}

impl ProcessConnectionPool {
    pub fn new(pool: ThreadPool, command: WorkerCommand) -> Self {
        Self { pool, command }
    }
}

impl ConnectionPool for ProcessConnectionPool {
    fn submit(&self, stream: TcpStream) -> Result<(), PoolError> {
        let command = self.command.clone();
        self.pool.execute(move || command.run(stream))
    }

    fn shutdown(self: Box<Self>) -> PoolStats {
        let this = *self;
        this.pool.shutdown()
    }
}

/// Worker-process side: serve the connection inherited on stdin.
pub fn serve_inherited(
    root: &Path,
    session: SessionConfig,
) -> Result<SessionReport, ServerError> {
    let fd = io::stdin().as_fd().try_clone_to_owned()?;
    let stream = TcpStream::from(fd);
    let dispatcher = Dispatcher::new(FileStore::open(root)?);

    Ok(serve_connection(stream, &dispatcher, session))
}
