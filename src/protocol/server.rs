use std::{
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::{
    config::{PoolKind, ServerConfig},
    storage::{FileStore, StorageError},
};

use super::{
    Dispatcher,
    pool::{ConnectionPool, PoolError, PoolStats, ThreadConnectionPool},
    thread::ThreadPool,
};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("server IO error: {0}")]
    Io(#[from] io::Error),
}

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);
const WAKE_TIMEOUT: Duration = Duration::from_millis(500);

/// Accepts connections and hands them to a bounded [`ConnectionPool`].
pub struct FileServer {
    listener: TcpListener,
    address: SocketAddr,
    pool: Box<dyn ConnectionPool>,
    running: Arc<AtomicBool>,
}

impl FileServer {
    /// Open the store, start the pool and bind the listening socket.
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let store = FileStore::open(&config.root)?;
        let (pool, workers) = build_pool(&config, store)?;

        let listener = TcpListener::bind(config.address)?;
        let address = listener.local_addr()?;
        info!("listening at {address} with {workers} {} workers", config.pool);

        Ok(Self {
            listener,
            address,
            pool,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
            address: self.address,
        }
    }

    /// Accept until shut down, then drain the pool and return its statistics.
    pub fn listen(self) -> PoolStats {
        for stream in self.listener.incoming() {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            match stream {
                Ok(stream) => {
                    if let Ok(peer) = stream.peer_addr() {
                        debug!("accepted connection from {peer}");
                    }

                    match self.pool.submit(stream) {
                        Ok(()) => {}
                        Err(PoolError::ShutDown) => {
                            error!("worker pool is gone, no longer accepting");
                            break;
                        }
                        Err(e) => warn!("failed to hand off connection: {e}"),
                    }
                }
                Err(e) => {
                    warn!("broken connection: {e:?}");
                    thread::sleep(ACCEPT_RETRY_DELAY);
                }
            }
        }

        info!("listener at {} stopped, draining workers", self.address);
        let stats = self.pool.shutdown();
        info!("worker statistics: {stats}");
        stats
    }
}

/// Build the configured backend; also returns how many workers it runs.
fn build_pool(
    config: &ServerConfig,
    store: FileStore,
) -> Result<(Box<dyn ConnectionPool>, usize), ServerError> {
    let pool = ThreadPool::new(config.workers)?;
    let workers = pool.size();

    let pool: Box<dyn ConnectionPool> = match config.pool {
        PoolKind::Thread => Box::new(ThreadConnectionPool::new(
            pool,
            Dispatcher::new(store),
            config.session,
        )),
        #[cfg(unix)]
        PoolKind::Process => {
            use super::process::{ProcessConnectionPool, WorkerCommand};

            let program = match &config.worker_program {
                Some(program) => program.clone(),
                None => std::env::current_exe()?,
            };
            let command = WorkerCommand::for_root(program, store.root(), config.session);
            Box::new(ProcessConnectionPool::new(pool, command))
        }
        #[cfg(not(unix))]
        PoolKind::Process => return Err(PoolError::Unsupported.into()),
    };

    Ok((pool, workers))
}

/// Stops a running [`FileServer::listen`] loop from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    address: SocketAddr,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        // accept() only returns on a connection, so make one.
        let mut wake = self.address;
        if wake.ip().is_unspecified() {
            wake.set_ip(match wake.ip() {
                IpAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
                IpAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
            });
        }

        match TcpStream::connect_timeout(&wake, WAKE_TIMEOUT) {
            Ok(_) => debug!("woke listener at {wake}"),
            Err(e) => warn!("could not wake listener at {wake}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, io::Read, path::Path, thread::JoinHandle};

    use tempdir::TempDir;

    use super::*;
    use crate::{
        Command, FileClient,
        protocol::{Response, SessionConfig},
    };

    struct Running {
        address: SocketAddr,
        handle: ShutdownHandle,
        thread: JoinHandle<PoolStats>,
    }

    impl Running {
        fn stop(self) -> PoolStats {
            self.handle.shutdown();
            self.thread.join().unwrap()
        }
    }

    fn start(root: &Path, workers: usize, session: SessionConfig) -> Running {
        let config = ServerConfig {
            address: "127.0.0.1:0".parse().unwrap(),
            root: root.to_path_buf(),
            workers,
            session,
            ..Default::default()
        };

        let server = FileServer::bind(config).unwrap();
        let address = server.local_addr();
        let handle = server.shutdown_handle();
        let thread = thread::spawn(move || server.listen());

        Running {
            address,
            handle,
            thread,
        }
    }

    #[test]
    fn server_bind_rejects_bad_config() {
        let temp = TempDir::new("config").unwrap();
        let config = ServerConfig {
            address: "127.0.0.1:0".parse().unwrap(),
            root: temp.path().to_path_buf(),
            workers: 0,
            ..Default::default()
        };

        assert!(matches!(FileServer::bind(config), Err(ServerError::Config(_))));
    }

    #[test]
    fn server_full_session() {
        let temp = TempDir::new("session").unwrap();
        let server = start(temp.path(), 2, SessionConfig::default());

        let mut client = FileClient::connect(server.address).unwrap();
        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();

        client.upload("big.bin", &payload).unwrap();
        assert_eq!(client.get("big.bin").unwrap(), payload);
        assert_eq!(client.list().unwrap(), vec!["big.bin".to_string()]);
        client.delete("big.bin").unwrap();
        assert!(client.delete("big.bin").is_err());
        drop(client);

        let stats = server.stop();
        assert_eq!(stats.processed, 1);
    }

    #[test]
    fn server_connection_survives_errors() {
        let temp = TempDir::new("errors").unwrap();
        let server = start(temp.path(), 1, SessionConfig::default());

        let mut client = FileClient::connect(server.address).unwrap();
        for message in ["", "GET", "FOO bar", "GET ../secret.txt"] {
            let resp = client.send(message).unwrap();
            assert!(!resp.is_ok(), "{message:?} answered {resp:?}");
        }

        let resp = client.request(&Command::upload("a.txt", b"a")).unwrap();
        assert!(resp.is_ok());
        drop(client);

        let stats = server.stop();
        assert_eq!(stats.failed, 1);
        assert!(!temp.path().parent().unwrap().join("secret.txt").exists());
    }

    #[test]
    fn server_concurrent_uploads() {
        const CLIENTS: usize = 16;
        let temp = TempDir::new("concurrent").unwrap();
        let server = start(temp.path(), 4, SessionConfig::default());
        let address = server.address;

        let uploads: Vec<_> = (0..CLIENTS)
            .map(|i| {
                thread::spawn(move || {
                    let mut client = FileClient::connect(address).unwrap();
                    client
                        .upload(&format!("file-{i}.bin"), &vec![i as u8; 64 * 1024])
                        .is_ok()
                })
            })
            .collect();

        for upload in uploads {
            assert!(upload.join().unwrap());
        }

        let mut client = FileClient::connect(address).unwrap();
        let names: HashSet<String> = client.list().unwrap().into_iter().collect();
        let expected: HashSet<String> = (0..CLIENTS).map(|i| format!("file-{i}.bin")).collect();
        assert_eq!(names, expected);
        drop(client);

        let stats = server.stop();
        assert_eq!(stats.processed, CLIENTS + 1);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn server_pool_applies_backpressure() {
        let temp = TempDir::new("backpressure").unwrap();
        let server = start(temp.path(), 1, SessionConfig::default());

        let mut first = FileClient::connect(server.address).unwrap();
        first.list().unwrap();

        let mut second = FileClient::connect(server.address).unwrap();
        second.set_timeout(Some(Duration::from_millis(300))).unwrap();
        assert!(second.list().is_err());

        drop(first);
        second.set_timeout(None).unwrap();
        assert_eq!(second.read_response().unwrap(), Response::listing(vec![]));
        drop(second);

        server.stop();
    }

    #[test]
    fn server_idle_timeout_closes_connection() {
        let temp = TempDir::new("idle").unwrap();
        let session = SessionConfig {
            idle_timeout: Some(Duration::from_millis(200)),
            ..Default::default()
        };
        let server = start(temp.path(), 1, session);

        let mut stream = TcpStream::connect(server.address).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);

        let stats = server.stop();
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn server_rejects_invalid_utf8_then_closes() {
        let temp = TempDir::new("utf8").unwrap();
        let server = start(temp.path(), 1, SessionConfig::default());

        let mut client = FileClient::connect(server.address).unwrap();
        client.send_bytes(b"\xc3\x28\r\n\r\n").unwrap();
        assert_eq!(
            client.read_response().unwrap(),
            Response::error("invalid (non-UTF-8) data received")
        );
        assert!(client.list().is_err());

        server.stop();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let temp = TempDir::new("shutdown").unwrap();
        let server = start(temp.path(), 1, SessionConfig::default());

        server.handle.shutdown();
        let stats = server.stop();
        assert_eq!(stats, PoolStats::default());
    }
}
