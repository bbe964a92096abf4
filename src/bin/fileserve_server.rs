use std::{error::Error, net::SocketAddr, path::PathBuf, process::ExitCode};

use clap::Parser;
use fileserve::{
    PoolKind, ServerConfig,
    config::{DEFAULT_PORT, DEFAULT_WORKERS},
    protocol::{DEFAULT_MAX_FRAME_LEN, FileServer, SessionConfig},
};
use log::info;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to storage directory
    path: PathBuf,
    /// Listen for new connection at address
    #[arg(default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))]
    address: SocketAddr,
    /// Maximum number of connections served at once
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,
    /// Execution backend for connections
    #[arg(long, value_enum, default_value_t = PoolKind::Thread)]
    pool: PoolKind,
    /// Seconds a connection may stay silent before it is closed; 0 disables
    #[arg(long, default_value_t = 600)]
    idle_timeout: u64,
    /// Largest accepted message in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame: usize,
    /// Serve the single connection passed on stdin, then exit
    #[arg(long, hide = true)]
    serve_inherited: bool,
}

impl Cli {
    fn session(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout: ServerConfig::idle_timeout_secs(self.idle_timeout),
            max_frame_len: self.max_frame,
        }
    }
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    if cli.serve_inherited {
        return serve_inherited(&cli);
    }

    let config = ServerConfig {
        address: cli.address,
        root: cli.path.clone(),
        workers: cli.workers,
        pool: cli.pool,
        session: cli.session(),
        worker_program: None,
    };

    let server = FileServer::bind(config)?;
    let handle = server.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("received interrupt, shutting down");
        handle.shutdown();
    })?;

    let stats = server.listen();
    println!("{stats}");
    Ok(ExitCode::SUCCESS)
}

#[cfg(unix)]
fn serve_inherited(cli: &Cli) -> Result<ExitCode, Box<dyn Error>> {
    let report = fileserve::protocol::process::serve_inherited(&cli.path, cli.session())?;

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(not(unix))]
fn serve_inherited(_: &Cli) -> Result<ExitCode, Box<dyn Error>> {
    Err(fileserve::protocol::PoolError::Unsupported.into())
}
