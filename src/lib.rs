pub mod cli;
pub mod client;
pub mod command;
pub mod config;
pub mod protocol;
pub mod storage;

pub use client::{ClientError, FileClient};
pub use command::{Command, CommandError};
pub use config::{PoolKind, ServerConfig};
pub use storage::{FileStore, StorageError};
