//! Sandboxed on-disk file storage.
//!
//! All files live directly under a single root directory and are addressed by base
//! name only. Every operation goes straight to disk; nothing is cached.
//!
//! # Key Components
//!
//! - [`FileStore`]: LIST/GET/UPLOAD/DELETE against the sandbox root.
//! - [`path`]: filename resolution that refuses anything escaping the root.
//! - [`StorageError`]: failures surfaced to clients as `ERROR` responses.
pub mod path;
pub mod store;

pub use error::StorageError;
pub use store::{FileStore, StoredFile};

pub mod error {
    use std::io;

    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum StorageError {
        #[error("missing required parameter '{0}'")]
        MissingParameter(&'static str),

        #[error("invalid base64 content: {0}")]
        InvalidEncoding(#[from] base64::DecodeError),

        #[error("invalid filename '{0}': path escapes the storage root")]
        PathTraversal(String),

        #[error("file '{0}' not found")]
        NotFound(String),

        #[error("storage IO error: {0}")]
        Io(#[from] io::Error),
    }
}
