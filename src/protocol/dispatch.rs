//! Verb to file-store routing.
//!
//! Requests are routed through [`OPERATIONS`], a fixed table of verb names and
//! functions. Anything missing from the table is answered with
//! `request not recognized` and never reaches the store.
use log::{debug, warn};
use thiserror::Error;

use crate::{
    Command,
    storage::{FileStore, StorageError},
};

use super::Response;

/// A store operation reachable from the wire.
pub type Operation = fn(&FileStore, &Command) -> Result<Response, StorageError>;

/// Every verb the server answers to.
pub const OPERATIONS: &[(&str, Operation)] = &[
    ("list", list),
    ("get", get),
    ("upload", upload),
    ("delete", delete),
];

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("request not recognized")]
    UnknownVerb(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Routes commands to a [`FileStore`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: FileStore,
}

impl Dispatcher {
    pub fn new(store: FileStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Parse `message` and dispatch it. Parse failures become `ERROR` responses.
    pub fn handle(&self, message: &str) -> Response {
        match Command::try_from(message) {
            Ok(command) => self.dispatch(&command),
            Err(e) => {
                warn!("rejected request: {e}");
                Response::error(e)
            }
        }
    }

    pub fn dispatch(&self, command: &Command) -> Response {
        match self.execute(command) {
            Ok(response) => response,
            Err(e) => {
                warn!("'{}' failed: {e}", command.verb());
                Response::error(e)
            }
        }
    }

    fn execute(&self, command: &Command) -> Result<Response, DispatchError> {
        let (_, operation) = OPERATIONS
            .iter()
            .find(|(verb, _)| *verb == command.verb())
            .ok_or_else(|| DispatchError::UnknownVerb(command.verb().to_string()))?;

        debug!(
            "dispatching '{}' [{}]",
            command.verb(),
            preview(command.params().first().map(String::as_str).unwrap_or(""))
        );
        Ok(operation(&self.store, command)?)
    }
}

fn filename(command: &Command) -> Result<&str, StorageError> {
    command
        .param(0)
        .ok_or(StorageError::MissingParameter("filename"))
}

fn list(store: &FileStore, _: &Command) -> Result<Response, StorageError> {
    Ok(Response::listing(store.list()?))
}

fn get(store: &FileStore, command: &Command) -> Result<Response, StorageError> {
    let file = store.get(filename(command)?)?;
    Ok(Response::file(file.name, file.content))
}

fn upload(store: &FileStore, command: &Command) -> Result<Response, StorageError> {
    let name = filename(command)?;
    let content = command
        .params()
        .get(1)
        .ok_or(StorageError::MissingParameter("content"))?;

    store.upload(name, content)?;
    Ok(Response::message(format!("File {name} uploaded successfully.")))
}

fn delete(store: &FileStore, command: &Command) -> Result<Response, StorageError> {
    let name = filename(command)?;

    store.delete(name)?;
    Ok(Response::message(format!("File {name} deleted successfully.")))
}

/// Shorten a parameter for logging; upload payloads can be megabytes.
pub(crate) fn preview(text: &str) -> String {
    const LIMIT: usize = 50;

    match text.char_indices().nth(LIMIT) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
