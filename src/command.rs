//! Request command module.
//!
//! This module defines the [`Command`] struct, which is the parsed form of a single
//! request message: a verb and up to two positional parameters. Commands are produced
//! by the server from incoming messages and built by clients before being written to
//! the wire.
//!
//! # Overview
//! A request on the wire looks like `VERB [PARAM1] [PARAM2]`, with fields separated by
//! runs of whitespace. Parsing is deliberately minimal:
//!
//! - The verb is trimmed and lowercased; it is *not* validated here. Resolving it to an
//!   operation is the job of the [`Dispatcher`](crate::protocol::Dispatcher).
//! - Parameters keep their original bytes and case. Filenames and base64 payloads are
//!   case-sensitive.
//! - At most two parameters are read; anything after them is ignored.
//!
//! # Example
//! ```rust
//! use fileserve::Command;
//!
//! let cmd: Command = "GET Report.PDF".try_into().unwrap();
//! assert_eq!(cmd.verb(), "get");
//! assert_eq!(cmd.params(), ["Report.PDF"]);
//! ```
//!
//! # See Also
//! - [`Dispatcher`](crate::protocol::Dispatcher): maps a command's verb to a store operation.
use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use thiserror::Error;

/// Maximum number of positional parameters read from a request.
pub const MAX_PARAMS: usize = 2;

/// List of possible errors when parsing a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
}

/// A parsed request: lowercase verb plus positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    params: Vec<String>,
}

impl Command {
    /// Build a command from a verb and parameters. The verb is normalized and
    /// parameters past [`MAX_PARAMS`] are dropped.
    pub fn new<V, I, P>(verb: V, params: I) -> Self
    where
        V: AsRef<str>,
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            verb: verb.as_ref().trim().to_lowercase(),
            params: params.into_iter().take(MAX_PARAMS).map(Into::into).collect(),
        }
    }

    pub fn list() -> Self {
        Self::new("list", Vec::<String>::new())
    }

    pub fn get(filename: impl Into<String>) -> Self {
        Self::new("get", [filename])
    }

    /// Upload command for raw `content`; the bytes are base64-encoded here.
    pub fn upload(filename: impl Into<String>, content: &[u8]) -> Self {
        Self::new("upload", [filename.into(), STANDARD.encode(content)])
    }

    pub fn delete(filename: impl Into<String>) -> Self {
        Self::new("delete", [filename])
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Parameter at `index`, treating an empty string the same as a missing one.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params
            .get(index)
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(message: &str) -> Result<Self, Self::Error> {
        let mut tokens = message.split_whitespace();
        let verb = tokens.next().ok_or(CommandError::Empty)?;

        Ok(Self::new(verb, tokens))
    }
}

/// Wire form of the command, with an uppercase verb.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb.to_uppercase())?;
        for param in &self.params {
            write!(f, " {param}")?;
        }
        Ok(())
    }
}
