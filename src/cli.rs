//! CLI utilities for fileserve.
//!
//! The utilities present in this module back the `fileserve_cli` binary, both for
//! one-shot subcommands and for the interactive prompt.
use std::{
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::{ClientError, FileClient};

/// Possible actions from a user.
#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum Action {
    /// List files stored on the server
    List,
    /// Download a file
    Get {
        name: String,
        /// Where to write the file; defaults to NAME in the current directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Upload a local file
    Upload {
        path: PathBuf,
        /// Name to store the file under; defaults to the file name of PATH
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Delete a file from the server
    Delete { name: String },
}

/// One line typed at the prompt.
#[derive(Debug, Parser)]
#[command(no_binary_name = true, disable_help_flag = true)]
struct Line {
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to access terminal: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Usage(#[from] clap::Error),
}

/// Prompt user for a valid action.
///
/// Blank lines are skipped. Returns `Ok(None)` on `.exit` or end of input.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Option<Action>, CliError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    loop {
        write!(&mut writer, "> ")?;
        writer.flush()?;

        s.clear();
        if reader.read_line(&mut s)? == 0 {
            return Ok(None);
        }

        match s.trim() {
            "" => continue,
            ".exit" => return Ok(None),
            s => return Ok(Some(Line::try_parse_from(s.split_whitespace())?.action)),
        }
    }
}

/// Run `action` against the server and describe the outcome.
pub fn execute(client: &mut FileClient, action: &Action) -> Result<String, ClientError> {
    match action {
        Action::List => Ok(client.list()?.join("\n")),
        Action::Get { name, output } => {
            let content = client.get(name)?;
            let path = output.clone().unwrap_or_else(|| PathBuf::from(name));

            fs::write(&path, &content)?;
            Ok(format!(
                "saved {name} to {} ({} bytes)",
                path.display(),
                content.len()
            ))
        }
        Action::Upload { path, name } => {
            let name = match name {
                Some(name) => name.clone(),
                None => file_name(path)?,
            };
            let content = fs::read(path)?;
            client.upload(&name, &content)
        }
        Action::Delete { name } => client.delete(name),
    }
}

fn file_name(path: &Path) -> Result<String, io::Error> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' has no usable file name", path.display()),
            )
        })
}
