//! Client-server communication protocol.
//!
//! This module defines how file commands travel between clients and the server, and
//! how the server executes them: framing, request dispatch, the per-connection state
//! machine and the bounded pools that run sessions.
//!
//! # Overview
//!
//! A connection carries a sequence of plain-text requests such as `GET report.pdf`.
//! The server answers each one, in order, with a JSON object. Connections stay open
//! until the client closes them, a protocol violation occurs, or the idle timeout
//! expires.
//!
//! # Key Components
//!
//! - [`FrameCodec`]: Splits a byte stream into [`TERMINATOR`]-delimited messages.
//! - [`Dispatcher`]: Maps a parsed command to its file operation and builds the [`Response`].
//! - [`ProtocolTransport`]: A stream paired with a codec, used by both server and client.
//! - [`FileServer`]: Listener feeding accepted connections to a [`ConnectionPool`].
//!
//! # Wire Format
//!
//! Both directions use the same framing:
//!
//! - A message is UTF-8 text followed by `\r\n\r\n`.
//! - Requests are a verb and up to two whitespace-separated parameters.
//! - Responses are JSON objects carrying a `status` of `OK` or `ERROR`.
//!
//! ```text
//! > UPLOAD notes.txt aGVsbG8=\r\n\r\n
//! < {"status":"OK","data":"File notes.txt uploaded successfully."}\r\n\r\n
//! ```
//!
//! # See Also
//!
//! - [`storage`](crate::storage): Sandboxed directory the operations act on.
mod codec;
mod dispatch;
mod handler;
mod pool;
#[cfg(unix)]
pub mod process;
mod response;
mod server;
mod thread;
mod transport;

pub use codec::{CodecError, DEFAULT_MAX_FRAME_LEN, Frame, FrameCodec, TERMINATOR};
pub use dispatch::{DispatchError, Dispatcher, OPERATIONS};
pub use handler::{ConnectionFault, ConnectionHandler, SessionConfig, SessionReport};
pub use pool::{ConnectionPool, PoolError, PoolStats, ThreadConnectionPool};
pub use response::{Payload, Response};
pub use server::{FileServer, ServerError, ShutdownHandle};
pub use thread::ThreadPool;
pub use transport::{ProtocolTransport, TransportError};
