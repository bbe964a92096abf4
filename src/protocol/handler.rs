//! Per-connection request loop.
//!
//! A [`ConnectionHandler`] owns one accepted stream and walks it through
//!
//! ```text
//!            ┌───────────────────────────────────────────┐
//!            ▼                                           │ queue empty
//!     AwaitingData ──frames──▶ HaveCompleteMessage ──▶ Responded
//!            │                        ▲                  │
//!            │ EOF / fault            └──queue not empty─┘
//!            ▼
//!         Closed  ◀── write fault / invalid frame
//! ```
//!
//! Each complete message is parsed, dispatched and answered before the next one is
//! looked at, so responses on a connection always follow request order. Nothing that
//! happens on the connection propagates out of [`ConnectionHandler::run`]; the outcome
//! is returned as a [`SessionReport`].
use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    net::TcpStream,
    time::Duration,
};

use log::{debug, info, trace, warn};
use thiserror::Error;

use super::{
    Dispatcher, ProtocolTransport, Response,
    codec::{CodecError, DEFAULT_MAX_FRAME_LEN, Frame},
    dispatch::preview,
    transport::TransportError,
};

/// Why a session ended abnormally.
#[derive(Debug, Error)]
pub enum ConnectionFault {
    #[error("protocol violation: {0}")]
    Protocol(#[from] CodecError),
    #[error("connection reset by peer")]
    Reset,
    #[error("broken pipe")]
    BrokenPipe,
    #[error("idle timeout expired")]
    IdleTimeout,
    #[error("connection IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for ConnectionFault {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                ConnectionFault::Reset
            }
            io::ErrorKind::BrokenPipe => ConnectionFault::BrokenPipe,
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ConnectionFault::IdleTimeout,
            _ => ConnectionFault::Io(err),
        }
    }
}

impl From<TransportError> for ConnectionFault {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(e) => e.into(),
            TransportError::Codec(e) => ConnectionFault::Protocol(e),
            TransportError::Closed => ConnectionFault::Reset,
            TransportError::Deserialize(e) => ConnectionFault::Io(io::Error::other(e)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    AwaitingData,
    HaveCompleteMessage,
    Responded,
    Closed,
}

/// Outcome of one connection.
#[derive(Debug, Default)]
pub struct SessionReport {
    pub requests: usize,
    pub errors: usize,
    pub fault: Option<ConnectionFault>,
}

impl SessionReport {
    /// The peer closed cleanly and every request was answered with `OK`.
    pub fn is_success(&self) -> bool {
        self.fault.is_none() && self.errors == 0
    }
}

/// Per-connection limits.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Close the connection after this long without data. `None` waits forever.
    pub idle_timeout: Option<Duration>,
    pub max_frame_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(600)),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

pub struct ConnectionHandler<'a, T: Read + Write> {
    transport: ProtocolTransport<T>,
    dispatcher: &'a Dispatcher,
    peer: String,
    frames: VecDeque<Frame>,
    report: SessionReport,
}

impl<'a, T: Read + Write> ConnectionHandler<'a, T> {
    pub fn new(
        stream: T,
        peer: impl Into<String>,
        dispatcher: &'a Dispatcher,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport: ProtocolTransport::with_max_frame_len(stream, config.max_frame_len),
            dispatcher,
            peer: peer.into(),
            frames: VecDeque::new(),
            report: SessionReport::default(),
        }
    }

    pub fn run(mut self) -> SessionReport {
        debug!("session started for {}", self.peer);

        let mut state = SessionState::AwaitingData;
        while state != SessionState::Closed {
            let next = self.step(state);
            trace!("{}: {state:?} -> {next:?}", self.peer);
            state = next;
        }

        match &self.report.fault {
            None => info!(
                "client {} disconnected after {} requests ({} errors)",
                self.peer, self.report.requests, self.report.errors
            ),
            Some(fault) => warn!(
                "closing connection with {} after {} requests: {fault}",
                self.peer, self.report.requests
            ),
        }
        self.report
    }

    fn step(&mut self, state: SessionState) -> SessionState {
        match state {
            SessionState::AwaitingData => match self.transport.read_frames() {
                Ok(Some(frames)) => {
                    self.frames.extend(frames);
                    if self.frames.is_empty() {
                        SessionState::AwaitingData
                    } else {
                        SessionState::HaveCompleteMessage
                    }
                }
                Ok(None) => SessionState::Closed,
                Err(e) => self.fail(e.into()),
            },
            SessionState::HaveCompleteMessage => match self.frames.pop_front() {
                Some(frame) => self.respond(frame),
                None => SessionState::AwaitingData,
            },
            SessionState::Responded if self.frames.is_empty() => SessionState::AwaitingData,
            SessionState::Responded => SessionState::HaveCompleteMessage,
            SessionState::Closed => SessionState::Closed,
        }
    }

    fn respond(&mut self, frame: Frame) -> SessionState {
        let (response, fault) = match frame {
            Frame::Message(message) => {
                debug!("{} sent: {}", self.peer, preview(&message));
                (self.dispatcher.handle(&message), None)
            }
            Frame::Invalid(e) => (Response::error(&e), Some(ConnectionFault::Protocol(e))),
        };

        self.report.requests += 1;
        if !response.is_ok() {
            self.report.errors += 1;
        }

        if let Err(e) = self.transport.write_response(&response) {
            return self.fail(e.into());
        }

        match fault {
            Some(fault) => self.fail(fault),
            None => SessionState::Responded,
        }
    }

    fn fail(&mut self, fault: ConnectionFault) -> SessionState {
        self.report.fault = Some(fault);
        SessionState::Closed
    }
}

/// Serve an accepted TCP connection to completion.
pub fn serve_connection(
    stream: TcpStream,
    dispatcher: &Dispatcher,
    config: SessionConfig,
) -> SessionReport {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown peer".to_string());

    if let Err(e) = stream.set_read_timeout(config.idle_timeout) {
        warn!("failed to set idle timeout for {peer}: {e}");
        return SessionReport {
            fault: Some(e.into()),
            ..Default::default()
        };
    }

    ConnectionHandler::new(stream, peer, dispatcher, config).run()
}
