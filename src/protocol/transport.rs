use std::{
    collections::VecDeque,
    io::{self, Read, Write},
};

use log::trace;
use thiserror::Error;

use crate::Command;

use super::{
    Response,
    codec::{CodecError, DEFAULT_MAX_FRAME_LEN, Frame, FrameCodec, encode_message, encode_response},
};

const READ_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to frame message: {0}")]
    Codec(#[from] CodecError),
    #[error("failed to decode response: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error("connection closed by peer")]
    Closed,
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
}

/// A byte stream paired with a [`FrameCodec`].
pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
    codec: FrameCodec,
    pending: VecDeque<Frame>,
    chunk: Box<[u8]>,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self::with_max_frame_len(stream, DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(stream: T, max_frame_len: usize) -> Self {
        Self {
            stream,
            codec: FrameCodec::new(max_frame_len),
            pending: VecDeque::new(),
            chunk: vec![0; READ_CHUNK_SIZE].into_boxed_slice(),
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    /// Perform one read and return the frames it completed, possibly none.
    /// `Ok(None)` means the peer shut down its side of the connection.
    pub fn read_frames(&mut self) -> Result<Option<Vec<Frame>>, TransportError> {
        let n = loop {
            match self.stream.read(&mut self.chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };

        if n == 0 {
            return Ok(None);
        }

        trace!("read {n} bytes");
        Ok(Some(self.codec.feed(&self.chunk[..n])))
    }

    pub fn write_response(&mut self, resp: &Response) -> Result<(), TransportError> {
        self.stream.write_all(&encode_response(resp)?)?;
        self.stream.flush()?;
        Ok(())
    }

    pub fn write_command(&mut self, command: &Command) -> Result<(), TransportError> {
        self.write_message(&command.to_string())
    }

    /// Send `message` as one frame, without checking it parses as a command.
    pub fn write_message(&mut self, message: &str) -> Result<(), TransportError> {
        self.write_bytes(&encode_message(message))
    }

    /// Send bytes as-is. The caller is responsible for framing.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Block until one complete response frame arrives and decode it.
    pub fn read_response(&mut self) -> Result<Response, TransportError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return match frame {
                    Frame::Message(text) => Ok(serde_json::from_str(&text)?),
                    Frame::Invalid(e) => Err(e.into()),
                };
            }

            match self.read_frames()? {
                Some(frames) => self.pending.extend(frames),
                None => return Err(TransportError::Closed),
            }
        }
    }
}
