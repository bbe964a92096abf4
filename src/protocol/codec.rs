//! Terminator-delimited message framing.
//!
//! Every message, request or response, ends with [`TERMINATOR`]. A TCP read may hold
//! half a message, several messages, or a terminator cut in two, so the codec keeps a
//! buffer across reads and only hands out frames once their terminator has arrived.
//!
//! ```text
//!  read #1            read #2              read #3
//! ┌──────────────┐   ┌──────────────────┐  ┌───────────┐
//! │ LIST\r\n\r\nGE│   │T a.txt\r\n        │  │\r\nDELETE..│
//! └──────────────┘   └──────────────────┘  └───────────┘
//!   └─ frame "LIST"     └──── frame "GET a.txt" ────┘
//! ```
use bytes::{Buf, BytesMut};
use log::trace;
use thiserror::Error;

use super::Response;

/// Byte sequence ending every message.
pub const TERMINATOR: &[u8; 4] = b"\r\n\r\n";

/// Default ceiling for a single buffered frame (256 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

const INITIAL_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid (non-UTF-8) data received")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("message exceeds {max} bytes")]
    FrameTooLarge { max: usize },

    #[error("failed to encode message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One unit produced by [`FrameCodec::feed`].
#[derive(Debug)]
pub enum Frame {
    /// A complete message, terminator stripped.
    Message(String),
    /// The stream violated the framing rules; nothing more will be produced.
    Invalid(CodecError),
}

/// Incremental framer for one connection.
#[derive(Debug)]
pub struct FrameCodec {
    buffer: BytesMut,
    // Bytes at the front of `buffer` already known not to start a terminator.
    scanned: usize,
    max_frame_len: usize,
    poisoned: bool,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            scanned: 0,
            max_frame_len,
            poisoned: false,
        }
    }

    /// Append `chunk` and return every frame it completes, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        if self.poisoned {
            return frames;
        }

        self.buffer.extend_from_slice(chunk);
        trace!("codec buffered {} bytes ({} total)", chunk.len(), self.buffer.len());

        while let Some(end) = self.find_terminator() {
            if end > self.max_frame_len {
                break;
            }

            let raw = self.buffer.split_to(end);
            self.buffer.advance(TERMINATOR.len());
            self.scanned = 0;

            match String::from_utf8(raw.to_vec()) {
                Ok(message) => frames.push(Frame::Message(message)),
                Err(e) => {
                    frames.push(Frame::Invalid(e.into()));
                    self.poison();
                    return frames;
                }
            }
        }

        if self.buffer.len() > self.max_frame_len {
            frames.push(Frame::Invalid(CodecError::FrameTooLarge {
                max: self.max_frame_len,
            }));
            self.poison();
        }

        frames
    }

    /// Whether a framing violation was seen; the connection must be closed.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn find_terminator(&mut self) -> Option<usize> {
        // Step back so a terminator split across two reads is still found.
        let start = self.scanned.saturating_sub(TERMINATOR.len() - 1);
        let found = self.buffer[start..]
            .windows(TERMINATOR.len())
            .position(|window| window == TERMINATOR)
            .map(|offset| start + offset);

        if found.is_none() {
            self.scanned = self.buffer.len();
        }
        found
    }

    fn poison(&mut self) {
        self.poisoned = true;
        self.buffer.clear();
        self.scanned = 0;
    }
}

/// Serialize `response` as JSON followed by the terminator.
pub fn encode_response(response: &Response) -> Result<Vec<u8>, CodecError> {
    let mut bytes = serde_json::to_vec(response)?;
    bytes.extend_from_slice(TERMINATOR);
    Ok(bytes)
}

/// Frame raw request text.
pub fn encode_message(message: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(message.len() + TERMINATOR.len());
    bytes.extend_from_slice(message.as_bytes());
    bytes.extend_from_slice(TERMINATOR);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(frames: Vec<Frame>) -> Vec<String> {
        frames
            .into_iter()
            .map(|frame| match frame {
                Frame::Message(m) => m,
                Frame::Invalid(e) => panic!("unexpected invalid frame: {e}"),
            })
            .collect()
    }

    #[test]
    fn codec_single_message() {
        let mut codec = FrameCodec::default();
        let frames = messages(codec.feed(b"LIST\r\n\r\n"));

        assert_eq!(frames, vec!["LIST"]);
        assert_eq!(codec.pending(), 0);
    }

    #[test]
    fn codec_waits_for_terminator() {
        let mut codec = FrameCodec::default();

        assert!(codec.feed(b"GET a.txt").is_empty());
        assert!(codec.feed(b"\r\n").is_empty());
        assert_eq!(messages(codec.feed(b"\r\n")), vec!["GET a.txt"]);
    }

    #[test]
    fn codec_byte_at_a_time() {
        let mut codec = FrameCodec::default();
        let input = b"UPLOAD a.txt aGVsbG8=\r\n\r\n";
        let mut frames = Vec::new();

        for byte in input {
            frames.extend(messages(codec.feed(&[*byte])));
        }

        assert_eq!(frames, vec!["UPLOAD a.txt aGVsbG8="]);
    }

    #[test]
    fn codec_every_terminator_split() {
        let input = b"DELETE a.txt\r\n\r\n";
        let terminator_start = input.len() - TERMINATOR.len();

        for split in terminator_start..input.len() {
            let mut codec = FrameCodec::default();
            let mut frames = messages(codec.feed(&input[..split]));
            frames.extend(messages(codec.feed(&input[split..])));

            assert_eq!(frames, vec!["DELETE a.txt"], "split at {split}");
        }
    }

    #[test]
    fn codec_pipelined_messages() {
        let mut codec = FrameCodec::default();
        let frames = messages(codec.feed(b"LIST\r\n\r\nGET a\r\n\r\nDELE"));

        assert_eq!(frames, vec!["LIST", "GET a"]);
        assert_eq!(codec.pending(), 4);

        assert_eq!(messages(codec.feed(b"TE a\r\n\r\n")), vec!["DELETE a"]);
    }

    #[test]
    fn codec_empty_message() {
        let mut codec = FrameCodec::default();
        assert_eq!(messages(codec.feed(b"\r\n\r\n")), vec![""]);
    }

    #[test]
    fn codec_lone_crlf_is_not_a_terminator() {
        let mut codec = FrameCodec::default();

        assert!(codec.feed(b"LIST\r\n").is_empty());
        assert!(codec.feed(b"\r").is_empty());
        assert_eq!(messages(codec.feed(b"\n")), vec!["LIST"]);
    }

    #[test]
    fn codec_multibyte_character_across_reads() {
        let mut codec = FrameCodec::default();
        let input = "GET café.txt\r\n\r\n".as_bytes();
        let split = "GET caf".len() + 1;

        assert!(codec.feed(&input[..split]).is_empty());
        assert_eq!(messages(codec.feed(&input[split..])), vec!["GET café.txt"]);
    }

    #[test]
    fn codec_invalid_utf8_poisons() {
        let mut codec = FrameCodec::default();
        let frames = codec.feed(b"LIST\r\n\r\n\xff\xfe\r\n\r\nLIST\r\n\r\n");

        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], Frame::Message(m) if m == "LIST"));
        assert!(matches!(&frames[1], Frame::Invalid(CodecError::InvalidUtf8(_))));
        assert!(codec.is_poisoned());
        assert!(codec.feed(b"LIST\r\n\r\n").is_empty());
    }

    #[test]
    fn codec_frame_too_large() {
        let mut codec = FrameCodec::new(8);
        let frames = codec.feed(b"UPLOAD a.txt AAAA");

        assert!(matches!(
            frames.as_slice(),
            [Frame::Invalid(CodecError::FrameTooLarge { max: 8 })]
        ));
        assert!(codec.is_poisoned());

        let mut codec = FrameCodec::new(8);
        let frames = codec.feed(b"LIST\r\n\r\nUPLOAD a.txt AAAA\r\n\r\n");
        assert!(matches!(
            frames.as_slice(),
            [Frame::Message(_), Frame::Invalid(CodecError::FrameTooLarge { .. })]
        ));
        if let Frame::Invalid(e) = &frames[1] {
            assert_eq!(e.to_string(), "message exceeds 8 bytes");
        }
    }

    #[test]
    fn encode_appends_terminator() {
        let bytes = encode_response(&Response::message("done")).unwrap();

        assert!(bytes.ends_with(TERMINATOR));
        assert_eq!(encode_message("LIST"), b"LIST\r\n\r\n");
    }

    #[test]
    fn encoded_response_is_one_frame() {
        let response = Response::file("a.bin", "AAEC\r\n");
        let mut codec = FrameCodec::default();

        let frames = messages(codec.feed(&encode_response(&response).unwrap()));
        assert_eq!(frames.len(), 1);
    }
}
