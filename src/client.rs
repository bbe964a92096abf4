//! Blocking client for the file server.
use std::{
    io,
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use base64::{Engine, engine::general_purpose::STANDARD};
use log::debug;
use thiserror::Error;

use crate::{
    Command,
    protocol::{Payload, ProtocolTransport, Response, TransportError},
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("client IO error: {0}")]
    Io(#[from] io::Error),
    #[error("server error: {0}")]
    Server(String),
    #[error("unexpected response: {0:?}")]
    UnexpectedResponse(Response),
    #[error("server sent invalid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

pub struct FileClient {
    transport: ProtocolTransport<TcpStream>,
}

impl FileClient {
    pub fn connect(address: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(address)?;
        debug!("connected to {}", stream.peer_addr()?);

        Ok(Self {
            transport: ProtocolTransport::new(stream),
        })
    }

    /// Read timeout for responses; `None` blocks forever.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<(), ClientError> {
        self.transport.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    /// Send one command and wait for its response, `ERROR` included.
    pub fn request(&mut self, command: &Command) -> Result<Response, ClientError> {
        self.transport.write_command(command)?;
        self.read_response()
    }

    /// Send arbitrary text as one request.
    pub fn send(&mut self, message: &str) -> Result<Response, ClientError> {
        self.transport.write_message(message)?;
        self.read_response()
    }

    /// Write raw bytes, framing included. Pair with [`FileClient::read_response`].
    pub fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        Ok(self.transport.write_bytes(bytes)?)
    }

    pub fn read_response(&mut self) -> Result<Response, ClientError> {
        Ok(self.transport.read_response()?)
    }

    pub fn list(&mut self) -> Result<Vec<String>, ClientError> {
        match self.ok(&Command::list())? {
            Payload::Listing { data } => Ok(data),
            other => Err(unexpected(other)),
        }
    }

    /// Download `name` and decode its content.
    pub fn get(&mut self, name: &str) -> Result<Vec<u8>, ClientError> {
        match self.ok(&Command::get(name))? {
            Payload::File { content, .. } => Ok(STANDARD.decode(content)?),
            other => Err(unexpected(other)),
        }
    }

    /// Upload `content` as `name`, returning the server's confirmation.
    pub fn upload(&mut self, name: &str, content: &[u8]) -> Result<String, ClientError> {
        self.message(&Command::upload(name, content))
    }

    pub fn delete(&mut self, name: &str) -> Result<String, ClientError> {
        self.message(&Command::delete(name))
    }

    fn message(&mut self, command: &Command) -> Result<String, ClientError> {
        match self.ok(command)? {
            Payload::Message { data } => Ok(data),
            other => Err(unexpected(other)),
        }
    }

    fn ok(&mut self, command: &Command) -> Result<Payload, ClientError> {
        match self.request(command)? {
            Response::Ok(payload) => Ok(payload),
            Response::Err { data } => Err(ClientError::Server(data)),
        }
    }
}

fn unexpected(payload: Payload) -> ClientError {
    ClientError::UnexpectedResponse(Response::Ok(payload))
}
