//! Client side of the daemon protocol

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use crate::protocol::{decode_line, encode_line, ErrorKind, Request, Response};

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Cannot connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed reply: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("Daemon closed the connection")]
    Disconnected,

    #[error("{message}")]
    Remote { kind: ErrorKind, message: String },

    #[error("Unexpected reply: {0:?}")]
    Unexpected(Response),
}

/// Connection to a running daemon
pub struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    pub async fn connect(path: &Path) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| ClientError::Connect {
                path: path.to_path_buf(),
                source,
            })?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
        })
    }

    /// Send one request and wait for its reply; error replies become `Remote`
    pub async fn call(&mut self, request: &Request) -> Result<Response, ClientError> {
        let line = encode_line(request)?;
        self.writer.write_all(line.as_bytes()).await?;
        let reply = self.lines.next_line().await?.ok_or(ClientError::Disconnected)?;
        match decode_line::<Response>(&reply)? {
            Response::Error { kind, message } => Err(ClientError::Remote { kind, message }),
            response => Ok(response),
        }
    }

    pub async fn endpoints(&mut self) -> Result<Vec<String>, ClientError> {
        match self.call(&Request::List).await? {
            Response::Endpoints { endpoints } => Ok(endpoints),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    pub async fn read(&mut self, endpoint: &str) -> Result<String, ClientError> {
        let request = Request::Read {
            endpoint: endpoint.to_string(),
            len: crate::protocol::DEFAULT_READ_LEN,
        };
        match self.call(&request).await? {
            Response::Data { text } => Ok(text),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    pub async fn write(&mut self, endpoint: &str, data: &str) -> Result<usize, ClientError> {
        let request = Request::Write {
            endpoint: endpoint.to_string(),
            data: data.to_string(),
        };
        match self.call(&request).await? {
            Response::Written { len } => Ok(len),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    pub async fn control(&mut self, endpoint: &str, opcode: u32) -> Result<i32, ClientError> {
        let request = Request::Control {
            endpoint: endpoint.to_string(),
            opcode,
        };
        match self.call(&request).await? {
            Response::Value { value } => Ok(value),
            other => Err(ClientError::Unexpected(other)),
        }
    }

    pub async fn press(&mut self, times: u32, interval_ms: u64) -> Result<(), ClientError> {
        match self.call(&Request::Press { times, interval_ms }).await? {
            Response::Ok => Ok(()),
            other => Err(ClientError::Unexpected(other)),
        }
    }
}
