#![allow(dead_code)]
//! Reads wire requests from a connection, parses them, and forwards
//! them to a [`crate::dispatch_task::DispatchTask`].
//!
//! Buffers each request body in memory before parsing it: the network
//! layer is an external collaborator here (spec.md §6), and framing
//! a multi-megabyte upload into the same `Vec` the DIO dispatcher
//! chunks through keeps this task a thin translation layer rather
//! than a second place that understands streaming state.

use std::io::Cursor;
use std::os::unix::io::{AsRawFd, RawFd};

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::message_types::{Request, RequestBody, RequestSender};
use crate::protocol::{
    AppendRequest, Command, DownloadRequest, FilenameOnlyRequest, Header, ModifyRequest,
    SetMetadataRequest, TruncateRequest, UploadPrefix, UploadSlaveRequest, HEADER_LEN,
};

pub struct ReadTask {
    readhalf: OwnedReadHalf,
    socket_fd: RawFd,
    request_send: RequestSender,
}

impl ReadTask {
    /// Creates new instance of [`ReadTask`]
    pub fn spawn(readhalf: OwnedReadHalf, request_send: RequestSender) -> JoinHandle<()> {
        let socket_fd = readhalf.as_ref().as_raw_fd();
        tokio::spawn(Self { readhalf, socket_fd, request_send }.run())
    }

    async fn run(mut self) {
        loop {
            match self.read_one().await {
                Ok(Some(request)) => {
                    if self.request_send.send(request).await.is_err() {
                        return;
                    }
                }
                Ok(None) => return,
                Err(err) => {
                    warn!(%err, "failed to read request, closing connection");
                    return;
                }
            }
        }
    }

    async fn read_one(&mut self) -> std::io::Result<Option<Request>> {
        let mut header_buf = [0u8; HEADER_LEN];
        if let Err(err) = self.readhalf.read_exact(&mut header_buf).await {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                return Ok(None);
            }
            return Err(err);
        }
        let header = Header::read_from(&mut Cursor::new(&header_buf[..]))
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()))?;

        let mut body_buf = vec![0u8; header.body_length as usize];
        self.readhalf.read_exact(&mut body_buf).await?;

        let body = parse_body(header.cmd, &body_buf)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()))?;
        debug!(cmd = ?header.cmd, body_length = header.body_length, "read request");
        Ok(Some(Request { cmd: header.cmd, socket_fd: self.socket_fd, body }))
    }
}

fn parse_body(cmd: Command, buf: &[u8]) -> Result<RequestBody> {
    let mut cursor = Cursor::new(buf);
    let body = match cmd {
        Command::Upload => {
            let prefix = UploadPrefix::parse(&mut cursor)?;
            let content = remaining(&cursor, buf);
            RequestBody::Upload { file_ext_name: prefix.file_ext_name, file_size: prefix.file_size, body: content }
        }
        Command::UploadAppender => {
            let prefix = UploadPrefix::parse(&mut cursor)?;
            let content = remaining(&cursor, buf);
            RequestBody::UploadAppender {
                file_ext_name: prefix.file_ext_name,
                file_size: prefix.file_size,
                body: content,
            }
        }
        Command::UploadSlave => {
            let req = UploadSlaveRequest::parse(&mut cursor)?;
            let content = remaining(&cursor, buf);
            RequestBody::UploadSlave {
                remote_filename: req.remote_filename,
                file_ext_name: req.file_ext_name,
                file_size: req.file_size,
                body: content,
            }
        }
        Command::Append => {
            let req = AppendRequest::parse(&mut cursor)?;
            let content = remaining(&cursor, buf);
            RequestBody::Append { filename: req.filename, body: content }
        }
        Command::Modify => {
            let req = ModifyRequest::parse(&mut cursor)?;
            let content = remaining(&cursor, buf);
            RequestBody::Modify { filename: req.filename, offset: req.offset, body: content }
        }
        Command::Truncate => {
            let req = TruncateRequest::parse(&mut cursor)?;
            RequestBody::Truncate { filename: req.filename, new_size: req.new_size }
        }
        Command::Download => {
            let req = DownloadRequest::parse(&mut cursor)?;
            RequestBody::Download { filename: req.filename, offset: req.offset, download_bytes: req.download_bytes }
        }
        Command::Delete => {
            let req = FilenameOnlyRequest::parse(&mut cursor)?;
            RequestBody::Delete { filename: req.filename }
        }
        Command::SetMetadata => {
            let req = SetMetadataRequest::parse(&mut cursor)?;
            RequestBody::SetMetadata { filename: req.filename, overwrite: req.overwrite, meta_bytes: req.meta_bytes }
        }
        Command::GetMetadata => {
            let req = FilenameOnlyRequest::parse(&mut cursor)?;
            RequestBody::GetMetadata { filename: req.filename }
        }
        Command::QueryFileInfo => {
            let req = FilenameOnlyRequest::parse(&mut cursor)?;
            RequestBody::QueryFileInfo { filename: req.filename }
        }
    };
    Ok(body)
}

fn remaining(cursor: &Cursor<&[u8]>, buf: &[u8]) -> Vec<u8> {
    buf[cursor.position() as usize..].to_vec()
}
