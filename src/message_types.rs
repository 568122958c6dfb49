#![allow(dead_code)]
//! Messages passed between [`crate::read_task::ReadTask`],
//! [`crate::dispatch_task::DispatchTask`], and
//! [`crate::stream_writer::StreamWriter`] (spec.md §6 "wire protocol").

use std::os::unix::io::RawFd;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::Receiver;

use crate::error::StorageError;
use crate::ops::query::FileInfo;
use crate::protocol::Command;

/// A fully-parsed request body, tagged by the command it arrived as.
pub enum RequestBody {
    Upload { file_ext_name: String, file_size: u64, body: Vec<u8> },
    UploadAppender { file_ext_name: String, file_size: u64, body: Vec<u8> },
    UploadSlave { remote_filename: String, file_ext_name: String, file_size: u64, body: Vec<u8> },
    Append { filename: String, body: Vec<u8> },
    Modify { filename: String, offset: u64, body: Vec<u8> },
    Truncate { filename: String, new_size: u64 },
    Download { filename: String, offset: u64, download_bytes: u64 },
    Delete { filename: String },
    SetMetadata { filename: String, overwrite: bool, meta_bytes: Vec<u8> },
    GetMetadata { filename: String },
    QueryFileInfo { filename: String },
}

/// One request read off the wire. `socket_fd` rides along for DIO
/// thread-affinity hashing (spec.md §4.F).
pub struct Request {
    pub cmd: Command,
    pub socket_fd: RawFd,
    pub body: RequestBody,
}

/// What a handler hands back to the stream writer on success.
pub enum ReplyBody {
    Empty,
    Filename(String),
    Content(Vec<u8>),
    Metadata(Vec<u8>),
    FileInfo(FileInfo),
}

/// A dispatched request's outcome. `Err` carries the status byte the
/// client sees; per spec.md §6 "failure returns the non-zero status
/// byte in the response header with no body".
pub struct Reply {
    pub result: Result<ReplyBody, StorageError>,
}

/// Sender half of the request channel ([`ReadTask`] -> [`DispatchTask`]).
///
/// [`ReadTask`]: crate::read_task::ReadTask
/// [`DispatchTask`]: crate::dispatch_task::DispatchTask
pub struct RequestSender {
    sender: mpsc::Sender<Request>,
}

impl RequestSender {
    pub async fn send(&self, request: Request) -> Result<(), SendError<Request>> {
        self.sender.send(request).await
    }
}

/// Receiver half of the request channel.
pub struct RequestRecv {
    recv: Receiver<Request>,
}

impl RequestRecv {
    pub async fn recv(&mut self) -> Option<Request> {
        self.recv.recv().await
    }
}

/// Sender half of the reply channel ([`DispatchTask`] -> [`StreamWriter`]).
///
/// [`DispatchTask`]: crate::dispatch_task::DispatchTask
/// [`StreamWriter`]: crate::stream_writer::StreamWriter
pub struct ReplySender {
    sender: mpsc::Sender<Reply>,
}

impl ReplySender {
    pub async fn send(&self, reply: Reply) -> Result<(), SendError<Reply>> {
        self.sender.send(reply).await
    }
}

/// Receiver half of the reply channel.
pub struct ReplyRecv {
    recv: Receiver<Reply>,
}

impl ReplyRecv {
    pub async fn recv(&mut self) -> Option<Reply> {
        self.recv.recv().await
    }
}

/// Creates a new channel for parsed requests.
pub fn create_request_channel(size: usize) -> (RequestSender, RequestRecv) {
    let (sender, recv) = mpsc::channel::<Request>(size);
    (RequestSender { sender }, RequestRecv { recv })
}

/// Creates a new channel for dispatched replies.
pub fn create_reply_channel(size: usize) -> (ReplySender, ReplyRecv) {
    let (sender, recv) = mpsc::channel::<Reply>(size);
    (ReplySender { sender }, ReplyRecv { recv })
}
