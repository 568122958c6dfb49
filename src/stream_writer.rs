#![allow(dead_code)]
//! Writes [`crate::dispatch_task::DispatchTask`] results to a network
//! connection (spec.md §6: "failure returns the non-zero status byte
//! in the response header with no body").

use byteorder::{BigEndian, WriteBytesExt};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::message_types::{Reply, ReplyBody, ReplyRecv};
use crate::protocol::{ResponseHeader, HEADER_LEN};

pub struct StreamWriter {
    writehalf: OwnedWriteHalf,
    reply_recv: ReplyRecv,
}

impl StreamWriter {
    /// Creates new instance of [`StreamWriter`]
    pub fn spawn(writehalf: OwnedWriteHalf, reply_recv: ReplyRecv) -> JoinHandle<()> {
        tokio::spawn(Self { writehalf, reply_recv }.run())
    }

    async fn run(mut self) {
        loop {
            let Some(reply) = self.reply_recv.recv().await else {
                return;
            };
            let closes = matches!(&reply.result, Err(err) if err.closes_connection());
            if let Err(err) = self.write_one(reply).await {
                warn!(%err, "failed to write response, closing connection");
                return;
            }
            if closes {
                return;
            }
        }
    }

    async fn write_one(&mut self, reply: Reply) -> std::io::Result<()> {
        let (status, body) = match reply.result {
            Ok(body) => (0u8, encode_body(body)),
            Err(err) => (err.status_byte(), Vec::new()),
        };
        let header = ResponseHeader { body_length: body.len() as u64, status };
        let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
        header.write_to(&mut buf)?;
        buf.extend_from_slice(&body);
        self.writehalf.write_all(&buf).await
    }
}

fn encode_body(body: ReplyBody) -> Vec<u8> {
    match body {
        ReplyBody::Empty => Vec::new(),
        ReplyBody::Filename(name) => name.into_bytes(),
        ReplyBody::Content(bytes) => bytes,
        ReplyBody::Metadata(bytes) => bytes,
        ReplyBody::FileInfo(info) => {
            let mut buf = Vec::with_capacity(20);
            let _ = buf.write_u64::<BigEndian>(info.file_size);
            let _ = buf.write_u32::<BigEndian>(info.crc32);
            let _ = buf.write_u32::<BigEndian>(info.create_timestamp);
            let _ = buf.write_u32::<BigEndian>(info.source_ip);
            buf
        }
    }
}
