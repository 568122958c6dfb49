#![allow(dead_code)]
//! Dispatches parsed requests to the matching op handler and forwards
//! the result to the [`crate::stream_writer::StreamWriter`].

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::error;

use crate::message_types::{Reply, ReplyBody, Request, RequestBody, RequestRecv, ReplySender};
use crate::ops::{self, ServerState};

pub struct DispatchTask {
    state: Arc<ServerState>,
    request_recv: RequestRecv,
    reply_send: ReplySender,
}

impl DispatchTask {
    /// Creates new instance of [`DispatchTask`].
    pub fn spawn(state: Arc<ServerState>, request_recv: RequestRecv, reply_send: ReplySender) -> JoinHandle<()> {
        tokio::spawn(async move { Self { state, request_recv, reply_send }.run().await })
    }

    async fn run(mut self) {
        while let Some(request) = self.request_recv.recv().await {
            let reply = self.handle(request).await;
            if self.reply_send.send(reply).await.is_err() {
                return;
            }
        }
    }

    async fn handle(&self, request: Request) -> Reply {
        let state = &self.state;
        let socket_fd = request.socket_fd;
        let result = match request.body {
            RequestBody::Upload { file_ext_name, file_size, body } => ops::upload::handle(
                state,
                socket_fd,
                ops::upload::UploadMode::Normal,
                &file_ext_name,
                file_size,
                body,
            )
            .await
            .map(ReplyBody::Filename),
            RequestBody::UploadAppender { file_ext_name, file_size, body } => ops::upload::handle(
                state,
                socket_fd,
                ops::upload::UploadMode::Appender,
                &file_ext_name,
                file_size,
                body,
            )
            .await
            .map(ReplyBody::Filename),
            RequestBody::UploadSlave { remote_filename, file_ext_name, file_size, body } => ops::upload::handle(
                state,
                socket_fd,
                ops::upload::UploadMode::Slave { remote_filename },
                &file_ext_name,
                file_size,
                body,
            )
            .await
            .map(ReplyBody::Filename),
            RequestBody::Append { filename, body } => {
                ops::append::handle(state, socket_fd, &filename, body).await.map(|()| ReplyBody::Empty)
            }
            RequestBody::Modify { filename, offset, body } => {
                ops::modify::handle(state, socket_fd, &filename, offset, body).await.map(|()| ReplyBody::Empty)
            }
            RequestBody::Truncate { filename, new_size } => {
                ops::truncate::handle(state, socket_fd, &filename, new_size).await.map(|()| ReplyBody::Empty)
            }
            RequestBody::Download { filename, offset, download_bytes } => {
                ops::download::handle(state, socket_fd, &filename, offset, download_bytes)
                    .await
                    .map(|result| ReplyBody::Content(result.content))
            }
            RequestBody::Delete { filename } => {
                ops::delete::handle(state, socket_fd, &filename).await.map(|()| ReplyBody::Empty)
            }
            RequestBody::SetMetadata { filename, overwrite, meta_bytes } => {
                ops::metadata_ops::set_metadata(state, &filename, overwrite, &meta_bytes)
                    .await
                    .map(|()| ReplyBody::Empty)
            }
            RequestBody::GetMetadata { filename } => {
                ops::metadata_ops::get_metadata(state, &filename).await.map(ReplyBody::Metadata)
            }
            RequestBody::QueryFileInfo { filename } => {
                ops::query::handle(state, &filename).await.map(ReplyBody::FileInfo)
            }
        };

        if let Err(err) = &result {
            error!(%err, "request failed");
        }
        Reply { result }
    }
}
