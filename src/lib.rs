//! FastDFS storage server disk-I/O engine and trunk-file subsystem.
//!
//! Owns everything downstream of a parsed wire request: path
//! selection, the DIO thread pools, the trunk-file allocator, and the
//! upload/download/append/modify/truncate/delete/metadata state
//! machines. Process daemonization, config-file parsing, the tracker
//! protocol, and storage-to-storage replication are out of scope
//! (spec.md §1 "Non-goals") and live in the embedding binary.

pub mod cleanup;
pub mod config;
pub mod context;
pub mod crc;
mod dispatch_task;
pub mod dio;
pub mod error;
pub mod fileid;
pub mod hash;
pub mod message_types;
pub mod metadata;
pub mod ops;
pub mod path_registry;
pub mod protocol;
mod read_task;
pub mod stats;
mod stream_writer;
pub mod trunk;

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::info;

use crate::config::StorageConfig;
use crate::dispatch_task::DispatchTask;
use crate::error::Result;
use crate::message_types::{create_reply_channel, create_request_channel};
use crate::ops::ServerState;
use crate::read_task::ReadTask;
use crate::stream_writer::StreamWriter;

/// Builds a [`ServerState`] from a validated config. Exposed so the
/// embedding binary can build it once at startup and reuse it across
/// however many listeners it runs.
pub fn build_state(config: StorageConfig) -> Result<Arc<ServerState>> {
    Ok(Arc::new(ServerState::init(config)?))
}

/// Accepts connections forever, spawning the read/dispatch/write
/// task trio for each one (spec.md §6's framing lives in
/// [`read_task`]/[`stream_writer`]; command semantics live in [`ops`]).
pub async fn handle_forever(listener: TcpListener, state: Arc<ServerState>) -> std::io::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        socket.set_nodelay(true)?;
        info!(%peer, "accepted connection");
        process_socket(socket, Arc::clone(&state));
    }
}

fn process_socket(socket: TcpStream, state: Arc<ServerState>) {
    let (readhalf, writehalf) = socket.into_split();

    let (request_send, request_recv) = create_request_channel(1);
    let (reply_send, reply_recv) = create_reply_channel(1);

    ReadTask::spawn(readhalf, request_send);
    DispatchTask::spawn(state, request_recv, reply_send);
    StreamWriter::spawn(writehalf, reply_recv);
}
