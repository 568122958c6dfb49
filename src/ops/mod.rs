//! Command handlers (spec.md §4.G "Upload/download state machines").
//!
//! Each submodule drives one command's state machine: parse already
//! done by [`crate::protocol`], here we pick a store path, build a
//! [`crate::context::FileContext`] with the right hooks, and push it
//! through the [`crate::dio::Dispatcher`] one chunk or one shot at a
//! time. Async the whole way; the blocking syscalls live in
//! `crate::dio::worker` on dedicated threads.

pub mod append;
pub mod delete;
pub mod download;
pub mod metadata_ops;
pub mod modify;
pub mod query;
pub mod truncate;
pub mod upload;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::StorageConfig;
use crate::dio::Dispatcher;
use crate::error::Result;
use crate::fileid::DecodedFileId;
use crate::path_registry::{PathRegistry, StorePath};
use crate::stats::Stats;
use crate::trunk::TrunkAllocator;

/// Everything a command handler needs, built once in `lib.rs` and
/// shared (via `Arc`) across every connection.
pub struct ServerState {
    pub config: Arc<StorageConfig>,
    pub registry: Arc<PathRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub allocators: Vec<Option<Arc<TrunkAllocator>>>,
    pub stats: Arc<Stats>,
    pub server_ip: u32,
}

impl ServerState {
    /// Brings up the registry, per-path trunk allocators (when
    /// enabled), and the DIO dispatcher from a validated config
    /// (spec.md §4.A/§4.C/§4.F startup sequencing).
    pub fn init(config: StorageConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let registry = Arc::new(PathRegistry::init(&config)?);
        let stats = Arc::new(Stats::default());

        let allocators: Vec<Option<Arc<TrunkAllocator>>> = if config.trunk_enabled {
            registry
                .paths()
                .iter()
                .map(|path| {
                    TrunkAllocator::open(
                        path.data_root.clone(),
                        path.subdir_count(),
                        config.trunk_file_size,
                        config.trunk_min_slot_size,
                    )
                    .map(Arc::new)
                    .map(Some)
                })
                .collect::<Result<_>>()?
        } else {
            registry.paths().iter().map(|_| None).collect()
        };

        let dispatcher = Arc::new(Dispatcher::start(&config, Arc::clone(&registry), &allocators, Arc::clone(&stats)));
        let server_ip = local_source_ip();

        Ok(Self { config, registry, dispatcher, allocators, stats, server_ip })
    }

    pub fn allocator_for(&self, path_index: usize) -> Option<Arc<TrunkAllocator>> {
        self.allocators.get(path_index).cloned().flatten()
    }
}

pub fn now_unix() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as u32
}

/// Per-request randomness for the file-ID salt field and subdirectory
/// placement (spec.md §3 "File ID... 4-byte random/nameserver salt").
/// No RNG crate is in the dependency stack, so this combines the
/// low bits of wall-clock time with a process-wide counter -- unique
/// per request, not cryptographically random, which is all the salt
/// field needs to be.
static SALT_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn next_salt() -> u32 {
    let counter = SALT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().subsec_nanos();
    nanos ^ counter.wrapping_mul(0x9e37_79b9)
}

/// Resolves the source-IP field stamped into every file ID. Opens a
/// UDP socket and "connects" it without sending a packet, the
/// standard trick for asking the kernel which local address would be
/// used to reach the outside world -- no actual network I/O happens.
pub fn local_source_ip() -> u32 {
    use std::net::{IpAddr, SocketAddr, UdpSocket};

    let resolved = (|| -> std::io::Result<u32> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(SocketAddr::from(([8, 8, 8, 8], 80)))?;
        match socket.local_addr()?.ip() {
            IpAddr::V4(v4) => Ok(u32::from(v4)),
            IpAddr::V6(_) => Ok(0),
        }
    })();
    resolved.unwrap_or(0)
}

/// Resolves a client-supplied remote filename down to its store path,
/// content path, and decoded file-ID fields, per spec.md §4.G
/// "Download: parse file ID -> resolve store path, subdirectory, and
/// (for trunk) slot offset."
pub struct ResolvedFile<'a> {
    pub store_path: &'a StorePath,
    pub content_path: PathBuf,
    pub decoded: DecodedFileId,
}

/// Remote filenames are `{path_index}/{XX}/{YY}/{base64}{.ext}`
/// (spec.md §3 "File ID": `group_name + '/' + path_prefix + '/' + XX +
/// '/' + YY + '/' + base64_fields + ext`). The leading path-index
/// segment stands in for `group_name` + `path_prefix`, since there is
/// no tracker here to translate a group name to a path index.
pub fn resolve_filename<'a>(registry: &'a PathRegistry, remote_filename: &str) -> Result<ResolvedFile<'a>> {
    let mut parts = remote_filename.splitn(4, '/');
    let index_str = parts.next().unwrap_or("");
    let xx_str = parts.next();
    let yy_str = parts.next();
    let encoded = parts.next();

    let invalid = || crate::error::StorageError::InvalidArgument(format!("malformed remote filename: {remote_filename:?}"));

    let (xx_str, yy_str, encoded) = (xx_str.ok_or_else(invalid)?, yy_str.ok_or_else(invalid)?, encoded.ok_or_else(invalid)?);
    let path_index: usize = index_str.parse().map_err(|_| invalid())?;
    let xx: u16 = u16::from_str_radix(xx_str, 16).map_err(|_| invalid())?;
    let yy: u16 = u16::from_str_radix(yy_str, 16).map_err(|_| invalid())?;

    if path_index >= registry.count() {
        return Err(invalid());
    }
    let store_path = registry.path(path_index);
    let decoded = crate::fileid::decode(encoded)?;
    let content_path = store_path.subdir_path(xx, yy).join(encoded);

    Ok(ResolvedFile { store_path, content_path, decoded })
}

/// Formats the externally visible file ID for a just-stored file.
pub fn format_remote_filename(path_index: usize, xx: u16, yy: u16, encoded: &str) -> String {
    format!("{path_index}/{xx:02X}/{yy:02X}/{encoded}")
}

/// Sibling marker recording that a stored file was uploaded in
/// appender mode, so later append/modify/truncate can check
/// eligibility for non-trunk files (spec.md §4.G "Appender upload...
/// the file's type bit records appender", §8 "not_appender"). Trunk-
/// resident files instead carry this in their slot header's
/// `file_type` byte.
pub fn appender_marker_path(content_path: &std::path::Path) -> PathBuf {
    let mut name = content_path.as_os_str().to_os_string();
    name.push(".appender");
    PathBuf::from(name)
}

pub fn mark_as_appender(content_path: &std::path::Path) -> Result<()> {
    std::fs::write(appender_marker_path(content_path), b"")?;
    Ok(())
}

pub fn is_appender_file(content_path: &std::path::Path) -> bool {
    appender_marker_path(content_path).exists()
}

/// Checks append/modify/truncate eligibility for a resolved file,
/// returning [`crate::error::StorageError::NotAppender`] if it is not
/// an appender file (spec.md §8 error table "not_appender").
pub fn require_appender(resolved: &ResolvedFile, allocator: Option<&TrunkAllocator>) -> Result<()> {
    let is_appender = match resolved.decoded.trunk {
        Some(trunk) => {
            let allocator = allocator
                .ok_or_else(|| crate::error::StorageError::InvalidArgument("trunk storage not enabled".into()))?;
            let container = allocator.open_container(trunk.trunk_file_id)?;
            let header = crate::trunk::header::read_header(&container, trunk.slot_offset as u64)?;
            header.file_type & crate::trunk::header::file_type::APPENDER != 0
        }
        None => is_appender_file(&resolved.content_path),
    };
    if is_appender {
        Ok(())
    } else {
        Err(crate::error::StorageError::NotAppender)
    }
}
