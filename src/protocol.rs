//! Wire protocol (spec.md §6 "Wire protocol (what the core consumes)").
//!
//! Every request arrives as a 10-byte header `{body_length:u64 BE,
//! cmd:u8, status:u8}` followed by `body_length` body bytes. Header
//! framing is the network layer's job; this module owns the command
//! set and the fixed-width body prefixes the core cares about.
//!
//! Command byte values are assigned locally by this crate and carry
//! no claim of wire compatibility with any particular FastDFS release.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};
use std::io::{self, Read, Write};

use crate::error::{Result, StorageError};

pub const HEADER_LEN: usize = 10;

/// Commands the core consumes (spec.md §6's command list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum Command {
    Upload = 1,
    UploadAppender = 2,
    UploadSlave = 3,
    Append = 4,
    Modify = 5,
    Truncate = 6,
    Download = 7,
    Delete = 8,
    SetMetadata = 9,
    GetMetadata = 10,
    QueryFileInfo = 11,
}

/// Parsed request header, before the body is read.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub body_length: u64,
    pub cmd: Command,
    pub status: u8,
}

impl Header {
    pub fn read_from(src: &mut impl Read) -> Result<Self> {
        let body_length = src.read_u64::<BigEndian>()?;
        let cmd_byte = src.read_u8()?;
        let status = src.read_u8()?;
        let cmd = Command::from_u8(cmd_byte)
            .ok_or_else(|| StorageError::InvalidArgument(format!("unknown command byte {cmd_byte}")))?;
        Ok(Self { body_length, cmd, status })
    }

    pub fn write_to(&self, dest: &mut impl Write) -> io::Result<()> {
        dest.write_u64::<BigEndian>(self.body_length)?;
        dest.write_u8(self.cmd.to_u8().expect("Command always fits in u8"))?;
        dest.write_u8(self.status)
    }
}

/// A response header plus its body; `status == 0` is success.
pub struct ResponseHeader {
    pub body_length: u64,
    pub status: u8,
}

impl ResponseHeader {
    pub fn write_to(&self, dest: &mut impl Write) -> io::Result<()> {
        dest.write_u64::<BigEndian>(self.body_length)?;
        // The cmd byte is unused in responses; the original request's
        // cmd already told the client what it asked for.
        dest.write_u8(0)?;
        dest.write_u8(self.status)
    }
}

fn read_u16_len_str(src: &mut impl Read) -> Result<String> {
    let len = src.read_u16::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    src.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| StorageError::InvalidArgument("filename is not valid UTF-8".into()))
}

fn read_ext(src: &mut impl Read) -> Result<String> {
    let mut buf = [0u8; crate::fileid::MAX_EXT_LEN];
    src.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/// Upload and upload-appender share this prefix; the content bytes
/// follow immediately in the body and run to its end.
#[derive(Debug)]
pub struct UploadPrefix {
    pub file_ext_name: String,
    pub file_size: u64,
}

impl UploadPrefix {
    pub const WIDTH: usize = crate::fileid::MAX_EXT_LEN + 8;

    pub fn parse(src: &mut impl Read) -> Result<Self> {
        let file_ext_name = read_ext(src)?;
        let file_size = src.read_u64::<BigEndian>()?;
        Ok(Self { file_ext_name, file_size })
    }
}

/// `upload-slave` body: a pre-assigned remote filename instead of a
/// server-generated one (spec.md §6, supplemented in SPEC_FULL.md §3).
#[derive(Debug)]
pub struct UploadSlaveRequest {
    pub remote_filename: String,
    pub file_ext_name: String,
    pub file_size: u64,
}

impl UploadSlaveRequest {
    pub fn parse(src: &mut impl Read) -> Result<Self> {
        let remote_filename = read_u16_len_str(src)?;
        let file_ext_name = read_ext(src)?;
        let file_size = src.read_u64::<BigEndian>()?;
        Ok(Self { remote_filename, file_ext_name, file_size })
    }
}

/// `append` body prefix: target file plus the byte count being sent.
#[derive(Debug)]
pub struct AppendRequest {
    pub filename: String,
    pub append_size: u64,
}

impl AppendRequest {
    pub fn parse(src: &mut impl Read) -> Result<Self> {
        let filename = read_u16_len_str(src)?;
        let append_size = src.read_u64::<BigEndian>()?;
        Ok(Self { filename, append_size })
    }
}

/// `modify` body prefix: target file, explicit offset, and length.
#[derive(Debug)]
pub struct ModifyRequest {
    pub filename: String,
    pub offset: u64,
    pub size: u64,
}

impl ModifyRequest {
    pub fn parse(src: &mut impl Read) -> Result<Self> {
        let filename = read_u16_len_str(src)?;
        let offset = src.read_u64::<BigEndian>()?;
        let size = src.read_u64::<BigEndian>()?;
        Ok(Self { filename, offset, size })
    }
}

/// `truncate` body: target file plus the new length.
#[derive(Debug)]
pub struct TruncateRequest {
    pub filename: String,
    pub new_size: u64,
}

impl TruncateRequest {
    pub fn parse(src: &mut impl Read) -> Result<Self> {
        let filename = read_u16_len_str(src)?;
        let new_size = src.read_u64::<BigEndian>()?;
        Ok(Self { filename, new_size })
    }
}

/// `download` body: target file, starting offset, and byte count
/// (`0` meaning "to end of file", spec.md §4.G "Download").
#[derive(Debug)]
pub struct DownloadRequest {
    pub filename: String,
    pub offset: u64,
    pub download_bytes: u64,
}

impl DownloadRequest {
    pub fn parse(src: &mut impl Read) -> Result<Self> {
        let filename = read_u16_len_str(src)?;
        let offset = src.read_u64::<BigEndian>()?;
        let download_bytes = src.read_u64::<BigEndian>()?;
        Ok(Self { filename, offset, download_bytes })
    }
}

/// `delete`, `get-metadata`, `query-file-info` all share this shape:
/// a single filename and nothing else.
#[derive(Debug)]
pub struct FilenameOnlyRequest {
    pub filename: String,
}

impl FilenameOnlyRequest {
    pub fn parse(src: &mut impl Read) -> Result<Self> {
        Ok(Self { filename: read_u16_len_str(src)? })
    }
}

/// `set-metadata` body: target file, a mode byte (`O` = overwrite,
/// `M` = merge, per spec.md §3's metadata lifecycle), and the
/// `key\x02value` records joined by `\x01`.
#[derive(Debug)]
pub struct SetMetadataRequest {
    pub filename: String,
    pub overwrite: bool,
    pub meta_bytes: Vec<u8>,
}

impl SetMetadataRequest {
    pub fn parse(src: &mut impl Read) -> Result<Self> {
        let filename = read_u16_len_str(src)?;
        let mode = src.read_u8()?;
        let overwrite = match mode {
            b'O' => true,
            b'M' => false,
            other => {
                return Err(StorageError::InvalidArgument(format!("unknown set-metadata mode byte {other}")))
            }
        };
        let meta_len = src.read_u32::<BigEndian>()? as usize;
        let mut meta_bytes = vec![0u8; meta_len];
        src.read_exact(&mut meta_bytes)?;
        Ok(Self { filename, overwrite, meta_bytes })
    }
}
