//! Metadata sibling files (spec.md §3 "Metadata", §6 "Metadata file").
//!
//! Stored as `{main-file}.meta` next to the content file, holding
//! `key\x02value` records separated by `\x01`. Optional; created or
//! updated by `set-metadata` in overwrite or merge mode.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

const RECORD_SEP: u8 = 0x01;
const KV_SEP: u8 = 0x02;

/// Sibling path for a content file's metadata.
pub fn meta_path(content_path: &Path) -> PathBuf {
    let mut name = content_path.as_os_str().to_os_string();
    name.push(".meta");
    PathBuf::from(name)
}

/// Parses the `key\x02value` / `\x01`-separated record format.
pub fn parse(bytes: &[u8]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if bytes.is_empty() {
        return out;
    }
    for record in bytes.split(|&b| b == RECORD_SEP) {
        if record.is_empty() {
            continue;
        }
        if let Some(sep) = record.iter().position(|&b| b == KV_SEP) {
            let key = String::from_utf8_lossy(&record[..sep]).into_owned();
            let value = String::from_utf8_lossy(&record[sep + 1..]).into_owned();
            out.insert(key, value);
        }
    }
    out
}

/// Serializes a map back to the on-disk record format, with no
/// trailing separator (spec.md §6).
pub fn serialize(meta: &BTreeMap<String, String>) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, (key, value)) in meta.iter().enumerate() {
        if i > 0 {
            out.push(RECORD_SEP);
        }
        out.extend_from_slice(key.as_bytes());
        out.push(KV_SEP);
        out.extend_from_slice(value.as_bytes());
    }
    out
}

/// Reads and parses a sibling `.meta` file, if present. Missing file
/// is not an error: metadata is optional (spec.md §3).
pub fn read(content_path: &Path) -> Result<BTreeMap<String, String>> {
    match std::fs::read(meta_path(content_path)) {
        Ok(bytes) => Ok(parse(&bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => Err(err.into()),
    }
}

/// Writes metadata in overwrite mode (replaces the sibling file
/// wholesale) or merge mode (union with the existing records, new
/// values winning on key collision).
pub fn write(content_path: &Path, incoming: &[u8], overwrite: bool) -> Result<()> {
    let incoming = parse(incoming);
    let merged = if overwrite {
        incoming
    } else {
        let mut existing = read(content_path)?;
        existing.extend(incoming);
        existing
    };
    std::fs::write(meta_path(content_path), serialize(&merged))?;
    Ok(())
}

/// Removes the sibling `.meta` file, ignoring a missing file (spec.md
/// §4.H-style best-effort cleanup: metadata has no existence guarantee
/// separate from the content file it rides along with).
pub fn remove(content_path: &Path) -> Result<()> {
    match std::fs::remove_file(meta_path(content_path)) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_parse_and_serialize() {
        let mut meta = BTreeMap::new();
        meta.insert("width".to_string(), "800".to_string());
        meta.insert("height".to_string(), "600".to_string());
        let bytes = serialize(&meta);
        assert_eq!(parse(&bytes), meta);
    }

    #[test]
    fn write_overwrite_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("file.bin");
        std::fs::write(&content, b"x").unwrap();

        write(&content, b"a\x02one", false).unwrap();
        write(&content, b"b\x02two", true).unwrap();

        let meta = read(&content).unwrap();
        assert_eq!(meta.get("b").map(String::as_str), Some("two"));
        assert!(!meta.contains_key("a"));
    }

    #[test]
    fn write_merge_unions_with_existing() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("file.bin");
        std::fs::write(&content, b"x").unwrap();

        write(&content, b"a\x02one", false).unwrap();
        write(&content, b"b\x02two", false).unwrap();

        let meta = read(&content).unwrap();
        assert_eq!(meta.get("a").map(String::as_str), Some("one"));
        assert_eq!(meta.get("b").map(String::as_str), Some("two"));
    }

    #[test]
    fn read_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("missing.bin");
        assert!(read(&content).unwrap().is_empty());
    }
}
