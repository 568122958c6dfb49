//! `set-metadata` / `get-metadata` (spec.md §3 "Metadata").
//!
//! Metadata never touches the DIO dispatcher: the sibling `.meta` file
//! is small and read/written directly on the async task, the same way
//! [`crate::ops::append::handle`] stats a file's current length.

use crate::error::Result;

use super::ServerState;

pub async fn set_metadata(
    state: &ServerState,
    filename: &str,
    overwrite: bool,
    meta_bytes: &[u8],
) -> Result<()> {
    state.stats.total_set_meta_count();
    let resolved = super::resolve_filename(&state.registry, filename)?;
    crate::metadata::write(&resolved.content_path, meta_bytes, overwrite)?;
    state.stats.success_set_meta_count();
    Ok(())
}

pub async fn get_metadata(state: &ServerState, filename: &str) -> Result<Vec<u8>> {
    state.stats.total_get_meta_count();
    let resolved = super::resolve_filename(&state.registry, filename)?;
    let meta = crate::metadata::read(&resolved.content_path)?;
    state.stats.success_get_meta_count();
    Ok(crate::metadata::serialize(&meta))
}
