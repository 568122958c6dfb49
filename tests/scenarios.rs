//! End-to-end scenarios from spec.md §8 ("Testable Properties" / S1-S5),
//! driving the library's public API directly against a `tempfile::tempdir()`.

use fastdfs_storage_core::config::{FileSignatureMethod, StorageConfig, StoreLookup};
use fastdfs_storage_core::ops::{self, upload::UploadMode, ServerState};

fn config_for(root: &std::path::Path, trunk_enabled: bool, trunk_file_size: u64) -> StorageConfig {
    StorageConfig {
        store_paths: vec![root.to_path_buf()],
        subdir_count_per_path: 16,
        disk_reader_threads: 2,
        disk_writer_threads: 2,
        disk_rw_separated: false,
        reserved_storage_space: 0,
        trunk_enabled,
        trunk_file_size,
        trunk_min_slot_size: 64,
        file_signature_method: FileSignatureMethod::Md5,
        store_lookup: StoreLookup::RoundRobin,
    }
}

fn crc32_of(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

// S1: normal-file uploads of several sizes, each downloaded back byte-identical,
// with the file-ID's embedded CRC32 matching the uploaded content.
#[tokio::test]
async fn s1_normal_upload_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path(), false, 65536);
    let state = ServerState::init(config).unwrap();

    for size in [1usize, 1024, 1_048_576] {
        let content = vec![0xABu8; size];
        let remote_name =
            ops::upload::handle(&state, 1, UploadMode::Normal, "bin", size as u64, content.clone())
                .await
                .unwrap();

        let resolved = ops::resolve_filename(&state.registry, &remote_name).unwrap();
        assert_eq!(resolved.decoded.fields.size, size as u64);
        assert_eq!(resolved.decoded.fields.crc32, crc32_of(&content));
        assert!(resolved.content_path.exists());

        let downloaded = ops::download::handle(&state, 1, &remote_name, 0, 0).await.unwrap();
        assert_eq!(downloaded.content, content);
    }
}

// S2: trunk-packed uploads. Every file's query_file_info reports its real size;
// deleting half and uploading replacements of a different size doesn't grow the
// container count.
#[tokio::test]
async fn s2_trunk_packed_uploads_and_file_info() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path(), true, 65536);
    let state = ServerState::init(config).unwrap();

    let mut names = Vec::new();
    for _ in 0..20 {
        let content = vec![0x11u8; 100];
        let name = ops::upload::handle(&state, 1, UploadMode::Normal, "dat", 100, content).await.unwrap();
        names.push(name);
    }

    for name in &names {
        let info = ops::query::handle(&state, name).await.unwrap();
        assert_eq!(info.file_size, 100);
    }

    let data_root = dir.path().join("data");
    let container_count_before = count_trunk_containers(&data_root);

    for name in names.iter().take(10) {
        ops::delete::handle(&state, 1, name).await.unwrap();
    }
    for _ in 0..10 {
        let content = vec![0x22u8; 50];
        ops::upload::handle(&state, 1, UploadMode::Normal, "dat", 50, content).await.unwrap();
    }

    let container_count_after = count_trunk_containers(&data_root);
    assert_eq!(container_count_before, container_count_after);
}

fn count_trunk_containers(data_root: &std::path::Path) -> usize {
    let mut count = 0;
    for xx in walk_dirs(data_root) {
        for entry in std::fs::read_dir(&xx).into_iter().flatten().flatten() {
            if entry.file_name().to_string_lossy().starts_with("trunk-") {
                count += 1;
            }
        }
    }
    count
}

fn walk_dirs(data_root: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    for xx_entry in std::fs::read_dir(data_root).into_iter().flatten().flatten() {
        if !xx_entry.path().is_dir() {
            continue;
        }
        for yy_entry in std::fs::read_dir(xx_entry.path()).into_iter().flatten().flatten() {
            if yy_entry.path().is_dir() {
                out.push(yy_entry.path());
            }
        }
    }
    out
}

// S3 (clean case): an appender upload followed by an append grows the file by
// exactly the appended length, and the stored content's CRC32 matches a fresh
// recomputation.
#[tokio::test]
async fn s3_append_grows_file_and_preserves_crc() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path(), false, 65536);
    let state = ServerState::init(config).unwrap();

    let first = vec![0x33u8; 1024];
    let name = ops::upload::handle(&state, 1, UploadMode::Appender, "log", 1024, first.clone()).await.unwrap();

    let second = vec![0x44u8; 2048];
    ops::append::handle(&state, 1, &name, second.clone()).await.unwrap();

    let resolved = ops::resolve_filename(&state.registry, &name).unwrap();
    let on_disk = std::fs::read(&resolved.content_path).unwrap();
    assert_eq!(on_disk.len(), 1024 + 2048);

    let mut expected = first;
    expected.extend_from_slice(&second);
    assert_eq!(on_disk, expected);
    assert_eq!(crc32_of(&on_disk), resolved.decoded.fields.crc32);
}

// S4: two concurrent uploads to the same store path succeed with distinct IDs
// and the success counter increments by exactly two.
#[tokio::test]
async fn s4_concurrent_uploads_get_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path(), false, 65536);
    let state = ServerState::init(config).unwrap();

    let before = state.stats.snapshot().success_upload_count;

    let (a, b) = tokio::join!(
        ops::upload::handle(&state, 1, UploadMode::Normal, "bin", 10, vec![1u8; 10]),
        ops::upload::handle(&state, 2, UploadMode::Normal, "bin", 10, vec![2u8; 10]),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a, b);

    let after = state.stats.snapshot().success_upload_count;
    assert_eq!(after - before, 2);
}

// S5: corrupting a slot the allocator believes is free causes a subsequent
// upload targeting that slot to fail with slot_occupied, without touching the
// corrupted bytes.
#[tokio::test]
async fn s5_corrupted_free_slot_is_refused() {
    use std::os::unix::fs::FileExt;

    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path(), true, 65536);
    let state = ServerState::init(config).unwrap();

    let allocator = state.allocator_for(0).unwrap();
    let info = allocator.alloc(100).unwrap();
    allocator.free(info).unwrap();

    let container = allocator.open_container(info.file_id).unwrap();
    let corruption = [0xFFu8; 8];
    container.write_all_at(&corruption, info.offset as u64).unwrap();
    drop(container);

    let err = ops::upload::handle(&state, 1, UploadMode::Normal, "bin", 100, vec![0u8; 100]).await.unwrap_err();
    assert!(matches!(err, fastdfs_storage_core::error::StorageError::SlotOccupied));

    let container = allocator.open_container(info.file_id).unwrap();
    let mut buf = [0u8; 8];
    container.read_exact_at(&mut buf, info.offset as u64).unwrap();
    assert_eq!(buf, corruption);
}
