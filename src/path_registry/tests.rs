use super::*;
use crate::config::FileSignatureMethod;

fn config_with_paths(paths: Vec<PathBuf>) -> StorageConfig {
    StorageConfig {
        store_paths: paths,
        subdir_count_per_path: 4,
        disk_reader_threads: 1,
        disk_writer_threads: 1,
        disk_rw_separated: true,
        reserved_storage_space: 0,
        trunk_enabled: false,
        trunk_file_size: 1024,
        trunk_min_slot_size: 32,
        file_signature_method: FileSignatureMethod::Hash,
        store_lookup: StoreLookup::RoundRobin,
    }
}

#[test]
fn init_creates_subdir_fan_out() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_paths(vec![dir.path().to_path_buf()]);
    let registry = PathRegistry::init(&config).unwrap();

    assert_eq!(registry.count(), 1);
    assert!(dir.path().join("data").join("00").join("03").is_dir());
    assert!(dir.path().join("logs").is_dir());
}

#[test]
fn subdir_for_stays_in_range() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_paths(vec![dir.path().to_path_buf()]);
    let registry = PathRegistry::init(&config).unwrap();
    let path = registry.path(0);

    for hash in [0u32, 1, 4, 16, 255, 1_000_000] {
        let (xx, yy) = path.subdir_for(hash);
        assert!(xx < 4 && yy < 4);
    }
}

#[test]
fn acquire_path_refuses_when_all_full() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_paths(vec![dir.path().to_path_buf()]);
    let registry = PathRegistry::init(&config).unwrap();
    registry.path(0).free_bytes.store(10, std::sync::atomic::Ordering::Relaxed);

    assert!(matches!(registry.acquire_path(1_000_000), Err(StorageError::NoSpace)));
}

#[test]
fn acquire_path_round_robins_across_paths() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let config = config_with_paths(vec![dir_a.path().to_path_buf(), dir_b.path().to_path_buf()]);
    let registry = PathRegistry::init(&config).unwrap();
    for path in &registry.paths {
        path.free_bytes.store(1_000_000, std::sync::atomic::Ordering::Relaxed);
    }

    let first = registry.acquire_path(10).unwrap().index;
    let second = registry.acquire_path(10).unwrap().index;
    assert_ne!(first, second);
}

#[test]
fn debit_and_credit_update_free_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_paths(vec![dir.path().to_path_buf()]);
    let registry = PathRegistry::init(&config).unwrap();
    let path = registry.path(0);
    path.free_bytes.store(1000, std::sync::atomic::Ordering::Relaxed);

    path.debit(400);
    assert_eq!(path.free_bytes(), 600);
    path.credit(100);
    assert_eq!(path.free_bytes(), 700);
}
