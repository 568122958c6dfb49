use super::*;

fn base_config() -> StorageConfig {
    StorageConfig {
        store_paths: vec![PathBuf::from("/tmp/sp0")],
        subdir_count_per_path: 256,
        disk_reader_threads: 2,
        disk_writer_threads: 2,
        disk_rw_separated: true,
        reserved_storage_space: 1024,
        trunk_enabled: true,
        trunk_file_size: 64 * 1024 * 1024,
        trunk_min_slot_size: 128,
        file_signature_method: FileSignatureMethod::Hash,
        store_lookup: StoreLookup::RoundRobin,
    }
}

#[test]
fn validate_accepts_sane_config() {
    assert!(base_config().validate().is_ok());
}

#[test]
fn validate_rejects_empty_paths() {
    let mut cfg = base_config();
    cfg.store_paths.clear();
    assert!(cfg.validate().is_err());
}

#[test]
fn validate_rejects_relative_path() {
    let mut cfg = base_config();
    cfg.store_paths.push(PathBuf::from("relative/path"));
    assert!(cfg.validate().is_err());
}

#[test]
fn validate_rejects_trunk_file_smaller_than_min_slot() {
    let mut cfg = base_config();
    cfg.trunk_file_size = 10;
    cfg.trunk_min_slot_size = 128;
    assert!(cfg.validate().is_err());
}

#[test]
fn threads_per_path_separated() {
    let cfg = base_config();
    assert_eq!(cfg.threads_per_path(), (2, 2));
}

#[test]
fn threads_per_path_combined() {
    let mut cfg = base_config();
    cfg.disk_rw_separated = false;
    assert_eq!(cfg.threads_per_path(), (4, 4));
}
