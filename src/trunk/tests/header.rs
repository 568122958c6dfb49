use super::super::header::*;

#[test]
fn pack_unpack_roundtrip() {
    let header = SlotHeader {
        alloc_size: 1024,
        file_size: 900,
        crc32: 0x1234_5678,
        mtime: 1_700_000_000,
        file_type: file_type::REGULAR,
        ext: SlotHeader::with_ext("jpg"),
    };
    let packed = header.pack();
    assert_eq!(packed.len(), HEADER_SIZE as usize);
    assert_eq!(SlotHeader::unpack(&packed), header);
}

#[test]
fn ext_str_trims_nul_padding() {
    let header = SlotHeader { ext: SlotHeader::with_ext("png"), ..SlotHeader::EMPTY };
    assert_eq!(header.ext_str(), "png");
}

#[test]
fn empty_header_is_empty() {
    assert!(SlotHeader::EMPTY.is_empty());
}

#[test]
fn tolerant_zero_matches_only_on_tolerated_fields() {
    let header = SlotHeader { alloc_size: 999, file_size: 1, file_type: 1, ..SlotHeader::EMPTY };
    assert!(header.looks_free_when_tolerant());

    let header = SlotHeader { crc32: 1, ..SlotHeader::EMPTY };
    assert!(!header.looks_free_when_tolerant());
}

#[test]
fn check_and_init_creates_zero_filled_container() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trunk-0");
    let file = check_and_init(&path, 4096).unwrap();
    assert_eq!(container_len(&file).unwrap(), 4096);

    let header = read_header(&file, 0).unwrap();
    assert!(header.is_empty());
}

#[test]
fn check_and_init_rejects_mismatched_existing_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trunk-0");
    check_and_init(&path, 4096).unwrap();

    assert!(check_and_init(&path, 8192).is_err());
}

#[test]
fn check_slot_free_detects_occupied_slot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trunk-0");
    let file = check_and_init(&path, 4096).unwrap();

    assert!(check_slot_free(&file, 0).is_ok());

    let occupied = SlotHeader {
        alloc_size: 256,
        file_size: 200,
        crc32: 1,
        mtime: 1,
        file_type: file_type::REGULAR,
        ext: SlotHeader::with_ext("bin"),
    };
    write_header(&file, 0, &occupied).unwrap();

    assert!(matches!(check_slot_free(&file, 0), Err(crate::error::StorageError::SlotOccupied)));
}

#[test]
fn clear_header_frees_a_slot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trunk-0");
    let file = check_and_init(&path, 4096).unwrap();

    let occupied = SlotHeader { alloc_size: 256, file_size: 200, ..SlotHeader::EMPTY };
    write_header(&file, 0, &occupied).unwrap();
    assert!(check_slot_free(&file, 0).is_err());

    clear_header(&file, 0).unwrap();
    assert!(check_slot_free(&file, 0).is_ok());
}

#[test]
fn open_container_does_not_truncate_existing_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trunk-0");
    {
        let file = check_and_init(&path, 4096).unwrap();
        let header = SlotHeader { alloc_size: 256, file_size: 10, ..SlotHeader::EMPTY };
        write_header(&file, 0, &header).unwrap();
    }

    let reopened = open_container(&path).unwrap();
    let header = read_header(&reopened, 0).unwrap();
    assert_eq!(header.alloc_size, 256);
}
