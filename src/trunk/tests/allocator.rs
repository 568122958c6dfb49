use super::super::allocator::TrunkAllocator;

fn new_allocator(dir: &std::path::Path) -> TrunkAllocator {
    std::fs::create_dir_all(dir.join("00").join("00")).unwrap();
    TrunkAllocator::open(dir.to_path_buf(), 4, 4096, 64).unwrap()
}

#[test]
fn alloc_creates_container_on_first_request() {
    let dir = tempfile::tempdir().unwrap();
    let alloc = new_allocator(dir.path());

    let info = alloc.alloc(100).unwrap();
    assert_eq!(info.file_id, 1);
    assert_eq!(info.offset, 0);
    assert!(info.size >= 100 + crate::trunk::HEADER_SIZE);
}

#[test]
fn alloc_splits_large_free_slot_and_reuses_remainder() {
    let dir = tempfile::tempdir().unwrap();
    let alloc = new_allocator(dir.path());

    let first = alloc.alloc(100).unwrap();
    let second = alloc.alloc(100).unwrap();

    assert_eq!(first.file_id, second.file_id);
    assert_eq!(second.offset, first.offset + first.size);
}

#[test]
fn alloc_creates_second_container_when_first_is_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    let alloc = new_allocator(dir.path());

    // Trunk file is 4096 bytes; ask for slots that leave no room for
    // another full request so a second container must be created.
    let _ = alloc.alloc(3000).unwrap();
    let second = alloc.alloc(3000).unwrap();
    assert_eq!(second.file_id, 2);
}

#[test]
fn free_then_alloc_reuses_the_freed_slot() {
    let dir = tempfile::tempdir().unwrap();
    let alloc = new_allocator(dir.path());

    let info = alloc.alloc(100).unwrap();
    alloc.free(info).unwrap();

    let reused = alloc.alloc(100).unwrap();
    assert_eq!(reused.file_id, info.file_id);
    assert_eq!(reused.offset, info.offset);
}

#[test]
fn free_coalesces_adjacent_slots() {
    let dir = tempfile::tempdir().unwrap();
    let alloc = new_allocator(dir.path());

    let a = alloc.alloc(100).unwrap();
    let b = alloc.alloc(100).unwrap();
    alloc.free(a).unwrap();
    alloc.free(b).unwrap();

    // After freeing both adjacent slots, a request spanning their
    // combined size should be satisfied from the coalesced slot
    // without creating a third container.
    let combined = alloc.alloc(a.size + b.size - 2 * crate::trunk::HEADER_SIZE).unwrap();
    assert_eq!(combined.file_id, a.file_id);
    assert_eq!(combined.offset, a.offset);
}

#[test]
fn confirm_writes_durable_header() {
    let dir = tempfile::tempdir().unwrap();
    let alloc = new_allocator(dir.path());

    let info = alloc.alloc(100).unwrap();
    alloc.confirm(info, 90, 0xdead_beef, 1, "bin").unwrap();

    let file = alloc.open_container(info.file_id).unwrap();
    let header = crate::trunk::header::read_header(&file, info.offset as u64).unwrap();
    assert_eq!(header.file_size, 90);
    assert_eq!(header.crc32, 0xdead_beef);
    assert_eq!(header.ext_str(), "bin");
}

#[test]
fn slot_occupancy_blocks_reallocation_of_confirmed_slot() {
    let dir = tempfile::tempdir().unwrap();
    let alloc = new_allocator(dir.path());

    let info = alloc.alloc(100).unwrap();
    alloc.confirm(info, 90, 1, 1, "bin").unwrap();

    let file = alloc.open_container(info.file_id).unwrap();
    assert!(crate::trunk::header::check_slot_free(&file, info.offset as u64).is_err());
}

#[test]
fn reopening_allocator_reconciles_torn_alloc_as_free() {
    let dir = tempfile::tempdir().unwrap();
    let info = {
        let alloc = new_allocator(dir.path());
        // alloc without confirm simulates a crash between alloc and confirm.
        alloc.alloc(100).unwrap()
    };

    let reopened = TrunkAllocator::open(dir.path().to_path_buf(), 4, 4096, 64).unwrap();
    let reused = reopened.alloc(100).unwrap();
    assert_eq!(reused.file_id, info.file_id);
    assert_eq!(reused.offset, info.offset);
}

#[test]
fn reopening_allocator_preserves_confirmed_slot_as_occupied() {
    let dir = tempfile::tempdir().unwrap();
    let info = {
        let alloc = new_allocator(dir.path());
        let info = alloc.alloc(100).unwrap();
        alloc.confirm(info, 90, 1, 1, "bin").unwrap();
        info
    };

    let reopened = TrunkAllocator::open(dir.path().to_path_buf(), 4, 4096, 64).unwrap();
    let file = reopened.open_container(info.file_id).unwrap();
    assert!(crate::trunk::header::check_slot_free(&file, info.offset as u64).is_err());
}

#[test]
fn container_partition_invariant_holds_after_several_ops() {
    let dir = tempfile::tempdir().unwrap();
    let alloc = new_allocator(dir.path());

    let a = alloc.alloc(200).unwrap();
    let b = alloc.alloc(300).unwrap();
    let c = alloc.alloc(100).unwrap();
    alloc.free(b).unwrap();
    let d = alloc.alloc(50).unwrap();

    // Re-derive the partition by walking headers/free-state via
    // repeated alloc/free is out of scope for a unit test; instead
    // assert the basic P3 shape: no two returned slots overlap.
    let slots = [a, c, d];
    for i in 0..slots.len() {
        for j in (i + 1)..slots.len() {
            if slots[i].file_id != slots[j].file_id {
                continue;
            }
            let (lo, hi) = if slots[i].offset < slots[j].offset { (slots[i], slots[j]) } else { (slots[j], slots[i]) };
            assert!(lo.offset + lo.size <= hi.offset, "slots overlap: {lo:?} vs {hi:?}");
        }
    }
}
