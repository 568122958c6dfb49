#![no_main]

use fastdfs_storage_core::fileid;
use libfuzzer_sys::fuzz_target;

// decode() must never panic on arbitrary input, and any filename it does
// accept must round-trip back through encode() to the same fields.
fuzz_target!(|data: &str| {
    let Ok(decoded) = fileid::decode(data) else {
        return;
    };
    let Ok(reencoded) = fileid::encode(&decoded.fields, &decoded.ext, decoded.trunk) else {
        return;
    };
    let Ok(redecoded) = fileid::decode(&reencoded) else {
        panic!("re-encoded file id failed to decode: {reencoded:?}");
    };
    assert_eq!(decoded.fields, redecoded.fields);
    assert_eq!(decoded.ext, redecoded.ext);
    assert_eq!(decoded.trunk, redecoded.trunk);
});
