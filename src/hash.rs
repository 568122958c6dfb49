//! The optional 16-byte content-hash fingerprint (spec.md §3) used for
//! de-duplication. The scheme is a global config knob
//! ([`crate::config::FileSignatureMethod`]) and must match what
//! clients and the sync subsystem (out of scope) expect.

use md5::{Digest, Md5};

use crate::config::FileSignatureMethod;

/// Width of the stored fingerprint, regardless of scheme.
pub const HASH_SIZE: usize = 16;

/// Four 32-bit rolling hashes, FastDFS's original "hash" mode: each
/// lane is seeded with a distinct multiplier so the four lanes diverge
/// on structured input, and all four are updated additively like
/// CRC32 so chunked and single-pass computations agree (spec.md §8 P7).
const LANE_SEEDS: [u32; 4] = [0x2f24_314d, 0x1355_3db2, 0x4926_ee25, 0x5c57_1a19];

#[derive(Clone)]
struct RollingLane {
    seed: u32,
    acc: u32,
}

impl RollingLane {
    fn new(seed: u32) -> Self {
        Self { seed, acc: seed }
    }

    fn update(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            self.acc = self.acc.wrapping_mul(self.seed).wrapping_add(byte as u32);
        }
    }
}

enum Inner {
    Md5(Md5),
    Rolling([RollingLane; 4]),
}

/// Running content-hash accumulator, fed one chunk at a time the same
/// way [`crate::crc::RunningCrc32`] is.
pub struct RunningHash {
    inner: Inner,
}

impl RunningHash {
    pub fn new(method: FileSignatureMethod) -> Self {
        let inner = match method {
            FileSignatureMethod::Md5 => Inner::Md5(Md5::new()),
            FileSignatureMethod::Hash => {
                Inner::Rolling(LANE_SEEDS.map(RollingLane::new))
            }
        };
        Self { inner }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match &mut self.inner {
            Inner::Md5(md5) => md5.update(chunk),
            Inner::Rolling(lanes) => lanes.iter_mut().for_each(|lane| lane.update(chunk)),
        }
    }

    /// Finalizes into the 16-byte stored fingerprint.
    pub fn finalize(self) -> [u8; HASH_SIZE] {
        match self.inner {
            Inner::Md5(md5) => md5.finalize().into(),
            Inner::Rolling(lanes) => {
                let mut out = [0u8; HASH_SIZE];
                for (i, lane) in lanes.iter().enumerate() {
                    out[i * 4..i * 4 + 4].copy_from_slice(&lane.acc.to_le_bytes());
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_chunked_matches_contiguous() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 97) as u8).collect();

        let mut whole = RunningHash::new(FileSignatureMethod::Md5);
        whole.update(&data);
        let expected = whole.finalize();

        let mut chunked = RunningHash::new(FileSignatureMethod::Md5);
        for chunk in data.chunks(37) {
            chunked.update(chunk);
        }
        assert_eq!(chunked.finalize(), expected);
    }

    #[test]
    fn rolling_chunked_matches_contiguous() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 197) as u8).collect();

        let mut whole = RunningHash::new(FileSignatureMethod::Hash);
        whole.update(&data);
        let expected = whole.finalize();

        let mut chunked = RunningHash::new(FileSignatureMethod::Hash);
        for chunk in data.chunks(11) {
            chunked.update(chunk);
        }
        assert_eq!(chunked.finalize(), expected);
    }

    #[test]
    fn rolling_hash_is_not_all_zero_for_nonempty_input() {
        let mut hash = RunningHash::new(FileSignatureMethod::Hash);
        hash.update(b"hello world");
        assert_ne!(hash.finalize(), [0u8; HASH_SIZE]);
    }
}
