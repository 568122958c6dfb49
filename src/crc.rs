//! CRC32 helpers shared by the file-ID codec, the trunk header codec
//! and the DIO read/write handlers.
//!
//! spec.md §4.F: "CRC32 uses an additive update so chunked uploads
//! produce the same checksum as one contiguous pass; the final value
//! is XORed with the CRC32 finalization mask." [`crc32fast::Hasher`]
//! already implements the standard CRC-32/ISO-HDLC algorithm (additive
//! update, final XOR with `0xffff_ffff`), so this module is a thin,
//! named wrapper rather than a hand-rolled table.

use crc32fast::Hasher;

/// Running CRC32 accumulator fed one chunk at a time (spec.md §8 P7,
/// "downstream chunking transparency").
#[derive(Default)]
pub struct RunningCrc32 {
    hasher: Hasher,
}

impl RunningCrc32 {
    pub fn new() -> Self {
        Self { hasher: Hasher::new() }
    }

    /// Feeds another chunk of payload bytes into the running checksum.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Finalizes the checksum. Calling this does not consume `self`
    /// so handlers can log an in-progress value without losing state,
    /// but per spec.md the value is only meaningful once the full
    /// range has been fed.
    pub fn finalize(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

/// One-shot CRC32 over a complete buffer, used by `query_file_info`
/// and tests that verify P1/P7 without streaming.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_matches_one_shot() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut running = RunningCrc32::new();
        running.update(data);
        assert_eq!(running.finalize(), crc32(data));
    }

    #[test]
    fn chunked_matches_contiguous_p7() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let expected = crc32(&data);

        for chunk_size in [1usize, 7, 64, 4096, 10_000] {
            let mut running = RunningCrc32::new();
            for chunk in data.chunks(chunk_size) {
                running.update(chunk);
            }
            assert_eq!(running.finalize(), expected, "chunk_size={chunk_size}");
        }
    }
}
