
//! Checksum coverage rules for headers and records.
//!
//! All checksums are CRC-32C (Castagnoli). When checksums are disabled for a
//! file, every checksum slot holds zero instead.

/// Compute the CRC-32C of a contiguous byte run.
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32c::crc32c(bytes)
}

/// Continue a previously computed CRC-32C with more bytes.
pub fn append(crc: u32, bytes: &[u8]) -> u32 {
    crc32c::crc32c_append(crc, bytes)
}

/// Checksum of a free-space record: covers the 8 record-header bytes,
/// with the body treated as `zero_count` zero bytes. The body of a freed
/// record is never rewritten, so its actual contents do not participate.
pub fn free_space_checksum(header: &[u8; 8], zero_count: usize) -> u32 {
    const ZEROES: [u8; 4096] = [0_u8; 4096];

    let mut crc = checksum(header);
    let mut remaining = zero_count;

    while remaining > 0 {
        let step = remaining.min(ZEROES.len());
        crc = append(crc, &ZEROES[.. step]);
        remaining -= step;
    }

    crc
}
