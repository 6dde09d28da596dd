//! CRC-32 integrity trailer.
//!
//! Standard reflected CRC-32 (IEEE 802.3 polynomial, init and final XOR `0xFFFFFFFF`),
//! the same variant zlib and Ethernet use. The trailer is stored big-endian.

/// Size of the checksum trailer in bytes
pub const CHECKSUM_LEN: usize = 4;

/// Compute the CRC-32 of `data`.
#[inline]
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Check a buffer whose last four bytes are a big-endian CRC-32 of everything before them.
///
/// Inputs shorter than the trailer never verify.
pub fn verify(data_with_trailer: &[u8]) -> bool {
    if data_with_trailer.len() < CHECKSUM_LEN {
        return false;
    }
    let (body, trailer) = data_with_trailer.split_at(data_with_trailer.len() - CHECKSUM_LEN);
    let mut expected = [0u8; CHECKSUM_LEN];
    expected.copy_from_slice(trailer);
    u32::from_be_bytes(expected) == checksum(body)
}
