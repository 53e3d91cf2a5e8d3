//! # Internet Checksum
//!
//! One's-complement 16-bit checksum (RFC 1071) and its incremental update
//! for a single 16-bit field change (RFC 1624, eqn. 3):
//!
//! ```text
//!   HC' = ~(~HC + ~m + m')
//! ```
//!
//! The incremental form never produces 0xFFFF, and neither does a full
//! recomputation over a header with a non-zero word (every IPv4 header),
//! so the two always agree.

/// Add `word` into a 32-bit accumulator and fold the carry back in.
#[inline]
fn add(sum: u32, word: u16) -> u32 {
    let sum = sum + u32::from(word);
    (sum & 0xFFFF) + (sum >> 16)
}

/// Fold a 32-bit accumulator to 16 bits with end-around carry.
#[inline]
fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

/// One's-complement sum of `data` as big-endian 16-bit words.
///
/// An odd trailing byte is padded with a zero low byte.
pub fn ones_complement_sum(data: &[u8]) -> u16 {
    let mut sum = 0u32;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }
    fold(sum)
}

/// Checksum value to store in a header whose checksum field is zeroed.
pub fn checksum(data: &[u8]) -> u16 {
    !ones_complement_sum(data)
}

/// Whether `data`, checksum field included, verifies.
pub fn verify(data: &[u8]) -> bool {
    checksum(data) == 0
}

/// New checksum after a 16-bit field covered by it changes from `old` to
/// `new`, without touching the rest of the header.
#[inline]
pub fn update(check: u16, old: u16, new: u16) -> u16 {
    let sum = add(u32::from(!check), !old);
    let sum = add(sum, new);
    !fold(sum)
}
