//! Bit-order reversal for sub-byte wire fields.
//!
//! The CSRC-count nibble of an RTP header is carried bit-reversed relative
//! to the host reading of byte 0 in this system's uploads, so
//! [`RtpHeader`](crate::media::rtp::RtpHeader) passes it through
//! [`flip_nibble`] on both decode and encode.

/// Nibble reversal table: `NIBBLE[x]` is `x` with bits 0..=3 mirrored.
const NIBBLE: [u8; 16] = [
    0x0, 0x8, 0x4, 0xC, 0x2, 0xA, 0x6, 0xE, 0x1, 0x9, 0x5, 0xD, 0x3, 0xB, 0x7, 0xF,
];

/// Reverse the low `width` bits of `value` (1 ≤ `width` ≤ 8).
///
/// Bits above `width` are ignored. Widths outside `1..=8` are clamped.
/// Applying the function twice with the same width yields the masked input.
///
/// ```
/// use ingest::bits::flip;
///
/// assert_eq!(flip(0b0001, 4), 0b1000);
/// assert_eq!(flip(0b011, 3), 0b110);
/// assert_eq!(flip(flip(0x5A, 8), 8), 0x5A);
/// ```
pub const fn flip(value: u8, width: u32) -> u8 {
    let width = if width == 0 {
        1
    } else if width > 8 {
        8
    } else {
        width
    };
    match width {
        1 => value & 0x01,
        4 => flip_nibble(value),
        2 | 3 => flip_nibble(value & mask(width)) >> (4 - width),
        _ => flip_byte(value & mask(width)) >> (8 - width),
    }
}

/// Reverse the low 4 bits of `value`.
pub const fn flip_nibble(value: u8) -> u8 {
    NIBBLE[(value & 0x0F) as usize]
}

/// Reverse all 8 bits of `value`.
pub const fn flip_byte(value: u8) -> u8 {
    (flip_nibble(value & 0x0F) << 4) | flip_nibble(value >> 4)
}

const fn mask(width: u32) -> u8 {
    if width >= 8 { 0xFF } else { (1u8 << width) - 1 }
}
