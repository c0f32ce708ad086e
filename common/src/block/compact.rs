//! Compact encoding of difficulty targets.
//!
//! A compact target is a 32-bit floating-point-like number: the high byte is a base-256
//! exponent and the low 23 bits are the mantissa, so that `target = mantissa * 256^(exponent - 3)`.
//! Bit 23 is a sign bit. Negative targets are never valid on the network.
use bitcoin::util::uint::Uint256;

use super::{Bits, Target, Work};

/// Sign bit of the mantissa.
const SIGN_BIT: u32 = 0x0080_0000;
/// Unsigned mantissa mask.
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Exponent and shifted mantissa of a compact target.
fn split(bits: Bits) -> (u32, u32) {
    let size = bits >> 24;
    let word = bits & MANTISSA_MASK;

    if size <= 3 {
        (size, word >> (8 * (3 - size)))
    } else {
        (size, word)
    }
}

fn from_u32(n: u32) -> Target {
    Uint256([n as u64, 0, 0, 0])
}

/// Check whether the compact target has its sign bit set along with a non-zero mantissa.
pub fn is_negative(bits: Bits) -> bool {
    let (_, word) = split(bits);

    word != 0 && bits & SIGN_BIT != 0
}

/// Check whether the compact target describes a number wider than 256 bits.
pub fn overflows(bits: Bits) -> bool {
    let (size, word) = split(bits);

    word != 0 && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32))
}

/// Decode a compact target into a full-width target.
///
/// Negative targets decode to zero, which no block hash can satisfy. Targets wider than 256
/// bits decode to the maximum value, which is always above the network limit.
///
/// ```
/// use powchain_common::block::compact;
///
/// assert_eq!(compact::decode(0x03123456).low_u32(), 0x123456);
/// assert_eq!(compact::decode(0x01123456).low_u32(), 0x12);
/// ```
pub fn decode(bits: Bits) -> Target {
    if is_negative(bits) {
        return Target::default();
    }
    if overflows(bits) {
        return !Target::default();
    }
    let (size, word) = split(bits);

    if size <= 3 {
        from_u32(word)
    } else {
        from_u32(word) << (8 * (size as usize - 3))
    }
}

/// Encode a target in compact form. Precision beyond the 23-bit mantissa is truncated.
///
/// ```
/// use powchain_common::block::compact;
///
/// assert_eq!(compact::encode(&compact::decode(0x1d00ffff)), 0x1d00ffff);
/// ```
pub fn encode(target: &Target) -> Bits {
    let mut size = (target.bits() + 7) / 8;
    let mut mantissa = if size <= 3 {
        target.low_u32() << (8 * (3 - size))
    } else {
        (*target >> (8 * (size - 3))).low_u32()
    };

    // The mantissa would be interpreted as negative: use one more byte of exponent instead.
    if mantissa & SIGN_BIT != 0 {
        mantissa >>= 8;
        size += 1;
    }
    mantissa | (size as u32) << 24
}

/// Round a target to the precision of its compact encoding.
pub fn round(target: &Target) -> Target {
    decode(encode(target))
}

/// The expected number of hashes needed to find a block hash meeting the given target.
pub fn work(target: &Target) -> Work {
    let zero = Target::default();
    let one = from_u32(1);

    if *target == zero {
        return !zero;
    }
    if *target == !zero {
        return one;
    }
    // `2^256 / (target + 1)`, without representing `2^256`.
    (!*target / (*target + one)) + one
}
