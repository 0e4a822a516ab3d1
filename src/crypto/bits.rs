//! Base conversion between power-of-two digit widths.
//!
//! `convert_base` is the sole bridge between byte vectors (or RSA limb
//! vectors) and the field-element vectors the hasher consumes. It is a pure
//! repacking of the underlying bitstring, so converting back truncates to
//! the original significant digits.

use num_bigint::BigUint;
use num_traits::{One, Zero};

/// Repack a little-endian base-`2^in_bits` digit vector into little-endian
/// base-`2^out_bits` digits of the same numeric value.
///
/// The output holds `ceil(in.len * in_bits / out_bits)` digits; digits past
/// the significant bits are zero. Bits of an input digit above `in_bits`
/// are not read.
pub fn convert_base(in_le: &[BigUint], in_bits: u32, out_bits: u32) -> Vec<BigUint> {
    let total_bits = in_le.len() as u64 * u64::from(in_bits);
    let out_len = total_bits.div_ceil(u64::from(out_bits)) as usize;
    let mut out = vec![BigUint::zero(); out_len];
    for (i, digit) in in_le.iter().enumerate() {
        for bit in 0..u64::from(in_bits) {
            if digit.bit(bit) {
                let position = i as u64 * u64::from(in_bits) + bit;
                let chunk = (position / u64::from(out_bits)) as usize;
                let offset = position % u64::from(out_bits);
                out[chunk] |= BigUint::one() << offset;
            }
        }
    }
    out
}

/// View a byte slice as little-endian base-256 digits.
pub fn bytes_to_digits(bytes: &[u8]) -> Vec<BigUint> {
    bytes.iter().map(|b| BigUint::from(*b)).collect()
}

/// View a u64 slice as little-endian base-2^64 digits.
pub fn limbs_to_digits(limbs: &[u64]) -> Vec<BigUint> {
    limbs.iter().map(|l| BigUint::from(*l)).collect()
}

/// Little-endian fixed-width limb decomposition of a big integer.
pub fn to_le_limbs(value: &BigUint, width: u32, count: usize) -> Vec<u64> {
    let mask = if width == 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    };
    (0..count)
        .map(|i| {
            let shifted = value >> (width as u64 * i as u64);
            let low: BigUint = shifted & BigUint::from(mask);
            low.iter_u64_digits().next().unwrap_or(0)
        })
        .collect()
}
