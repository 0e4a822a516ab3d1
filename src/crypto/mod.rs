//! Cryptographic primitives over the BN254 scalar field.
//!
//! Everything the circuit sees passes through here: the Poseidon hash with
//! the circuit's exact parameterisation, the base conversion bridging byte
//! vectors and field-element vectors, and the nonce commitment issued at
//! login initiation.

pub mod bits;
pub mod nonce;
pub mod poseidon;

pub use bits::convert_base;
pub use nonce::{
    ephemeral_key_bytes, ephemeral_key_halves, generate_auth_state, generate_nonce,
    generate_randomness, nonce_commitment, NonceParts,
};
pub use poseidon::poseidon_hash;

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;

/// Reduce an arbitrary-size unsigned integer into the scalar field.
pub fn fr_from_biguint(value: &BigUint) -> Fr {
    Fr::from_le_bytes_mod_order(&value.to_bytes_le())
}

/// Canonical decimal-string form of a field element, as the witness file
/// carries it.
pub fn fr_to_decimal(value: &Fr) -> String {
    BigUint::from_bytes_le(&value.into_bigint().to_bytes_le()).to_str_radix(10)
}

/// The scalar field modulus as a big integer.
pub fn field_modulus() -> BigUint {
    BigUint::from_bytes_le(&Fr::MODULUS.to_bytes_le())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modulus_matches_bn254_r() {
        assert_eq!(
            field_modulus().to_str_radix(10),
            "21888242871839275222246405745257275088548364400416034343698204186575808495617"
        );
    }

    #[test]
    fn biguint_round_trip() {
        let v = BigUint::parse_bytes(b"123456789012345678901234567890", 10).unwrap();
        let fr = fr_from_biguint(&v);
        assert_eq!(fr_to_decimal(&fr), "123456789012345678901234567890");
    }

    #[test]
    fn reduction_wraps_at_the_modulus() {
        let p = field_modulus();
        let fr = fr_from_biguint(&(&p + 5u32));
        assert_eq!(fr_to_decimal(&fr), "5");
    }
}
