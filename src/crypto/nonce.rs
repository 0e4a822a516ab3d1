//! Login nonce issuance.
//!
//! The nonce is a Poseidon commitment binding the ephemeral public key and
//! `max_epoch` into the token the identity provider signs: the circuit
//! recomputes it from the same preimage, so the signed token vouches for
//! the key without naming it.

use ark_bn254::Fr;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use num_bigint::BigUint;
use rand::RngCore;

use crate::infra::{ProverError, Result};

use super::{fr_from_biguint, fr_to_decimal, poseidon_hash};

/// Scheme flag prefixed to the raw Ed25519 key in its chain byte form.
const ED25519_SCHEME_FLAG: u8 = 0x00;

/// Bits of the commitment kept in the nonce encoding (20 bytes).
const NONCE_BYTES: usize = 20;

/// A freshly issued nonce with the randomness folded into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceParts {
    pub nonce: String,
    pub randomness: String,
}

/// Parse a `0x`-prefixed 64-hex-char ephemeral public key and return its
/// 33-byte chain form (scheme flag + raw key). The bytes must decode to a
/// valid Ed25519 point.
pub fn ephemeral_key_bytes(key_str: &str) -> Result<[u8; 33]> {
    let hex_part = key_str
        .strip_prefix("0x")
        .ok_or_else(|| bad_key("missing 0x prefix"))?;
    if hex_part.len() != 64 {
        return Err(bad_key("expected 64 hex characters"));
    }
    let raw: [u8; 32] = hex::decode(hex_part)
        .map_err(|_| bad_key("invalid hex"))?
        .try_into()
        .map_err(|_| bad_key("expected 32 bytes"))?;
    ed25519_dalek::VerifyingKey::from_bytes(&raw)
        .map_err(|_| bad_key("not a valid ed25519 point"))?;
    let mut out = [0u8; 33];
    out[0] = ED25519_SCHEME_FLAG;
    out[1..].copy_from_slice(&raw);
    Ok(out)
}

fn bad_key(reason: &str) -> ProverError {
    ProverError::Configuration(format!("invalid ephemeral public key: {reason}"))
}

/// Split the key's big-endian integer form into its high and low 128-bit
/// halves, the layout the circuit consumes.
pub fn ephemeral_key_halves(key_bytes: &[u8; 33]) -> (BigUint, BigUint) {
    let k = BigUint::from_bytes_be(key_bytes);
    let low_mask = (BigUint::from(1u8) << 128u32) - 1u8;
    let low = &k & low_mask;
    let high = k >> 128u32;
    (high, low)
}

/// Fresh 16 bytes of randomness as a decimal string.
pub fn generate_randomness() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    BigUint::from_bytes_be(&bytes).to_str_radix(10)
}

/// Fresh 32-byte CSRF token, base64url without padding.
pub fn generate_auth_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the nonce commitment for a key, epoch bound and randomness:
/// `poseidon([K >> 128, K mod 2^128, max_epoch, randomness])`, low 20
/// big-endian bytes, base64url without padding.
pub fn nonce_commitment(key_str: &str, max_epoch: u64, randomness: &str) -> Result<String> {
    let key_bytes = ephemeral_key_bytes(key_str)?;
    let (high, low) = ephemeral_key_halves(&key_bytes);
    let randomness_int = BigUint::parse_bytes(randomness.as_bytes(), 10)
        .ok_or_else(|| ProverError::Configuration("randomness is not decimal".to_string()))?;

    let digest = poseidon_hash(&[
        fr_from_biguint(&high),
        fr_from_biguint(&low),
        Fr::from(max_epoch),
        fr_from_biguint(&randomness_int),
    ])?;

    let digest_int = BigUint::parse_bytes(fr_to_decimal(&digest).as_bytes(), 10)
        .ok_or_else(|| ProverError::Internal("digest decimal round trip".to_string()))?;
    let low_bits = digest_int & ((BigUint::from(1u8) << (NONCE_BYTES * 8)) - 1u8);
    let mut bytes = low_bits.to_bytes_be();
    // Fixed-width encoding: left-pad to 20 bytes.
    while bytes.len() < NONCE_BYTES {
        bytes.insert(0, 0);
    }
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Issue a nonce for an ephemeral key with fresh randomness.
pub fn generate_nonce(key_str: &str, max_epoch: u64) -> Result<NonceParts> {
    let randomness = generate_randomness();
    let nonce = nonce_commitment(key_str, max_epoch, &randomness)?;
    Ok(NonceParts { nonce, randomness })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0xfafd1d9e25a87e9652976a7bb06c2e4777c2e539d90f3ee7b6b12b9a45118a88";

    #[test]
    fn known_commitment_vector() {
        let nonce =
            nonce_commitment(KEY, 1, "29229108527107981601948220068988").unwrap();
        assert_eq!(nonce, "tVEDKlMkJkKh-sb30yM5d7HysQg");
    }

    #[test]
    fn nonce_is_27_chars_of_base64url() {
        let parts = generate_nonce(KEY, 5).unwrap();
        assert_eq!(parts.nonce.len(), 27);
        assert!(parts
            .nonce
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn back_to_back_calls_produce_distinct_nonce_and_randomness() {
        let a = generate_nonce(KEY, 1).unwrap();
        let b = generate_nonce(KEY, 1).unwrap();
        assert_ne!(a.randomness, b.randomness);
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn auth_states_are_distinct_and_url_safe() {
        let a = generate_auth_state();
        let b = generate_auth_state();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43); // 32 bytes, unpadded
        assert!(!a.contains('+') && !a.contains('/'));
    }

    #[test]
    fn key_without_prefix_is_rejected() {
        let bare = KEY.trim_start_matches("0x");
        assert!(ephemeral_key_bytes(bare).is_err());
    }

    #[test]
    fn key_with_wrong_length_is_rejected() {
        assert!(ephemeral_key_bytes("0xabcd").is_err());
    }

    #[test]
    fn scheme_flag_leads_the_chain_form() {
        let bytes = ephemeral_key_bytes(KEY).unwrap();
        assert_eq!(bytes[0], 0x00);
        assert_eq!(hex::encode(&bytes[1..]), KEY.trim_start_matches("0x"));
    }
}
