//! The ZK input builder.
//!
//! A pure function of its arguments plus the resolved JWKS entry: no
//! clocks, no randomness, no ambient state. Given identical inputs it
//! returns bitwise identical output.

use ark_bn254::Fr;
use num_bigint::BigUint;

use crate::crypto::bits::{bytes_to_digits, limbs_to_digits, to_le_limbs};
use crate::crypto::{
    convert_base, ephemeral_key_bytes, ephemeral_key_halves, fr_from_biguint, fr_to_decimal,
    poseidon_hash,
};
use crate::domain::{CircuitInputs, IssBase64Details, ProofFields};
use crate::infra::{ProverError, Result};
use crate::jwks::{find_by_kid, Jwk};
use crate::jwt::{decode_segment, dissect, extract_claim};

// Pad widths fixed by the circuit. Deviating changes the witness layout and
// invalidates every proof.
const SUB_PAD_LEN: usize = 126;
const NONCE_PAD_LEN: usize = 44;
const EV_PAD_LEN: usize = 53;
const AUD_PAD_LEN: usize = 160;
const ISS_HASH_PAD: usize = 224;
const KC_NAME_HASH_PAD: usize = 32;
const KC_VALUE_HASH_PAD: usize = 115;
const AUD_VALUE_HASH_PAD: usize = 145;
const HEADER_HASH_PAD: usize = 248;
const SHA_PADDED_JWT_LEN: usize = 1600;
const IN_BASE: u32 = 8;
const OUT_BASE: u32 = 248;
const RSA_LIMB_BITS: u32 = 64;

/// Arguments to [`generate_zk_input`].
#[derive(Debug, Clone)]
pub struct ZkInputRequest<'a> {
    pub jwt: &'a str,
    /// Opaque decimal string from the salt oracle.
    pub salt: &'a str,
    /// `0x` + 64 hex chars of the Ed25519 ephemeral key.
    pub ephemeral_public_key: &'a str,
    /// Decimal string.
    pub max_epoch: &'a str,
    /// Decimal string.
    pub randomness: &'a str,
    pub jwks: &'a [Jwk],
}

/// Builder output: the witness signals and the proof fields the chain
/// consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct ZkInputResult {
    pub inputs: CircuitInputs,
    pub fields: ProofFields,
}

/// Compose all circuit signals for one token.
pub fn generate_zk_input(request: &ZkInputRequest<'_>) -> Result<ZkInputResult> {
    let parts = dissect(request.jwt)?;

    // RSA key material, little-endian 64-bit limbs.
    let jwk = find_by_kid(request.jwks, &parts.kid)?;
    let modulus = BigUint::from_bytes_be(&decode_segment(&jwk.n)?);
    let signature = BigUint::from_bytes_be(&decode_segment(&parts.signature_b64)?);
    let limb_count = modulus.bits().div_ceil(u64::from(RSA_LIMB_BITS)) as usize;
    let modulus_limbs = to_le_limbs(&modulus, RSA_LIMB_BITS, limb_count);
    let signature_limbs = to_le_limbs(&signature, RSA_LIMB_BITS, limb_count);

    // SHA-256 padded unsigned token.
    let unsigned_jwt = format!("{}.{}", parts.header_b64, parts.payload_b64);
    let (padded_jwt, num_sha2_blocks) = sha256_pad(unsigned_jwt.as_bytes(), SHA_PADDED_JWT_LEN)?;
    let payload_start_index = parts.header_b64.len() + 1;

    // Claim locators.
    let kc = extract_claim(&parts, "sub", SUB_PAD_LEN)?;
    let nonce = extract_claim(&parts, "nonce", NONCE_PAD_LEN)?;
    let ev = extract_claim(&parts, "nonce", EV_PAD_LEN)?;
    let aud = extract_claim(&parts, "aud", AUD_PAD_LEN)?;
    let iss = extract_claim(&parts, "iss", AUD_PAD_LEN)?;

    // Ephemeral key halves.
    let key_bytes = ephemeral_key_bytes(request.ephemeral_public_key)?;
    let (eph_high, eph_low) = ephemeral_key_halves(&key_bytes);

    // Field hashes.
    let iss_span = request
        .jwt
        .get(iss.index_b64..iss.index_b64 + iss.length_b64)
        .ok_or_else(|| ProverError::Internal("iss span outside jwt".to_string()))?;
    let iss_field = hash_ascii_to_field(iss_span.as_bytes(), ISS_HASH_PAD)?;
    let kc_name_field = hash_ascii_to_field(b"sub", KC_NAME_HASH_PAD)?;
    let kc_value_field = hash_ascii_to_field(parts.claims.sub.as_bytes(), KC_VALUE_HASH_PAD)?;
    let aud_value_field = hash_ascii_to_field(parts.claims.aud.as_bytes(), AUD_VALUE_HASH_PAD)?;
    let header_field = hash_ascii_to_field(parts.header_b64.as_bytes(), HEADER_HASH_PAD)?;
    let modulus_field = {
        let mut digits = limbs_to_digits(&modulus_limbs);
        digits.reverse();
        hash_wide_digits(&digits, RSA_LIMB_BITS)?
    };

    // Address seed: identity plus salt, nothing ephemeral.
    let salt_int = BigUint::from_bytes_be(request.salt.as_bytes());
    let salt_hash = poseidon_hash(&[fr_from_biguint(&salt_int)])?;
    let address_seed = poseidon_hash(&[kc_name_field, kc_value_field, aud_value_field, salt_hash])?;

    let iss_mod_4 = ((iss.index_b64 - payload_start_index) % 4) as u8;

    let max_epoch = parse_decimal(request.max_epoch, "max_epoch")?;
    let all_inputs_hash = poseidon_hash(&[
        fr_from_biguint(&eph_high),
        fr_from_biguint(&eph_low),
        address_seed,
        fr_from_biguint(&max_epoch),
        iss_field,
        Fr::from(u64::from(iss_mod_4)),
        header_field,
        modulus_field,
    ])?;

    // Validate the shape of the randomness even though it passes through.
    parse_decimal(request.randomness, "randomness")?;

    let inputs = CircuitInputs {
        all_inputs_hash: fr_to_decimal(&all_inputs_hash),
        salt: salt_int.to_str_radix(10),
        max_epoch: request.max_epoch.to_string(),
        jwt_randomness: request.randomness.to_string(),
        eph_public_key: [eph_high.to_str_radix(10), eph_low.to_str_radix(10)],
        modulus: decimal_limbs(&modulus_limbs),
        signature: decimal_limbs(&signature_limbs),
        padded_unsigned_jwt: decimal_bytes(&padded_jwt),
        payload_len: parts.payload_b64.len().to_string(),
        num_sha2_blocks: num_sha2_blocks.to_string(),
        payload_start_index: payload_start_index.to_string(),
        ext_kc: decimal_bytes(&kc.padded),
        ext_kc_length: kc.length.to_string(),
        kc_index_b64: kc.index_b64.to_string(),
        kc_length_b64: kc.length_b64.to_string(),
        kc_name_length: kc.name_length.to_string(),
        kc_colon_index: kc.colon_index.to_string(),
        kc_value_index: kc.value_index.to_string(),
        kc_value_length: kc.value_length.to_string(),
        ext_nonce: decimal_bytes(&nonce.padded),
        ext_nonce_length: nonce.length.to_string(),
        nonce_index_b64: nonce.index_b64.to_string(),
        nonce_length_b64: nonce.length_b64.to_string(),
        nonce_colon_index: nonce.colon_index.to_string(),
        nonce_value_index: nonce.value_index.to_string(),
        ext_ev: decimal_bytes(&ev.padded),
        ext_ev_length: ev.length.to_string(),
        ev_index_b64: ev.index_b64.to_string(),
        ev_length_b64: ev.length_b64.to_string(),
        ev_name_length: ev.name_length.to_string(),
        ev_colon_index: ev.colon_index.to_string(),
        ev_value_index: ev.value_index.to_string(),
        ev_value_length: ev.value_length.to_string(),
        ext_aud: decimal_bytes(&aud.padded),
        ext_aud_length: aud.length.to_string(),
        aud_index_b64: aud.index_b64.to_string(),
        aud_length_b64: aud.length_b64.to_string(),
        aud_colon_index: aud.colon_index.to_string(),
        aud_value_index: aud.value_index.to_string(),
        aud_value_length: aud.value_length.to_string(),
        iss_index_b64: iss.index_b64.to_string(),
        iss_length_b64: iss.length_b64.to_string(),
    };

    let fields = ProofFields {
        address_seed: fr_to_decimal(&address_seed),
        header: fr_to_decimal(&header_field),
        iss_base64_details: IssBase64Details {
            value: fr_to_decimal(&iss_field),
            index_mod_4: iss_mod_4,
        },
    };

    Ok(ZkInputResult { inputs, fields })
}

/// SHA-256 message padding, then zero-fill to the circuit's fixed width.
///
/// Appends the 1-bit, zero bits to 448 mod 512, and the 64-bit big-endian
/// bit length; returns the byte vector and the number of 512-bit blocks the
/// message occupies.
fn sha256_pad(message: &[u8], total_len: usize) -> Result<(Vec<u8>, usize)> {
    let bit_len = message.len() as u64 * 8;
    let mut padded = message.to_vec();
    padded.push(0x80);
    while padded.len() * 8 % 512 != 448 {
        padded.push(0);
    }
    padded.extend_from_slice(&bit_len.to_be_bytes());
    let blocks = padded.len() * 8 / 512;
    if padded.len() > total_len {
        return Err(ProverError::InvalidJwtShape(format!(
            "unsigned jwt occupies {} bytes after padding, circuit limit is {total_len}",
            padded.len()
        )));
    }
    padded.resize(total_len, 0);
    Ok((padded, blocks))
}

/// `poseidon(convert_base(pad(ascii).reverse(), 8, 248))`.
fn hash_ascii_to_field(ascii: &[u8], pad_len: usize) -> Result<Fr> {
    if ascii.len() > pad_len {
        return Err(ProverError::InvalidJwtShape(format!(
            "value of {} bytes exceeds hash pad {pad_len}",
            ascii.len()
        )));
    }
    let mut padded = ascii.to_vec();
    padded.resize(pad_len, 0);
    padded.reverse();
    hash_wide_digits(&bytes_to_digits(&padded), IN_BASE)
}

fn hash_wide_digits(digits_le: &[BigUint], width: u32) -> Result<Fr> {
    let packed: Vec<Fr> = convert_base(digits_le, width, OUT_BASE)
        .iter()
        .map(fr_from_biguint)
        .collect();
    poseidon_hash(&packed)
}

fn parse_decimal(value: &str, what: &str) -> Result<BigUint> {
    BigUint::parse_bytes(value.as_bytes(), 10)
        .ok_or_else(|| ProverError::Configuration(format!("{what} is not a decimal string")))
}

fn decimal_bytes(bytes: &[u8]) -> Vec<String> {
    bytes.iter().map(|b| b.to_string()).collect()
}

fn decimal_limbs(limbs: &[u64]) -> Vec<String> {
    limbs.iter().map(|l| l.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha_padding_is_standard() {
        // 3-byte message: 1 block, length field at the tail.
        let (padded, blocks) = sha256_pad(b"abc", 64).unwrap();
        assert_eq!(blocks, 1);
        assert_eq!(padded.len(), 64);
        assert_eq!(padded[3], 0x80);
        assert_eq!(&padded[56..64], &(24u64).to_be_bytes());
    }

    #[test]
    fn sha_padding_rolls_to_next_block_at_the_boundary() {
        // 56 bytes leave no room for the length field in the first block.
        let message = vec![0x61u8; 56];
        let (padded, blocks) = sha256_pad(&message, 128).unwrap();
        assert_eq!(blocks, 2);
        assert_eq!(padded[56], 0x80);
        assert_eq!(&padded[120..128], &(448u64).to_be_bytes());
    }

    #[test]
    fn sha_padding_zero_fills_to_circuit_width() {
        let (padded, _) = sha256_pad(b"abc", 1600).unwrap();
        assert_eq!(padded.len(), 1600);
        assert!(padded[64..].iter().all(|&b| b == 0));
    }

    #[test]
    fn sha_padding_rejects_oversized_messages() {
        let message = vec![0u8; 1600];
        assert!(sha256_pad(&message, 1600).is_err());
    }

    #[test]
    fn ascii_hash_is_deterministic_and_pad_sensitive() {
        let a = hash_ascii_to_field(b"sub", 32).unwrap();
        let b = hash_ascii_to_field(b"sub", 32).unwrap();
        let c = hash_ascii_to_field(b"sub", 115).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn ascii_hash_rejects_value_wider_than_pad() {
        assert!(hash_ascii_to_field(&[1u8; 33], 32).is_err());
    }

    #[test]
    fn header_hash_pad_packs_into_eight_elements() {
        // 248 bytes at 8 bits repack into exactly 8 digits of 248 bits;
        // reaching the hasher at arity 8 keeps it a single permutation.
        let digits = bytes_to_digits(&[0u8; HEADER_HASH_PAD]);
        assert_eq!(convert_base(&digits, 8, 248).len(), 8);
    }
}
