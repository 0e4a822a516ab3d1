//! Typed circuit-input record.
//!
//! The witness file the prover consumes is a flat JSON object keyed by
//! signal name. Modeling it as a struct with one named field per signal
//! (instead of a free-form map) closes the key-spelling class of bugs; the
//! serde field names below are the exact key set the prover expects.
//!
//! Every numeric value is a decimal string and byte arrays are arrays of
//! decimal strings, matching the witness parser.

use serde::{Deserialize, Serialize};

/// The full set of named circuit input signals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitInputs {
    // Global binding
    pub all_inputs_hash: String,
    pub salt: String,
    pub max_epoch: String,
    pub jwt_randomness: String,
    /// `[K >> 128, K mod 2^128]` of the scheme-prefixed ephemeral key.
    pub eph_public_key: [String; 2],

    // RSA key material, little-endian 64-bit limbs
    pub modulus: Vec<String>,
    pub signature: Vec<String>,

    // SHA-256 padded unsigned JWT
    pub padded_unsigned_jwt: Vec<String>,
    pub payload_len: String,
    pub num_sha2_blocks: String,
    pub payload_start_index: String,

    // Key claim ("sub")
    pub ext_kc: Vec<String>,
    pub ext_kc_length: String,
    pub kc_index_b64: String,
    pub kc_length_b64: String,
    pub kc_name_length: String,
    pub kc_colon_index: String,
    pub kc_value_index: String,
    pub kc_value_length: String,

    // Nonce claim at its narrow pad
    pub ext_nonce: Vec<String>,
    pub ext_nonce_length: String,
    pub nonce_index_b64: String,
    pub nonce_length_b64: String,
    pub nonce_colon_index: String,
    pub nonce_value_index: String,

    // Nonce claim again at the extra-value pad
    pub ext_ev: Vec<String>,
    pub ext_ev_length: String,
    pub ev_index_b64: String,
    pub ev_length_b64: String,
    pub ev_name_length: String,
    pub ev_colon_index: String,
    pub ev_value_index: String,
    pub ev_value_length: String,

    // Audience claim
    pub ext_aud: Vec<String>,
    pub ext_aud_length: String,
    pub aud_index_b64: String,
    pub aud_length_b64: String,
    pub aud_colon_index: String,
    pub aud_value_index: String,
    pub aud_value_length: String,

    // Issuer claim (indices only; the value is hashed separately)
    pub iss_index_b64: String,
    pub iss_length_b64: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_exact_key_set() {
        let inputs = CircuitInputs::default();
        let json = serde_json::to_value(&inputs).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        let expected = [
            "all_inputs_hash",
            "salt",
            "max_epoch",
            "jwt_randomness",
            "eph_public_key",
            "modulus",
            "signature",
            "padded_unsigned_jwt",
            "payload_len",
            "num_sha2_blocks",
            "payload_start_index",
            "ext_kc",
            "ext_kc_length",
            "kc_index_b64",
            "kc_length_b64",
            "kc_name_length",
            "kc_colon_index",
            "kc_value_index",
            "kc_value_length",
            "ext_nonce",
            "ext_nonce_length",
            "nonce_index_b64",
            "nonce_length_b64",
            "nonce_colon_index",
            "nonce_value_index",
            "ext_ev",
            "ext_ev_length",
            "ev_index_b64",
            "ev_length_b64",
            "ev_name_length",
            "ev_colon_index",
            "ev_value_index",
            "ev_value_length",
            "ext_aud",
            "ext_aud_length",
            "aud_index_b64",
            "aud_length_b64",
            "aud_colon_index",
            "aud_value_index",
            "aud_value_length",
            "iss_index_b64",
            "iss_length_b64",
        ];
        assert_eq!(keys.len(), expected.len());
        for key in expected {
            assert!(keys.contains(&key), "missing signal key {key}");
        }
    }

    #[test]
    fn eph_public_key_is_a_pair() {
        let inputs = CircuitInputs {
            eph_public_key: ["1".into(), "2".into()],
            ..Default::default()
        };
        let json = serde_json::to_value(&inputs).unwrap();
        assert_eq!(json["eph_public_key"].as_array().unwrap().len(), 2);
    }
}
