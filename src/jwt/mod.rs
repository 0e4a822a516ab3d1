//! JWT dissection.
//!
//! The circuit proves statements about byte ranges of the token, so parsing
//! here returns more than decoded claims: every tracked claim comes with a
//! locator describing its ASCII run in the decoded payload and the base64
//! span covering that run inside the token itself.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::Algorithm;
use serde_json::Value;

use crate::infra::{ProverError, Result};

/// Decoded token with the literal segments preserved.
#[derive(Debug, Clone)]
pub struct JwtParts {
    pub header_b64: String,
    pub payload_b64: String,
    pub signature_b64: String,
    /// `payload_b64` decoded to raw bytes.
    pub payload_bin: Vec<u8>,
    /// Key id from the protected header.
    pub kid: String,
    pub claims: TokenClaims,
}

/// The claim set this pipeline consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub nonce: String,
}

/// Where a claim lives, in both decoded-byte and base64 coordinates.
///
/// `bytes` is the claim run including its leading quote, name, colon,
/// quoted value and trailing comma, e.g. `"sub":"12345",`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimLocator {
    pub bytes: Vec<u8>,
    /// `bytes` zero-padded to the requested width.
    pub padded: Vec<u8>,
    /// Length of `bytes` before padding.
    pub length: usize,
    /// Start of the covering base64 span, absolute within the JWT.
    pub index_b64: usize,
    pub length_b64: usize,
    /// Quoted name length (`|name| + 2`).
    pub name_length: usize,
    pub colon_index: usize,
    pub value_index: usize,
    /// Quoted value length, both quotes included.
    pub value_length: usize,
}

/// Decode a base64url segment, tolerating explicit padding.
pub fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| ProverError::InvalidJwtShape(format!("bad base64 segment: {e}")))
}

/// Split and decode a JWT, validating the header without verifying the
/// signature (signature verification is the circuit's job).
pub fn dissect(jwt: &str) -> Result<JwtParts> {
    let segments: Vec<&str> = jwt.split('.').collect();
    let (header_b64, payload_b64, signature_b64) = match segments.as_slice() {
        &[header, payload, signature] => (header, payload, signature),
        _ => {
            return Err(ProverError::InvalidJwtShape(format!(
                "expected 3 segments, found {}",
                segments.len()
            )))
        }
    };

    let header = jsonwebtoken::decode_header(jwt)
        .map_err(|e| ProverError::InvalidJwtShape(format!("bad header: {e}")))?;
    if header.alg != Algorithm::RS256 {
        return Err(ProverError::InvalidJwtShape(format!(
            "unsupported algorithm {:?}",
            header.alg
        )));
    }
    let kid = header
        .kid
        .ok_or_else(|| ProverError::InvalidJwtShape("header missing kid".to_string()))?;

    let payload_bin = decode_segment(payload_b64)?;
    let payload: Value = serde_json::from_slice(&payload_bin)
        .map_err(|e| ProverError::InvalidJwtShape(format!("payload is not JSON: {e}")))?;

    let claims = TokenClaims {
        iss: string_claim(&payload, "iss")?,
        aud: string_claim(&payload, "aud")?,
        sub: string_claim(&payload, "sub")?,
        nonce: string_claim(&payload, "nonce")?,
    };

    Ok(JwtParts {
        header_b64: header_b64.to_string(),
        payload_b64: payload_b64.to_string(),
        signature_b64: signature_b64.to_string(),
        payload_bin,
        kid,
        claims,
    })
}

fn string_claim(payload: &Value, name: &str) -> Result<String> {
    let value = payload
        .get(name)
        .ok_or_else(|| ProverError::MissingClaim(name.to_string()))?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ProverError::InvalidJwtShape(format!("claim {name} is not a string")))
}

/// Base64 span `[start, end)` covering `len` bytes at byte offset `offset`
/// of the decoded stream.
fn base64_span(offset: usize, len: usize) -> (usize, usize) {
    let start = offset / 3 * 4 + offset % 3;
    let end_byte = offset + len;
    let align = if end_byte % 3 == 0 {
        0
    } else {
        1 + end_byte % 3
    };
    (start, end_byte / 3 * 4 + align)
}

/// Locate a claim inside the decoded payload and compute its locator at the
/// given pad width.
pub fn extract_claim(parts: &JwtParts, name: &str, pad_len: usize) -> Result<ClaimLocator> {
    let payload = &parts.payload_bin;
    let needle = name.as_bytes();
    let pos = payload
        .windows(needle.len())
        .position(|w| w == needle)
        .ok_or_else(|| ProverError::MissingClaim(name.to_string()))?;

    let start = pos
        .checked_sub(2)
        .ok_or_else(|| ProverError::InvalidJwtShape(format!("claim {name} at payload start")))?;
    let rel_end = payload[pos + 1..]
        .iter()
        .position(|&b| b == b',')
        .ok_or_else(|| {
            ProverError::InvalidJwtShape(format!("claim {name} has no trailing comma"))
        })?;
    let end = pos + rel_end + 2;

    // Drop the byte preceding the opening quote; keep the trailing comma.
    let bytes = payload[start + 1..end].to_vec();
    let length = bytes.len();
    if length > pad_len {
        return Err(ProverError::InvalidJwtShape(format!(
            "claim {name} exceeds pad width {pad_len}"
        )));
    }

    let offset = start + 1;
    let (b64_start, b64_end) = base64_span(offset, length);
    let index_b64 = b64_start + parts.header_b64.len() + 1;

    let colon_index = bytes
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| ProverError::InvalidJwtShape(format!("claim {name} has no colon")))?;
    let value_index = colon_index + 1;
    let closing = bytes
        .get(value_index + 1..)
        .and_then(|rest| rest.iter().position(|&b| b == b'"'))
        .ok_or_else(|| {
            ProverError::InvalidJwtShape(format!("claim {name} value is not quoted"))
        })?;
    let value_length = closing + 2;

    let mut padded = bytes.clone();
    padded.resize(pad_len, 0);

    Ok(ClaimLocator {
        bytes,
        padded,
        length,
        index_b64,
        length_b64: b64_end - b64_start,
        name_length: name.len() + 2,
        colon_index,
        value_index,
        value_length,
    })
}
