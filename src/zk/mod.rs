//! Circuit input construction.
//!
//! Turns `(JWT, salt, ephemeral key, max_epoch, randomness, RSA key)` into
//! the named witness signals plus the identity-derived proof fields. The
//! transformation is bit-exact against the fixed circuit: every constant in
//! [`input`] is load-bearing.

pub mod input;

pub use input::{generate_zk_input, ZkInputRequest, ZkInputResult};
