//! Poseidon hash over the BN254 scalar field.
//!
//! Uses the circuit's parameterisation: width `t = arity + 1`, 8 full
//! rounds, partial rounds from the standard table, round constants and the
//! Cauchy MDS matrix derived by the Grain LFSR procedure that produced the
//! circomlib constant set. Parameters are generated on first use per width
//! and cached for the process lifetime, so repeated hashing pays only the
//! permutation.
//!
//! Arities 1..=16 run a single permutation. Arities 17..=32 split in half,
//! hash each half and combine the two digests at arity 2. Larger inputs are
//! a programmer error.

use ark_bn254::Fr;
use ark_ff::{Field, Zero};
use num_bigint::BigUint;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::infra::{ProverError, Result};

use super::{field_modulus, fr_from_biguint};

/// Partial-round counts for widths 2..=17, indexed by `t - 2`.
const N_ROUNDS_P: [usize; 16] = [56, 57, 56, 60, 60, 63, 64, 63, 60, 66, 60, 65, 70, 60, 64, 68];

/// Full rounds, split evenly around the partial rounds.
const N_ROUNDS_F: usize = 8;

/// Largest arity served by a single permutation.
pub const MAX_DIRECT_ARITY: usize = 16;

/// Largest arity served at all; one level of two-way recursion.
pub const MAX_ARITY: usize = 32;

/// Bits sampled per field element.
const SAMPLE_BITS: usize = 254;

/// Grain LFSR in self-shrinking mode, seeded from the hash instance
/// descriptor. This is the generator behind the published circomlib
/// constants; field = GF(p), S-box = x^5.
struct GrainLfsr {
    state: [bool; 80],
    head: usize,
}

impl GrainLfsr {
    fn new(t: usize, r_f: usize, r_p: usize) -> Self {
        let mut bits = Vec::with_capacity(80);
        push_bits(&mut bits, 1, 2); // field tag: prime field
        push_bits(&mut bits, 0, 4); // sbox tag: x^alpha
        push_bits(&mut bits, SAMPLE_BITS as u64, 12);
        push_bits(&mut bits, t as u64, 12);
        push_bits(&mut bits, r_f as u64, 10);
        push_bits(&mut bits, r_p as u64, 10);
        bits.extend(std::iter::repeat(true).take(30));
        debug_assert_eq!(bits.len(), 80);

        let mut state = [false; 80];
        state.copy_from_slice(&bits);
        let mut lfsr = Self { state, head: 0 };
        for _ in 0..160 {
            lfsr.update();
        }
        lfsr
    }

    /// One LFSR step: feedback taps at offsets 62, 51, 38, 23, 13, 0.
    fn update(&mut self) -> bool {
        let at = |offset: usize| self.state[(self.head + offset) % 80];
        let new = at(62) ^ at(51) ^ at(38) ^ at(23) ^ at(13) ^ at(0);
        self.state[self.head] = new;
        self.head = (self.head + 1) % 80;
        new
    }

    /// Self-shrinking output: of each bit pair, the first selects and the
    /// second is emitted.
    fn next_bit(&mut self) -> bool {
        loop {
            let select = self.update();
            let output = self.update();
            if select {
                return output;
            }
        }
    }

    /// Sample `n` bits, most significant first.
    fn random_bits(&mut self, n: usize) -> BigUint {
        let mut value = BigUint::default();
        for _ in 0..n {
            value <<= 1u8;
            if self.next_bit() {
                value += 1u8;
            }
        }
        value
    }

    /// Round-constant sampling: rejection above the field modulus.
    fn field_element(&mut self, modulus: &BigUint) -> Fr {
        loop {
            let candidate = self.random_bits(SAMPLE_BITS);
            if &candidate < modulus {
                return fr_from_biguint(&candidate);
            }
        }
    }

    /// MDS coordinate sampling: plain reduction, per the generator.
    fn field_element_reduced(&mut self) -> Fr {
        fr_from_biguint(&self.random_bits(SAMPLE_BITS))
    }
}

fn push_bits(out: &mut Vec<bool>, value: u64, width: usize) {
    for i in (0..width).rev() {
        out.push((value >> i) & 1 == 1);
    }
}

/// Round constants and MDS matrix for one width.
struct PoseidonParams {
    t: usize,
    r_p: usize,
    round_constants: Vec<Fr>,
    mds: Vec<Vec<Fr>>,
}

impl PoseidonParams {
    fn generate(t: usize) -> Self {
        let r_p = N_ROUNDS_P[t - 2];
        let modulus = field_modulus();
        let mut lfsr = GrainLfsr::new(t, N_ROUNDS_F, r_p);

        let round_constants = (0..(N_ROUNDS_F + r_p) * t)
            .map(|_| lfsr.field_element(&modulus))
            .collect();

        let xs: Vec<Fr> = (0..t).map(|_| lfsr.field_element_reduced()).collect();
        let ys: Vec<Fr> = (0..t).map(|_| lfsr.field_element_reduced()).collect();
        let mds = xs
            .iter()
            .map(|x| {
                ys.iter()
                    .map(|y| {
                        (*x + *y)
                            .inverse()
                            .expect("cauchy matrix entries are invertible")
                    })
                    .collect()
            })
            .collect();

        Self {
            t,
            r_p,
            round_constants,
            mds,
        }
    }
}

fn params_for(t: usize) -> Arc<PoseidonParams> {
    static CACHE: OnceLock<Mutex<HashMap<usize, Arc<PoseidonParams>>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(
        guard
            .entry(t)
            .or_insert_with(|| Arc::new(PoseidonParams::generate(t))),
    )
}

fn pow5(x: Fr) -> Fr {
    x.square().square() * x
}

/// The circomlib reference permutation: per round, add round constants,
/// apply the S-box (all cells in full rounds, cell 0 in partial rounds),
/// then mix through the MDS matrix. Output is cell 0.
fn permute(params: &PoseidonParams, state: &mut Vec<Fr>) {
    let t = params.t;
    let half_full = N_ROUNDS_F / 2;
    for round in 0..N_ROUNDS_F + params.r_p {
        for (i, cell) in state.iter_mut().enumerate() {
            *cell += params.round_constants[round * t + i];
        }
        if round < half_full || round >= half_full + params.r_p {
            for cell in state.iter_mut() {
                *cell = pow5(*cell);
            }
        } else {
            state[0] = pow5(state[0]);
        }
        let mut mixed = vec![Fr::zero(); t];
        for (i, row) in params.mds.iter().enumerate() {
            let mut acc = Fr::zero();
            for (j, coeff) in row.iter().enumerate() {
                acc += *coeff * state[j];
            }
            mixed[i] = acc;
        }
        *state = mixed;
    }
}

fn hash_direct(inputs: &[Fr]) -> Fr {
    let params = params_for(inputs.len() + 1);
    let mut state = Vec::with_capacity(inputs.len() + 1);
    state.push(Fr::zero());
    state.extend_from_slice(inputs);
    permute(&params, &mut state);
    state[0]
}

/// Variable-arity Poseidon hash.
///
/// # Errors
///
/// [`ProverError::EmptyInput`] for zero inputs and
/// [`ProverError::HashArityUnsupported`] above [`MAX_ARITY`].
pub fn poseidon_hash(inputs: &[Fr]) -> Result<Fr> {
    match inputs.len() {
        0 => Err(ProverError::EmptyInput),
        n if n <= MAX_DIRECT_ARITY => Ok(hash_direct(inputs)),
        n if n <= MAX_ARITY => {
            let mid = n / 2;
            let left = hash_direct(&inputs[..mid]);
            let right = hash_direct(&inputs[mid..]);
            Ok(hash_direct(&[left, right]))
        }
        n => Err(ProverError::HashArityUnsupported(n)),
    }
}
