//! # ctoken-prover: confidential action construction
//!
//! Client-side construction of issue and transfer actions over Pedersen
//! commitments to `(type, value)`:
//!
//! - [`Issuer::generate_issue`] commits fresh outputs of one hidden type
//! - [`Sender::generate_transfer`] spends opened inputs into fresh outputs,
//!   proving balance, range and type consistency without revealing any of them
//! - [`sign_action`] produces the detached signatures authorizing an action
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ctoken_prover::{Issuer, Sender};
//!
//! let issuer = Issuer::new(&pp, issuer_identity);
//! let (issue, issue_md) = issuer.generate_issue("USD", &[100], &[alice.clone()], &mut rng)?;
//!
//! let sender = Sender::new(&pp, ids, issue.outputs.clone(), openings)?;
//! let (transfer, transfer_md) = sender.generate_transfer(&[60, 40], &[bob, alice], &mut rng)?;
//! ```
//!
//! ## Security Notes
//!
//! - All blinding factors and sigma nonces use full 256-bit entropy
//! - Range proofs are Bulletproofs over `C - T` with `pp.bit_length` bits
//! - Range proofs are bound to the sigma transcript through 32 context bytes

mod issue;
mod range;
mod signing;
mod transfer;
#[cfg(test)]
mod tests;

use curve25519_dalek::scalar::Scalar;
use rand::RngCore;
use thiserror::Error;

pub use issue::Issuer;
pub use signing::sign_action;
pub use transfer::{OutputSpec, Sender};

#[derive(Debug, Error)]
pub enum ProverError {
    #[error("malformed input: {0}")]
    Malformed(&'static str),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("opening {index} does not match its input token")]
    OpeningMismatch { index: usize },
    #[error("value {value} exceeds the maximum {max}")]
    OutOfRange { value: u64, max: u64 },
    #[error("type {token_type} is unbalanced: inputs {inputs}, outputs {outputs}")]
    Unbalanced {
        token_type: String,
        inputs: u128,
        outputs: u128,
    },
    #[error("mixed token types are not allowed by the public parameters")]
    MixedTypes,
    #[error("range proof failed: {0}")]
    RangeProof(&'static str),
}

/// Generate a random scalar with full 256-bit entropy.
fn random_scalar<R: RngCore>(rng: &mut R) -> Scalar {
    let mut bytes = [0u8; 64];
    rng.fill_bytes(&mut bytes);
    Scalar::from_bytes_mod_order_wide(&bytes)
}
