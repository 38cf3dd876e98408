//! ctoken-primitives
//!
//! Shared primitives for confidential fungible tokens.
//! - Pedersen public parameters over Ristretto255 committing to (type, value)
//! - Public token, opening and action types with stable serde layouts
//! - Canonical Merlin transcript labels + bind order for domain separation
//! - Signer / verifier capabilities over opaque identity bytes
//!
//! Use this crate from the prover, the verifier/auditor and the transaction
//! services alike. Both sides of every proof MUST use the same generators and
//! the same transcript labels.

pub mod action;
pub mod codec;
pub mod identity;
pub mod params;
pub mod request;
pub mod token;


use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
};
use merlin::Transcript;
use subtle::ConstantTimeEq;
use thiserror::Error;

pub use action::{
    Action, BalanceProof, IssueAction, IssueProof, RangeProofBytes, RepresentationProof,
    TransferAction, TransferProof, TypeGroup,
};
pub use identity::{
    AuditInfo, Ed25519Signer, Ed25519Verifier, Identity, Signer, SigningError, Verifier,
    signing_message,
};
pub use params::{Generators, ParamsError, PublicParameters, hash_to_scalar};
pub use request::{
    IssueMetadata, OutputMetadata, TokenRequest, TokenRequestMetadata, TransferMetadata,
};
pub use token::{Token, TokenId, TokenOpening};

/// 32-byte compressed Ristretto encoding.
pub type CompressedPoint = [u8; 32];

/// Version/tag of this protocol instance. Bump on any incompatible change.
pub const SDK_VERSION: u32 = 1;

/// Domain / label strings. KEEP STABLE.
pub mod labels {
    pub const PROTOCOL: &[u8] = b"ctoken-pedersen";
    pub const PROTOCOL_V: &[u8] = b"ctoken-pedersen/v1";

    // generator derivation
    pub const GEN_TYPE: &[u8] = b"ctoken/G_type";
    pub const GEN_VALUE: &[u8] = b"ctoken/G_value";
    pub const GEN_BLINDING: &[u8] = b"ctoken/H";
    pub const TYPE_HASH: &[u8] = b"ctoken/type";

    // owner disclosure to the auditor
    pub const AUDIT_INFO: &[u8] = b"ctoken/audit_info";

    // transcript sections
    pub const SECTION_ISSUE: &[u8] = b"issue";
    pub const SECTION_TRANSFER: &[u8] = b"transfer";

    // range proof transcripts
    pub const RANGE: &[u8] = b"bp";
    pub const RANGE_OUTPUT: &[u8] = b"range_out";

    // challenge labels
    pub const CHAL_ISSUE: &[u8] = b"issue_chal";
    pub const CHAL_TRANSFER: &[u8] = b"transfer_chal";
}

/// Error type shared by prover/verifier helpers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("malformed input")]
    Malformed,
}

/// ----- Merlin transcript helpers -----

/// Start a transcript seeded with the protocol label, the action section and
/// the digest of the public parameters in use.
pub fn new_transcript(pp: &PublicParameters, section: &'static [u8]) -> Transcript {
    let mut t = Transcript::new(labels::PROTOCOL);
    t.append_message(b"proto", labels::PROTOCOL_V);
    t.append_message(b"sdk_version", &SDK_VERSION.to_le_bytes());
    t.append_message(b"section", section);
    t.append_message(b"pp", &pp.digest());
    t
}

/// Append a compressed Ristretto point under a label.
pub fn append_point(t: &mut Transcript, label: &'static [u8], p: &RistrettoPoint) {
    t.append_message(label, p.compress().as_bytes());
}

/// Append a token (owner bytes + commitment) under a label.
pub fn append_token(t: &mut Transcript, label: &'static [u8], token: &Token) {
    t.append_message(label, token.owner.as_bytes());
    append_point(t, label, &token.commitment);
}

/// Bind the public statement of a transfer: spent ids, their ledger tokens
/// and the new outputs.
pub fn bind_transfer(
    t: &mut Transcript,
    inputs: &[TokenId],
    input_tokens: &[Token],
    outputs: &[Token],
) {
    t.append_message(b"n_in", &(inputs.len() as u64).to_le_bytes());
    for (id, token) in inputs.iter().zip(input_tokens) {
        t.append_message(b"in_tx", id.tx_id.as_bytes());
        t.append_message(b"in_index", &id.index.to_le_bytes());
        append_token(t, b"in", token);
    }
    t.append_message(b"n_out", &(outputs.len() as u64).to_le_bytes());
    for token in outputs {
        append_token(t, b"out", token);
    }
}

/// Bind one type group: its type commitment and index layout.
pub fn bind_group(
    t: &mut Transcript,
    type_commitment: &RistrettoPoint,
    inputs: &[u32],
    outputs: &[u32],
) {
    append_point(t, b"T", type_commitment);
    t.append_message(b"group_in", &(inputs.len() as u64).to_le_bytes());
    for i in inputs {
        t.append_message(b"i", &i.to_le_bytes());
    }
    t.append_message(b"group_out", &(outputs.len() as u64).to_le_bytes());
    for j in outputs {
        t.append_message(b"j", &j.to_le_bytes());
    }
}

/// Bind the public statement of an issue.
pub fn bind_issue(
    t: &mut Transcript,
    issuer: &Identity,
    outputs: &[Token],
    type_commitment: &RistrettoPoint,
) {
    t.append_message(b"issuer", issuer.as_bytes());
    t.append_message(b"n_out", &(outputs.len() as u64).to_le_bytes());
    for token in outputs {
        append_token(t, b"out", token);
    }
    append_point(t, b"T", type_commitment);
}

/// Derive a Fiat–Shamir challenge scalar from the transcript with a label.
pub fn challenge_scalar(t: &mut Transcript, label: &'static [u8]) -> Scalar {
    let mut buf = [0u8; 64];
    t.challenge_bytes(label, &mut buf);
    Scalar::from_bytes_mod_order_wide(&buf)
}

/// 32 context bytes squeezed from a clone of the transcript, used to bind
/// range proofs to the sigma transcript they accompany.
pub fn transcript_context_bytes(t: &Transcript) -> [u8; 32] {
    let mut clone = t.clone();
    let mut out = [0u8; 32];
    clone.challenge_bytes(b"ctx", &mut out);
    out
}

/// Constant-time equality on compressed points.
pub fn ct_eq_point(a: &RistrettoPoint, b: &RistrettoPoint) -> bool {
    a.compress()
        .as_bytes()
        .ct_eq(b.compress().as_bytes())
        .into()
}

/// ----- Encoding helpers (stable across prover/verifier) -----

/// Decode a compressed Ristretto point (32 bytes).
pub fn point_from_bytes(bytes: &CompressedPoint) -> Result<RistrettoPoint, Error> {
    CompressedRistretto(*bytes)
        .decompress()
        .ok_or(Error::Malformed)
}

/// Encode a point to 32 bytes (compressed).
pub fn point_to_bytes(p: &RistrettoPoint) -> CompressedPoint {
    *p.compress().as_bytes()
}
