use bulletproofs::{BulletproofGens, PedersenGens, RangeProof};
use ctoken_primitives::{PublicParameters, labels, point_to_bytes};
use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use curve25519_dalek_ng as dalek_ng;

use crate::ProverError;

fn to_ng(p: &RistrettoPoint) -> Result<dalek_ng::ristretto::RistrettoPoint, ProverError> {
    dalek_ng::ristretto::CompressedRistretto(point_to_bytes(p))
        .decompress()
        .ok_or(ProverError::Malformed("generator conversion"))
}

/// Single-value Bulletproof that `commit = value·G_value + blind·H` with
/// `value < 2^pp.bit_length`. The output index and the sigma transcript
/// context are folded into the range transcript (must match the verifier).
pub(crate) fn prove_range(
    pp: &PublicParameters,
    ctx_bytes: &[u8; 32],
    index: u64,
    commit: &RistrettoPoint,
    value: u64,
    blind: &Scalar,
) -> Result<Vec<u8>, ProverError> {
    if !pp.in_range(value) {
        return Err(ProverError::OutOfRange {
            value,
            max: pp.max_value(),
        });
    }

    let commit_bytes = point_to_bytes(commit);
    let mut t = merlin::Transcript::new(labels::RANGE);
    t.append_message(b"label", labels::RANGE_OUTPUT);
    t.append_message(b"ctx", ctx_bytes);
    t.append_message(b"index", &index.to_le_bytes());
    t.append_message(b"commit", &commit_bytes);

    let pg = PedersenGens {
        B: to_ng(&pp.generators.G_value)?,
        B_blinding: to_ng(&pp.generators.H)?,
    };
    let bp_gens = BulletproofGens::new(64, 1);
    let blind_ng = dalek_ng::scalar::Scalar::from_bytes_mod_order(blind.to_bytes());

    let (proof, bp_commit) =
        RangeProof::prove_single(&bp_gens, &pg, &mut t, value, &blind_ng, pp.bit_length)
            .map_err(|_| ProverError::RangeProof("bulletproof generation failed"))?;

    if bp_commit.to_bytes() != commit_bytes {
        return Err(ProverError::RangeProof("committed point mismatch"));
    }

    Ok(proof.to_bytes())
}
