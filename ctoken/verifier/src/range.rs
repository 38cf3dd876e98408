use bulletproofs::{BulletproofGens, PedersenGens, RangeProof};
use ctoken_primitives::{PublicParameters, labels, point_to_bytes};
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek_ng as dalek_ng;

fn to_ng(p: &RistrettoPoint) -> Option<dalek_ng::ristretto::RistrettoPoint> {
    dalek_ng::ristretto::CompressedRistretto(point_to_bytes(p)).decompress()
}

/// Check a single-value Bulletproof over `commit` (must mirror the prover's
/// range transcript: label, sigma context, output index, commitment).
pub(crate) fn verify_range(
    pp: &PublicParameters,
    ctx_bytes: &[u8; 32],
    index: u64,
    commit: &RistrettoPoint,
    proof_bytes: &[u8],
) -> bool {
    let Ok(proof) = RangeProof::from_bytes(proof_bytes) else {
        return false;
    };
    let (Some(b), Some(b_blinding)) = (to_ng(&pp.generators.G_value), to_ng(&pp.generators.H))
    else {
        return false;
    };

    let commit_bytes = point_to_bytes(commit);
    let mut t = merlin::Transcript::new(labels::RANGE);
    t.append_message(b"label", labels::RANGE_OUTPUT);
    t.append_message(b"ctx", ctx_bytes);
    t.append_message(b"index", &index.to_le_bytes());
    t.append_message(b"commit", &commit_bytes);

    let pg = PedersenGens { B: b, B_blinding: b_blinding };
    let bp_gens = BulletproofGens::new(64, 1);
    proof
        .verify_single(
            &bp_gens,
            &pg,
            &mut t,
            &dalek_ng::ristretto::CompressedRistretto(commit_bytes),
            pp.bit_length,
        )
        .is_ok()
}
