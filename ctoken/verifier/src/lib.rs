//! # ctoken-verifier: public verification of confidential actions
//!
//! Everything here runs on public data only: the public parameters and the
//! action. Any node (sender, recipient, auditor, ledger validator) can call
//! [`verify_action`] before trusting an action; repeated calls on the same
//! inputs always return the same result.
//!
//! The [`Auditor`] additionally holds the request metadata and checks every
//! opening against the ledger commitments, with conservation in the clear.

mod auditor;
mod range;
mod signature;
#[cfg(test)]
mod tests;

use ctoken_primitives::{
    Action, IssueAction, PublicParameters, TransferAction, append_point, bind_group,
    bind_issue, bind_transfer, challenge_scalar as fs_chal, ct_eq_point, labels,
    new_transcript, transcript_context_bytes,
};
use curve25519_dalek::{ristretto::RistrettoPoint, traits::IsIdentity};
use thiserror::Error;

pub use auditor::{AuditError, Auditor};
pub use signature::{verify_request, verify_signature};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("malformed action: {0}")]
    Malformed(&'static str),
    #[error("action has no inputs or outputs")]
    Empty,
    #[error("invalid type group layout: {0}")]
    GroupLayout(&'static str),
    #[error("mixed token types are not allowed by the public parameters")]
    MixedTypes,
    #[error("type commitment proof of group {group} does not verify")]
    TypeCommitment { group: usize },
    #[error("input {input} is not of its group's type")]
    TypeConsistency { input: usize },
    #[error("group {group} is not balanced")]
    Balance { group: usize },
    #[error("range proof of output {output} does not verify")]
    Range { output: usize },
    #[error("issuer is not in the issuer set")]
    UnknownIssuer,
    #[error("expected {expected} signatures, got {got}")]
    MissingSignatures { expected: usize, got: usize },
    #[error("signature {slot} does not verify")]
    Signature { slot: usize },
    #[error("auditor signature missing or invalid")]
    AuditorSignature,
}

/// Verify either kind of action.
pub fn verify_action(action: &Action, pp: &PublicParameters) -> Result<(), VerificationError> {
    match action {
        Action::Issue(a) => verify_issue(a, pp),
        Action::Transfer(a) => verify_transfer(a, pp),
    }
}

/// Verify an issue: issuer allowed, type commitment well formed, every
/// output `C_j - T` in range.
pub fn verify_issue(action: &IssueAction, pp: &PublicParameters) -> Result<(), VerificationError> {
    if action.outputs.is_empty() {
        return Err(VerificationError::Empty);
    }
    if action.proof.range_proofs.len() != action.outputs.len() {
        return Err(VerificationError::Malformed("range proof count"));
    }
    if !pp.is_issuer(&action.issuer) {
        return Err(VerificationError::UnknownIssuer);
    }
    let gens = &pp.generators;
    let tc = action.proof.type_commitment;
    if tc.is_identity() {
        return Err(VerificationError::TypeCommitment { group: 0 });
    }

    let mut t = new_transcript(pp, labels::SECTION_ISSUE);
    bind_issue(&mut t, &action.issuer, &action.outputs, &tc);
    let tp = &action.proof.type_proof;
    append_point(&mut t, b"A_type", &tp.commitment);
    let c = fs_chal(&mut t, labels::CHAL_ISSUE);

    // z1·G_type + z2·H == A + c·T
    let lhs = tp.z1 * gens.G_type + tp.z2 * gens.H;
    if !ct_eq_point(&lhs, &(tp.commitment + c * tc)) {
        return Err(VerificationError::TypeCommitment { group: 0 });
    }

    let ctx_bytes = transcript_context_bytes(&t);
    for (j, (token, proof)) in action
        .outputs
        .iter()
        .zip(&action.proof.range_proofs)
        .enumerate()
    {
        if !range::verify_range(pp, &ctx_bytes, j as u64, &(token.commitment - tc), proof) {
            return Err(VerificationError::Range { output: j });
        }
    }
    Ok(())
}

/// Verify a transfer: group layout and policy, type consistency of every
/// input, per-group balance, and range of every output.
pub fn verify_transfer(
    action: &TransferAction,
    pp: &PublicParameters,
) -> Result<(), VerificationError> {
    let proof = &action.proof;
    let (n_in, n_out) = (action.inputs.len(), action.outputs.len());
    if n_in == 0 || n_out == 0 {
        return Err(VerificationError::Empty);
    }
    if action.input_tokens.len() != n_in || proof.input_proofs.len() != n_in {
        return Err(VerificationError::Malformed("input count"));
    }
    if proof.range_proofs.len() != n_out {
        return Err(VerificationError::Malformed("range proof count"));
    }
    if proof.groups.is_empty() {
        return Err(VerificationError::GroupLayout("no groups"));
    }
    if proof.groups.len() > 1 && !pp.allow_mixed_types {
        return Err(VerificationError::MixedTypes);
    }

    // every input and output in exactly one group
    let mut input_group = vec![None; n_in];
    let mut output_group = vec![None; n_out];
    for (k, g) in proof.groups.iter().enumerate() {
        if g.inputs.is_empty() {
            return Err(VerificationError::GroupLayout("group without inputs"));
        }
        for &i in &g.inputs {
            let slot = input_group
                .get_mut(i as usize)
                .ok_or(VerificationError::GroupLayout("input index out of bounds"))?;
            if slot.replace(k).is_some() {
                return Err(VerificationError::GroupLayout("input in two groups"));
            }
        }
        for &j in &g.outputs {
            let slot = output_group
                .get_mut(j as usize)
                .ok_or(VerificationError::GroupLayout("output index out of bounds"))?;
            if slot.replace(k).is_some() {
                return Err(VerificationError::GroupLayout("output in two groups"));
            }
        }
    }
    let input_group: Vec<usize> = input_group
        .into_iter()
        .collect::<Option<_>>()
        .ok_or(VerificationError::GroupLayout("input without group"))?;
    let output_group: Vec<usize> = output_group
        .into_iter()
        .collect::<Option<_>>()
        .ok_or(VerificationError::GroupLayout("output without group"))?;

    let mut t = new_transcript(pp, labels::SECTION_TRANSFER);
    bind_transfer(&mut t, &action.inputs, &action.input_tokens, &action.outputs);
    for g in &proof.groups {
        bind_group(&mut t, &g.type_commitment, &g.inputs, &g.outputs);
    }
    for g in &proof.groups {
        append_point(&mut t, b"A_type", &g.type_proof.commitment);
        append_point(&mut t, b"A_bal", &g.balance.commitment);
    }
    for p in &proof.input_proofs {
        append_point(&mut t, b"A_in", &p.commitment);
    }
    let c = fs_chal(&mut t, labels::CHAL_TRANSFER);

    let gens = &pp.generators;
    for (k, g) in proof.groups.iter().enumerate() {
        let tp = &g.type_proof;
        let lhs = tp.z1 * gens.G_type + tp.z2 * gens.H;
        if g.type_commitment.is_identity()
            || !ct_eq_point(&lhs, &(tp.commitment + c * g.type_commitment))
        {
            return Err(VerificationError::TypeCommitment { group: k });
        }
    }

    // C_i - T_k ∈ span(G_value, H)
    for (i, (token, p)) in action
        .input_tokens
        .iter()
        .zip(&proof.input_proofs)
        .enumerate()
    {
        let shifted = token.commitment - proof.groups[input_group[i]].type_commitment;
        let lhs = p.z1 * gens.G_value + p.z2 * gens.H;
        if !ct_eq_point(&lhs, &(p.commitment + c * shifted)) {
            return Err(VerificationError::TypeConsistency { input: i });
        }
    }

    // Σin (C_i - T) - Σout (C_j - T) == x·H
    for (k, g) in proof.groups.iter().enumerate() {
        let sum_in: RistrettoPoint = g
            .inputs
            .iter()
            .map(|&i| action.input_tokens[i as usize].commitment - g.type_commitment)
            .sum();
        let sum_out: RistrettoPoint = g
            .outputs
            .iter()
            .map(|&j| action.outputs[j as usize].commitment - g.type_commitment)
            .sum();
        let lhs = g.balance.z * gens.H;
        if !ct_eq_point(&lhs, &(g.balance.commitment + c * (sum_in - sum_out))) {
            return Err(VerificationError::Balance { group: k });
        }
    }

    let ctx_bytes = transcript_context_bytes(&t);
    for (j, (token, rp)) in action.outputs.iter().zip(&proof.range_proofs).enumerate() {
        let shifted = token.commitment - proof.groups[output_group[j]].type_commitment;
        if !range::verify_range(pp, &ctx_bytes, j as u64, &shifted, rp) {
            return Err(VerificationError::Range { output: j });
        }
    }
    Ok(())
}
