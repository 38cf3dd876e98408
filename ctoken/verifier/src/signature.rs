use ctoken_primitives::{
    Ed25519Verifier, PublicParameters, TokenRequest, Verifier, signing_message,
};

use crate::{VerificationError, verify_issue, verify_transfer};

/// Check one detached signature over `raw_action || tx_id`.
pub fn verify_signature(
    verifier: &dyn Verifier,
    raw_action: &[u8],
    tx_id: &str,
    signature: &[u8],
) -> bool {
    verifier
        .verify(&signing_message(raw_action, tx_id), signature)
        .is_ok()
}

/// Full validation of a request as the ledger runs it: every action, one
/// valid signature per required signer, and the auditor's signature when the
/// public parameters name an auditor.
pub fn verify_request(
    request: &TokenRequest,
    pp: &PublicParameters,
    tx_id: &str,
) -> Result<(), VerificationError> {
    if request.is_empty() {
        return Err(VerificationError::Empty);
    }
    for action in &request.issues {
        verify_issue(action, pp)?;
    }
    for action in &request.transfers {
        verify_transfer(action, pp)?;
    }

    let raw = request
        .marshal_to_sign()
        .map_err(|_| VerificationError::Malformed("request encoding"))?;
    let signers = request.signers();
    if signers.len() != request.signatures.len() {
        return Err(VerificationError::MissingSignatures {
            expected: signers.len(),
            got: request.signatures.len(),
        });
    }
    for (slot, (signer, sig)) in signers.iter().zip(&request.signatures).enumerate() {
        let valid = Ed25519Verifier::from_identity(signer)
            .map(|v| verify_signature(&v, &raw, tx_id, sig))
            .unwrap_or(false);
        if !valid {
            return Err(VerificationError::Signature { slot });
        }
    }

    if let Some(auditor) = &pp.auditor {
        let verifier = Ed25519Verifier::from_identity(auditor)
            .map_err(|_| VerificationError::AuditorSignature)?;
        if !request
            .auditor_signatures
            .iter()
            .any(|sig| verify_signature(&verifier, &raw, tx_id, sig))
        {
            return Err(VerificationError::AuditorSignature);
        }
    }
    Ok(())
}
