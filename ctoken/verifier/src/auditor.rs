use std::collections::BTreeMap;

use ctoken_primitives::{
    AuditInfo, OutputMetadata, PublicParameters, Token, TokenId, TokenRequest,
    TokenRequestMetadata,
};
use thiserror::Error;

use crate::{VerificationError, verify_issue, verify_transfer};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    #[error("metadata does not match the request: {0}")]
    ShapeMismatch(&'static str),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error("output {token_id} carries no valid audit info for its owner")]
    AuditInfo { token_id: TokenId },
    #[error("output {token_id} does not match its opening")]
    OutputMismatch { token_id: TokenId },
    #[error("input {token_id} does not match its opening")]
    InputMismatch { token_id: TokenId },
    #[error("transfer {transfer} does not conserve {token_type}: in {inputs}, out {outputs}")]
    Unbalanced {
        transfer: usize,
        token_type: String,
        inputs: u128,
        outputs: u128,
    },
}

/// Auditor view over requests and their full metadata.
pub struct Auditor<'a> {
    pp: &'a PublicParameters,
}

impl<'a> Auditor<'a> {
    pub fn new(pp: &'a PublicParameters) -> Self {
        Self { pp }
    }

    /// Verify every action of `request`, then [`check_openings`](Self::check_openings).
    pub fn check(
        &self,
        request: &TokenRequest,
        metadata: &TokenRequestMetadata,
        input_tokens: &[Vec<Token>],
        tx_id: &str,
    ) -> Result<(), AuditError> {
        for action in &request.issues {
            verify_issue(action, self.pp)?;
        }
        for action in &request.transfers {
            verify_transfer(action, self.pp)?;
        }
        self.check_openings(request, metadata, input_tokens, tx_id)
    }

    /// Open every output and input of `request` through `metadata`, check the
    /// owners' audit info and conservation per type in the clear.
    ///
    /// `input_tokens[t][i]` is the auditor's own record of the ledger token
    /// spent by input `i` of transfer `t`. Errors cite the first offending
    /// token id; outputs are numbered `(tx_id, index)` in ledger order.
    pub fn check_openings(
        &self,
        request: &TokenRequest,
        metadata: &TokenRequestMetadata,
        input_tokens: &[Vec<Token>],
        tx_id: &str,
    ) -> Result<(), AuditError> {
        if request.issues.len() != metadata.issues.len() {
            return Err(AuditError::ShapeMismatch("issue count"));
        }
        if request.transfers.len() != metadata.transfers.len()
            || request.transfers.len() != input_tokens.len()
        {
            return Err(AuditError::ShapeMismatch("transfer count"));
        }

        let mut index = 0u64;
        for (action, md) in request.issues.iter().zip(&metadata.issues) {
            if action.issuer != md.issuer {
                return Err(AuditError::ShapeMismatch("issuer"));
            }
            self.check_outputs(&action.outputs, &md.outputs, tx_id, &mut index)?;
        }

        for (t, ((action, md), ledger_inputs)) in request
            .transfers
            .iter()
            .zip(&metadata.transfers)
            .zip(input_tokens)
            .enumerate()
        {
            if md.token_ids != action.inputs
                || md.inputs.len() != action.inputs.len()
                || ledger_inputs.len() != action.inputs.len()
            {
                return Err(AuditError::ShapeMismatch("transfer inputs"));
            }

            let mut balance: BTreeMap<&str, (u128, u128)> = BTreeMap::new();
            for (i, id) in action.inputs.iter().enumerate() {
                let ledger = &ledger_inputs[i];
                let opening = md.inputs[i]
                    .as_ref()
                    .filter(|o| ledger == &action.input_tokens[i] && o.opens(self.pp, ledger))
                    .ok_or_else(|| AuditError::InputMismatch {
                        token_id: id.clone(),
                    })?;
                balance.entry(&opening.token_type).or_default().0 += opening.value as u128;
            }

            let first = index;
            self.check_outputs(&action.outputs, &md.outputs, tx_id, &mut index)?;
            for (o, j) in md.outputs.iter().zip(first..) {
                // opened by check_outputs
                let Some(opening) = o.opening.as_ref() else {
                    return Err(AuditError::OutputMismatch {
                        token_id: TokenId::new(tx_id, j),
                    });
                };
                balance.entry(&opening.token_type).or_default().1 += opening.value as u128;
            }

            if let Some((token_type, (inputs, outputs))) =
                balance.into_iter().find(|(_, (i, o))| i != o)
            {
                return Err(AuditError::Unbalanced {
                    transfer: t,
                    token_type: token_type.to_string(),
                    inputs,
                    outputs,
                });
            }
        }
        Ok(())
    }

    fn check_outputs(
        &self,
        outputs: &[Token],
        md: &[OutputMetadata],
        tx_id: &str,
        index: &mut u64,
    ) -> Result<(), AuditError> {
        if outputs.len() != md.len() {
            return Err(AuditError::ShapeMismatch("output count"));
        }
        for (token, out) in outputs.iter().zip(md) {
            let opened = token.owner == out.owner
                && out.opening.as_ref().is_some_and(|o| o.opens(self.pp, token));
            if !opened {
                return Err(AuditError::OutputMismatch {
                    token_id: TokenId::new(tx_id, *index),
                });
            }
            // redeemed outputs have no owner to disclose
            if !token.owner.is_none() && AuditInfo::open(&out.audit_info, &token.owner).is_err() {
                return Err(AuditError::AuditInfo {
                    token_id: TokenId::new(tx_id, *index),
                });
            }
            *index += 1;
        }
        Ok(())
    }
}
