use ctoken_primitives::{
    Identity, IssueAction, IssueMetadata, IssueProof, OutputMetadata, PublicParameters,
    RepresentationProof, Token, TokenOpening, append_point, bind_issue,
    challenge_scalar as fs_chal, hash_to_scalar, labels, new_transcript,
    transcript_context_bytes,
};
use rand::RngCore;

use crate::{ProverError, random_scalar, range::prove_range};

/// Issuer of new tokens.
pub struct Issuer<'a> {
    pp: &'a PublicParameters,
    identity: Identity,
}

impl<'a> Issuer<'a> {
    pub fn new(pp: &'a PublicParameters, identity: Identity) -> Self {
        Self { pp, identity }
    }

    /// Issue fresh outputs of `token_type`.
    ///
    /// # Returns
    /// * the `IssueAction` (signed by the issuer alone) and its metadata
    ///
    /// # Errors
    /// * `ProverError::InvalidInput` - if there are no outputs, or the issuer is
    ///   not in the public parameters' issuer set
    /// * `ProverError::OutOfRange` - if a value exceeds `2^bit_length - 1`
    /// * `ProverError::RangeProof` - if Bulletproof generation fails
    pub fn generate_issue<R: RngCore>(
        &self,
        token_type: &str,
        values: &[u64],
        owners: &[Identity],
        rng: &mut R,
    ) -> Result<(IssueAction, IssueMetadata), ProverError> {
        if values.is_empty() {
            return Err(ProverError::InvalidInput("issue without outputs"));
        }
        if values.len() != owners.len() {
            return Err(ProverError::InvalidInput("values and owners disagree"));
        }
        if !self.pp.is_issuer(&self.identity) {
            return Err(ProverError::InvalidInput("issuer not in the issuer set"));
        }
        if let Some(&value) = values.iter().find(|v| !self.pp.in_range(**v)) {
            return Err(ProverError::OutOfRange {
                value,
                max: self.pp.max_value(),
            });
        }

        let gens = &self.pp.generators;
        let type_scalar = hash_to_scalar(token_type);
        let s = random_scalar(rng);
        let type_commitment = gens.commit_type(&type_scalar, &s);

        let openings: Vec<TokenOpening> = values
            .iter()
            .map(|v| TokenOpening {
                token_type: token_type.to_string(),
                value: *v,
                blinding_factor: random_scalar(rng),
            })
            .collect();
        let outputs: Vec<Token> = openings
            .iter()
            .zip(owners)
            .map(|(o, owner)| Token {
                owner: owner.clone(),
                commitment: o.commitment(self.pp),
            })
            .collect();

        let mut t = new_transcript(self.pp, labels::SECTION_ISSUE);
        bind_issue(&mut t, &self.identity, &outputs, &type_commitment);

        let (a_t, a_s) = (random_scalar(rng), random_scalar(rng));
        let a_type = a_t * gens.G_type + a_s * gens.H;
        append_point(&mut t, b"A_type", &a_type);

        let c = fs_chal(&mut t, labels::CHAL_ISSUE);
        let type_proof = RepresentationProof {
            commitment: a_type,
            z1: a_t + c * type_scalar,
            z2: a_s + c * s,
        };

        let ctx_bytes = transcript_context_bytes(&t);
        let range_proofs = openings
            .iter()
            .zip(&outputs)
            .enumerate()
            .map(|(j, (o, token))| {
                prove_range(
                    self.pp,
                    &ctx_bytes,
                    j as u64,
                    &(token.commitment - type_commitment),
                    o.value,
                    &(o.blinding_factor - s),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let metadata = IssueMetadata {
            issuer: self.identity.clone(),
            outputs: outputs
                .iter()
                .zip(openings)
                .map(|(token, opening)| OutputMetadata {
                    owner: token.owner.clone(),
                    opening: Some(opening),
                    audit_info: Vec::new(),
                })
                .collect(),
        };
        let action = IssueAction {
            issuer: self.identity.clone(),
            outputs,
            proof: IssueProof {
                type_commitment,
                type_proof,
                range_proofs,
            },
        };
        Ok((action, metadata))
    }
}
