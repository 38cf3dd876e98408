use ctoken_primitives::{
    BalanceProof, Identity, OutputMetadata, PublicParameters, RepresentationProof, Token, TokenId,
    TokenOpening, TransferAction, TransferMetadata, TransferProof, TypeGroup, append_point,
    bind_group, bind_transfer, challenge_scalar as fs_chal, hash_to_scalar, labels,
    new_transcript, transcript_context_bytes,
};
use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use rand::RngCore;

use crate::{ProverError, random_scalar, range::prove_range};

/// One requested transfer output.
#[derive(Clone, Debug)]
pub struct OutputSpec {
    pub token_type: String,
    pub value: u64,
    pub owner: Identity,
}

/// Holder of opened inputs, able to spend them.
pub struct Sender<'a> {
    pp: &'a PublicParameters,
    ids: Vec<TokenId>,
    tokens: Vec<Token>,
    openings: Vec<TokenOpening>,
}

struct Group {
    token_type: String,
    type_scalar: Scalar,
    blinding: Scalar,
    inputs: Vec<u32>,
    outputs: Vec<u32>,
}

impl<'a> Sender<'a> {
    /// # Errors
    /// * `ProverError::InvalidInput` - if there are no inputs or the lists disagree in length
    /// * `ProverError::OpeningMismatch` - if an opening does not recompute its token
    pub fn new(
        pp: &'a PublicParameters,
        ids: Vec<TokenId>,
        tokens: Vec<Token>,
        openings: Vec<TokenOpening>,
    ) -> Result<Self, ProverError> {
        if ids.is_empty() {
            return Err(ProverError::InvalidInput("transfer without inputs"));
        }
        if ids.len() != tokens.len() || tokens.len() != openings.len() {
            return Err(ProverError::InvalidInput("input ids, tokens and openings disagree"));
        }
        if let Some(index) = openings
            .iter()
            .zip(&tokens)
            .position(|(o, t)| !o.opens(pp, t))
        {
            return Err(ProverError::OpeningMismatch { index });
        }
        Ok(Self {
            pp,
            ids,
            tokens,
            openings,
        })
    }

    /// Generate a single-type transfer of all inputs to `values`/`owners`.
    ///
    /// # Arguments
    /// * `values` - output values, summing to the inputs' total
    /// * `owners` - output owners, one per value
    ///
    /// # Returns
    /// * the `TransferAction` and the metadata carrying every opening
    ///
    /// # Errors
    /// * `ProverError::MixedTypes` - if the inputs do not share one type
    /// * `ProverError::Unbalanced` - if output values do not sum to the input values
    /// * `ProverError::OutOfRange` - if an output exceeds `2^bit_length - 1`
    /// * `ProverError::RangeProof` - if Bulletproof generation fails
    pub fn generate_transfer<R: RngCore>(
        &self,
        values: &[u64],
        owners: &[Identity],
        rng: &mut R,
    ) -> Result<(TransferAction, TransferMetadata), ProverError> {
        if values.len() != owners.len() {
            return Err(ProverError::InvalidInput("values and owners disagree"));
        }
        let token_type = &self.openings[0].token_type;
        if self.openings.iter().any(|o| &o.token_type != token_type) {
            return Err(ProverError::MixedTypes);
        }
        let specs: Vec<OutputSpec> = values
            .iter()
            .zip(owners)
            .map(|(value, owner)| OutputSpec {
                token_type: token_type.clone(),
                value: *value,
                owner: owner.clone(),
            })
            .collect();
        self.generate_typed_transfer(&specs, rng)
    }

    /// Generate a transfer whose outputs carry explicit types. More than one
    /// type requires `pp.allow_mixed_types`; each type balances on its own.
    pub fn generate_typed_transfer<R: RngCore>(
        &self,
        outputs: &[OutputSpec],
        rng: &mut R,
    ) -> Result<(TransferAction, TransferMetadata), ProverError> {
        if outputs.is_empty() {
            return Err(ProverError::InvalidInput("transfer without outputs"));
        }
        if let Some(o) = outputs.iter().find(|o| !self.pp.in_range(o.value)) {
            return Err(ProverError::OutOfRange {
                value: o.value,
                max: self.pp.max_value(),
            });
        }

        let groups = self.group_by_type(outputs, rng)?;
        if groups.len() > 1 && !self.pp.allow_mixed_types {
            return Err(ProverError::MixedTypes);
        }
        for g in &groups {
            let sum_in: u128 = g
                .inputs
                .iter()
                .map(|&i| self.openings[i as usize].value as u128)
                .sum();
            let sum_out: u128 = g
                .outputs
                .iter()
                .map(|&j| outputs[j as usize].value as u128)
                .sum();
            if sum_in != sum_out {
                return Err(ProverError::Unbalanced {
                    token_type: g.token_type.clone(),
                    inputs: sum_in,
                    outputs: sum_out,
                });
            }
        }

        let gens = &self.pp.generators;

        // fresh output commitments
        let out_openings: Vec<TokenOpening> = outputs
            .iter()
            .map(|o| TokenOpening {
                token_type: o.token_type.clone(),
                value: o.value,
                blinding_factor: random_scalar(rng),
            })
            .collect();
        let out_tokens: Vec<Token> = outputs
            .iter()
            .zip(&out_openings)
            .map(|(o, op)| Token {
                owner: o.owner.clone(),
                commitment: op.commitment(self.pp),
            })
            .collect();

        let type_commitments: Vec<RistrettoPoint> = groups
            .iter()
            .map(|g| gens.commit_type(&g.type_scalar, &g.blinding))
            .collect();

        let mut t = new_transcript(self.pp, labels::SECTION_TRANSFER);
        bind_transfer(&mut t, &self.ids, &self.tokens, &out_tokens);
        for (g, tc) in groups.iter().zip(&type_commitments) {
            bind_group(&mut t, tc, &g.inputs, &g.outputs);
        }

        // Σ-commitments, in verifier order: per group (A_type, A_bal), then per input A_in
        let mut group_nonces = Vec::with_capacity(groups.len());
        for _ in &groups {
            let (a_t, a_s, a_b) = (random_scalar(rng), random_scalar(rng), random_scalar(rng));
            let a_type = a_t * gens.G_type + a_s * gens.H;
            let a_bal = a_b * gens.H;
            append_point(&mut t, b"A_type", &a_type);
            append_point(&mut t, b"A_bal", &a_bal);
            group_nonces.push((a_t, a_s, a_b, a_type, a_bal));
        }
        let mut input_nonces = Vec::with_capacity(self.openings.len());
        for _ in &self.openings {
            let (a_v, a_r) = (random_scalar(rng), random_scalar(rng));
            let a_in = a_v * gens.G_value + a_r * gens.H;
            append_point(&mut t, b"A_in", &a_in);
            input_nonces.push((a_v, a_r, a_in));
        }

        let c = fs_chal(&mut t, labels::CHAL_TRANSFER);

        // input index -> group blinding
        let mut input_group = vec![0usize; self.openings.len()];
        for (k, g) in groups.iter().enumerate() {
            for &i in &g.inputs {
                input_group[i as usize] = k;
            }
        }

        let input_proofs: Vec<RepresentationProof> = self
            .openings
            .iter()
            .zip(&input_nonces)
            .zip(&input_group)
            .map(|((o, (a_v, a_r, a_in)), &k)| RepresentationProof {
                commitment: *a_in,
                z1: a_v + c * Scalar::from(o.value),
                z2: a_r + c * (o.blinding_factor - groups[k].blinding),
            })
            .collect();

        let mut proof_groups = Vec::with_capacity(groups.len());
        for ((g, tc), (a_t, a_s, a_b, a_type, a_bal)) in
            groups.iter().zip(&type_commitments).zip(&group_nonces)
        {
            // Σin (r_i - s) - Σout (r_j - s)
            let x_in: Scalar = g
                .inputs
                .iter()
                .map(|&i| self.openings[i as usize].blinding_factor - g.blinding)
                .sum();
            let x_out: Scalar = g
                .outputs
                .iter()
                .map(|&j| out_openings[j as usize].blinding_factor - g.blinding)
                .sum();
            proof_groups.push(TypeGroup {
                type_commitment: *tc,
                type_proof: RepresentationProof {
                    commitment: *a_type,
                    z1: a_t + c * g.type_scalar,
                    z2: a_s + c * g.blinding,
                },
                inputs: g.inputs.clone(),
                outputs: g.outputs.clone(),
                balance: BalanceProof {
                    commitment: *a_bal,
                    z: a_b + c * (x_in - x_out),
                },
            });
        }

        // Range proofs over C_j - T_k, bound to the sigma transcript.
        let ctx_bytes = transcript_context_bytes(&t);
        let mut range_proofs = vec![Vec::new(); outputs.len()];
        for (g, tc) in groups.iter().zip(&type_commitments) {
            for &j in &g.outputs {
                let j = j as usize;
                let op = &out_openings[j];
                range_proofs[j] = prove_range(
                    self.pp,
                    &ctx_bytes,
                    j as u64,
                    &(out_tokens[j].commitment - tc),
                    op.value,
                    &(op.blinding_factor - g.blinding),
                )?;
            }
        }

        let action = TransferAction {
            inputs: self.ids.clone(),
            input_tokens: self.tokens.clone(),
            outputs: out_tokens,
            proof: TransferProof {
                groups: proof_groups,
                input_proofs,
                range_proofs,
            },
        };
        let metadata = TransferMetadata {
            token_ids: self.ids.clone(),
            senders: self.tokens.iter().map(|t| t.owner.clone()).collect(),
            inputs: self.openings.iter().cloned().map(Some).collect(),
            outputs: outputs
                .iter()
                .zip(out_openings)
                .map(|(o, opening)| OutputMetadata {
                    owner: o.owner.clone(),
                    opening: Some(opening),
                    audit_info: Vec::new(),
                })
                .collect(),
        };
        Ok((action, metadata))
    }

    /// Partition inputs and outputs by type, in order of first appearance
    /// among the inputs.
    fn group_by_type<R: RngCore>(
        &self,
        outputs: &[OutputSpec],
        rng: &mut R,
    ) -> Result<Vec<Group>, ProverError> {
        let mut groups: Vec<Group> = Vec::new();
        for (i, o) in self.openings.iter().enumerate() {
            match groups.iter_mut().find(|g| g.token_type == o.token_type) {
                Some(g) => g.inputs.push(i as u32),
                None => groups.push(Group {
                    token_type: o.token_type.clone(),
                    type_scalar: hash_to_scalar(&o.token_type),
                    blinding: random_scalar(rng),
                    inputs: vec![i as u32],
                    outputs: Vec::new(),
                }),
            }
        }
        for (j, o) in outputs.iter().enumerate() {
            let Some(g) = groups.iter_mut().find(|g| g.token_type == o.token_type) else {
                return Err(ProverError::Unbalanced {
                    token_type: o.token_type.clone(),
                    inputs: 0,
                    outputs: o.value as u128,
                });
            };
            g.outputs.push(j as u32);
        }
        Ok(groups)
    }
}
