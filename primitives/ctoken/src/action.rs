//! Issue and transfer actions together with their proof objects.
//!
//! Proof layout, for a transfer with type groups `k`:
//!
//! ```text
//! T_k            type commitment  t·G_type + s·H       (+ representation proof over G_type, H)
//! C_i - T_k      per input        v_i·G_value + b_i·H   (representation proof over G_value, H)
//! C_j - T_k      per output       v_j·G_value + b_j·H   (Bulletproof, 0 <= v_j < 2^n)
//! Σin - Σout     per group        x·H                   (Schnorr proof over H)
//! ```
//!
//! An issue carries one `T` with its representation proof and one range proof
//! per output. All sigma proofs share one Fiat–Shamir challenge per action.

use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use serde::{Deserialize, Serialize};

use crate::{
    identity::Identity,
    token::{Token, TokenId},
};

/// Serialized Bulletproof.
pub type RangeProofBytes = Vec<u8>;

/// Proof of knowledge of `(w1, w2)` with `P = w1·B1 + w2·B2`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepresentationProof {
    pub commitment: RistrettoPoint,
    pub z1: Scalar,
    pub z2: Scalar,
}

/// Proof of knowledge of `x` with `P = x·H`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceProof {
    pub commitment: RistrettoPoint,
    pub z: Scalar,
}

/// Inputs and outputs of a transfer sharing one committed type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeGroup {
    pub type_commitment: RistrettoPoint,
    pub type_proof: RepresentationProof,
    pub inputs: Vec<u32>,
    pub outputs: Vec<u32>,
    pub balance: BalanceProof,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProof {
    pub groups: Vec<TypeGroup>,
    /// One per input, in input order.
    pub input_proofs: Vec<RepresentationProof>,
    /// One per output, in output order.
    #[serde(with = "crate::codec::hex_bytes_vec")]
    pub range_proofs: Vec<RangeProofBytes>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueProof {
    pub type_commitment: RistrettoPoint,
    pub type_proof: RepresentationProof,
    #[serde(with = "crate::codec::hex_bytes_vec")]
    pub range_proofs: Vec<RangeProofBytes>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueAction {
    pub issuer: Identity,
    pub outputs: Vec<Token>,
    pub proof: IssueProof,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAction {
    pub inputs: Vec<TokenId>,
    /// Ledger tokens behind `inputs`, so the action verifies on its own.
    pub input_tokens: Vec<Token>,
    pub outputs: Vec<Token>,
    pub proof: TransferProof,
}

impl TransferAction {
    /// Owners of the spent inputs, one per input.
    pub fn senders(&self) -> impl Iterator<Item = &Identity> {
        self.input_tokens.iter().map(|t| &t.owner)
    }

    /// True if any output is sent to the none identity.
    pub fn is_redeem(&self) -> bool {
        self.outputs.iter().any(|t| t.owner.is_none())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Issue(IssueAction),
    Transfer(TransferAction),
}

impl Action {
    /// Deterministic bytes signed by the action's authorizers.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn outputs(&self) -> &[Token] {
        match self {
            Action::Issue(a) => &a.outputs,
            Action::Transfer(a) => &a.outputs,
        }
    }

    /// Identities whose signatures authorize this action, in slot order.
    pub fn signers(&self) -> Vec<Identity> {
        match self {
            Action::Issue(a) => vec![a.issuer.clone()],
            Action::Transfer(a) => a.senders().cloned().collect(),
        }
    }
}

impl From<IssueAction> for Action {
    fn from(a: IssueAction) -> Self {
        Action::Issue(a)
    }
}

impl From<TransferAction> for Action {
    fn from(a: TransferAction) -> Self {
        Action::Transfer(a)
    }
}
