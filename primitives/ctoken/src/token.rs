use core::fmt;

use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use serde::{Deserialize, Serialize};

use crate::{identity::Identity, params::PublicParameters};

/// Output position `(tx_id, index)` of a token on the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId {
    pub tx_id: String,
    pub index: u64,
}

impl TokenId {
    pub fn new(tx_id: impl Into<String>, index: u64) -> Self {
        Self {
            tx_id: tx_id.into(),
            index,
        }
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.tx_id, self.index)
    }
}

/// On-ledger token: an owner and a commitment to (type, value).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub owner: Identity,
    pub commitment: RistrettoPoint,
}

/// Secret explaining a token commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenOpening {
    pub token_type: String,
    pub value: u64,
    pub blinding_factor: Scalar,
}

impl TokenOpening {
    pub fn commitment(&self, pp: &PublicParameters) -> RistrettoPoint {
        pp.generators.commit(
            &crate::params::hash_to_scalar(&self.token_type),
            self.value,
            &self.blinding_factor,
        )
    }

    /// True if this opening recomputes the token's commitment.
    pub fn opens(&self, pp: &PublicParameters, token: &Token) -> bool {
        crate::ct_eq_point(&self.commitment(pp), &token.commitment)
    }
}
