//! Public parameters: generators, range bound and driver policy flags.

use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar, traits::IsIdentity};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;

use crate::{identity::Identity, labels};

/// Range-proof bit lengths the Bulletproof generators are sized for.
pub const SUPPORTED_BIT_LENGTHS: [usize; 4] = [8, 16, 32, 64];

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("unsupported range bit length {0}")]
    UnsupportedBitLength(usize),
    #[error("generators do not match the derived set")]
    Generators,
    #[error("public parameters encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Pedersen generators `[G_type, G_value, H]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct Generators {
    pub G_type: RistrettoPoint,
    pub G_value: RistrettoPoint,
    pub H: RistrettoPoint,
}

impl Generators {
    /// Nothing-up-my-sleeve generators from hash-to-curve over fixed labels.
    pub fn derive() -> Self {
        Self {
            G_type: RistrettoPoint::hash_from_bytes::<Sha512>(labels::GEN_TYPE),
            G_value: RistrettoPoint::hash_from_bytes::<Sha512>(labels::GEN_VALUE),
            H: RistrettoPoint::hash_from_bytes::<Sha512>(labels::GEN_BLINDING),
        }
    }

    /// `t·G_type + v·G_value + r·H`
    pub fn commit(&self, type_scalar: &Scalar, value: u64, blinding: &Scalar) -> RistrettoPoint {
        type_scalar * self.G_type + Scalar::from(value) * self.G_value + blinding * self.H
    }

    /// `t·G_type + s·H`
    pub fn commit_type(&self, type_scalar: &Scalar, blinding: &Scalar) -> RistrettoPoint {
        type_scalar * self.G_type + blinding * self.H
    }

    fn is_degenerate(&self) -> bool {
        self.G_type.is_identity()
            || self.G_value.is_identity()
            || self.H.is_identity()
            || self.G_type == self.G_value
            || self.G_type == self.H
            || self.G_value == self.H
    }
}

/// Map a token type string to the scalar committed under `G_type`.
pub fn hash_to_scalar(token_type: &str) -> Scalar {
    let mut h = Sha512::new();
    h.update(labels::TYPE_HASH);
    h.update(token_type.as_bytes());
    Scalar::from_hash(h)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicParameters {
    pub identifier: String,
    pub generators: Generators,
    pub bit_length: usize,
    pub auditor: Option<Identity>,
    /// Empty means any issuer is accepted.
    pub issuers: Vec<Identity>,
    pub graph_hiding: bool,
    pub allow_mixed_types: bool,
}

impl PublicParameters {
    pub const DRIVER: &'static str = "ctoken.pedersen.v1";

    pub fn setup(
        bit_length: usize,
        issuers: Vec<Identity>,
        auditor: Option<Identity>,
    ) -> Result<Self, ParamsError> {
        let pp = Self {
            identifier: Self::DRIVER.to_string(),
            generators: Generators::derive(),
            bit_length,
            auditor,
            issuers,
            graph_hiding: false,
            allow_mixed_types: false,
        };
        pp.validate()?;
        Ok(pp)
    }

    pub fn with_graph_hiding(mut self, graph_hiding: bool) -> Self {
        self.graph_hiding = graph_hiding;
        self
    }

    pub fn with_mixed_types(mut self, allow: bool) -> Self {
        self.allow_mixed_types = allow;
        self
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if !SUPPORTED_BIT_LENGTHS.contains(&self.bit_length) {
            return Err(ParamsError::UnsupportedBitLength(self.bit_length));
        }
        if self.generators.is_degenerate() || self.generators != Generators::derive() {
            return Err(ParamsError::Generators);
        }
        Ok(())
    }

    /// Largest value a range proof accepts: `2^bit_length - 1`.
    pub fn max_value(&self) -> u64 {
        if self.bit_length >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bit_length) - 1
        }
    }

    pub fn in_range(&self, value: u64) -> bool {
        value <= self.max_value()
    }

    pub fn is_issuer(&self, identity: &Identity) -> bool {
        self.issuers.is_empty() || self.issuers.contains(identity)
    }

    /// Digest bound into every proof transcript.
    pub fn digest(&self) -> [u8; 32] {
        let mut h = Sha256::new();
        h.update(self.identifier.as_bytes());
        h.update(self.generators.G_type.compress().as_bytes());
        h.update(self.generators.G_value.compress().as_bytes());
        h.update(self.generators.H.compress().as_bytes());
        h.update((self.bit_length as u64).to_le_bytes());
        match &self.auditor {
            Some(a) => {
                h.update([1u8]);
                h.update((a.as_bytes().len() as u64).to_le_bytes());
                h.update(a.as_bytes());
            }
            None => h.update([0u8]),
        }
        h.update((self.issuers.len() as u64).to_le_bytes());
        for issuer in &self.issuers {
            h.update((issuer.as_bytes().len() as u64).to_le_bytes());
            h.update(issuer.as_bytes());
        }
        h.update([self.graph_hiding as u8, self.allow_mixed_types as u8]);
        h.finalize().into()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ParamsError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, ParamsError> {
        let pp: Self = serde_json::from_slice(raw)?;
        pp.validate()?;
        Ok(pp)
    }
}
