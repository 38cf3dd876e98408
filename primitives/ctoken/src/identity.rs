//! Opaque identities and the signing capabilities attached to them.

use core::fmt;

use ed25519_dalek::{
    Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::labels;

/// Opaque identity bytes. The empty identity marks a redemption sink.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(#[serde(with = "crate::codec::hex_bytes")] Vec<u8>);

impl Identity {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The "none" identity: owner of redeemed outputs.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("<none>");
        }
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({self})")
    }
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("signer {identity} failed: {reason}")]
    Signer { identity: Identity, reason: String },
    #[error("invalid signature")]
    InvalidSignature,
    #[error("malformed identity {0}")]
    MalformedIdentity(Identity),
    #[error("nothing known about identity {0}")]
    UnknownIdentity(Identity),
    #[error("audit info does not belong to {0}")]
    InvalidAuditInfo(Identity),
    #[error("audit info encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Signing capability bound to one identity.
pub trait Signer: Send + Sync {
    fn identity(&self) -> Identity;
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError>;
}

/// Verification capability bound to one identity.
pub trait Verifier: Send + Sync {
    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), SigningError>;
}

/// Ed25519 signer. Its identity is the 32-byte verifying key.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(seed),
        }
    }

    pub fn verifier(&self) -> Ed25519Verifier {
        Ed25519Verifier {
            key: self.key.verifying_key(),
        }
    }
}

impl Signer for Ed25519Signer {
    fn identity(&self) -> Identity {
        Identity::new(self.key.verifying_key().to_bytes().to_vec())
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError> {
        Ok(self.key.sign(message).to_bytes().to_vec())
    }
}

pub struct Ed25519Verifier {
    key: VerifyingKey,
}

impl Ed25519Verifier {
    /// Recover the verifier from identity bytes.
    pub fn from_identity(identity: &Identity) -> Result<Self, SigningError> {
        let bytes: [u8; 32] = identity
            .as_bytes()
            .try_into()
            .map_err(|_| SigningError::MalformedIdentity(identity.clone()))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|_| SigningError::MalformedIdentity(identity.clone()))?;
        Ok(Self { key })
    }
}

impl Verifier for Ed25519Verifier {
    fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), SigningError> {
        let sig = Signature::from_slice(signature).map_err(|_| SigningError::InvalidSignature)?;
        self.key
            .verify(message, &sig)
            .map_err(|_| SigningError::InvalidSignature)
    }
}

/// Bytes signed to authorize `raw` within transaction `tx_id`: `raw || tx_id`.
pub fn signing_message(raw: &[u8], tx_id: &str) -> Vec<u8> {
    let mut msg = Vec::with_capacity(raw.len() + tx_id.len());
    msg.extend_from_slice(raw);
    msg.extend_from_slice(tx_id.as_bytes());
    msg
}

/// What an owner identity discloses to the auditor: the enrollment id of its
/// holder, signed with the identity's own key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInfo {
    pub enrollment_id: String,
    #[serde(with = "crate::codec::hex_bytes")]
    pub signature: Vec<u8>,
}

impl AuditInfo {
    pub fn sign(signer: &dyn Signer, enrollment_id: &str) -> Result<Self, SigningError> {
        let signature = signer.sign(&Self::message(&signer.identity(), enrollment_id))?;
        Ok(Self {
            enrollment_id: enrollment_id.to_string(),
            signature,
        })
    }

    /// Check that `owner` vouches for this enrollment id.
    pub fn verify(&self, owner: &Identity) -> Result<(), SigningError> {
        Ed25519Verifier::from_identity(owner)?
            .verify(&Self::message(owner, &self.enrollment_id), &self.signature)
            .map_err(|_| SigningError::InvalidAuditInfo(owner.clone()))
    }

    /// Decode `raw` and check it against `owner` in one go.
    pub fn open(raw: &[u8], owner: &Identity) -> Result<Self, SigningError> {
        let info: Self = serde_json::from_slice(raw)
            .map_err(|_| SigningError::InvalidAuditInfo(owner.clone()))?;
        info.verify(owner)?;
        Ok(info)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    fn message(owner: &Identity, enrollment_id: &str) -> Vec<u8> {
        let mut msg = labels::AUDIT_INFO.to_vec();
        msg.extend_from_slice(owner.as_bytes());
        msg.extend_from_slice(enrollment_id.as_bytes());
        msg
    }
}
