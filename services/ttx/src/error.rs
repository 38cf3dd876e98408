use ctoken_primitives::{Identity, SigningError};
use ctoken_prover::ProverError;
use ctoken_verifier::{AuditError, VerificationError};
use thiserror::Error;

use crate::vault::keys::KeyError;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unknown function {0}")]
    UnknownFunction(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("request does not verify: {0}")]
    Verification(#[from] VerificationError),
    #[error("malformed request: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error(transparent)]
    Key(#[from] KeyError),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no endpoint known for {0}")]
    Unreachable(Identity),
    #[error("session closed by the other side")]
    Closed,
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("no envelope stored for transaction {0}")]
    UnknownTransaction(String),
    #[error("namespace {0} is not handled here")]
    Namespace(String),
    #[error("invalid output key {0:?}")]
    InvalidKey(String),
    #[error("transaction {tx_id} writes output of transaction {found}")]
    ForeignOutput { tx_id: String, found: String },
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Failure of a token transaction protocol.
///
/// Nothing is retried; an error aborts the protocol instance. Steps already
/// done (signatures handed out, a local commit) are not rolled back.
#[derive(Debug, Error)]
pub enum TtxError {
    #[error("timed out waiting for {party}")]
    PartyTimeout { party: Identity },
    #[error("signature from {party} does not verify")]
    InvalidRemoteSignature { party: Identity },
    #[error("identity {0} is not mine")]
    NotMyIdentity(Identity),
    #[error("remote party failed: {0}")]
    Remote(String),
    #[error("no ledger envelope for transaction {tx_id}")]
    MissingEnvelope { tx_id: String },
    #[error("ledger invocation for transaction {tx_id} failed")]
    Ledger {
        tx_id: String,
        #[source]
        source: LedgerError,
    },
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Prover(#[from] ProverError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}
