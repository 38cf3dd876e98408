//! Collaborators a token node talks to: the ledger, peer sessions, the local
//! wallets and the endpoint directory.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use ctoken_primitives::{Identity, Signer, SigningError, Verifier};
use serde::{Deserialize, Serialize};

use crate::{
    error::{LedgerError, TransportError, TtxError},
    wire::{RecipientData, WireMessage},
};

/// One call into the token namespace of the ledger.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub network: String,
    pub channel: String,
    pub namespace: String,
    pub invoker: Identity,
    pub tx_id: String,
    pub function: String,
    pub request: Vec<u8>,
}

/// Endorsed result of an invocation: the serialized write-set plus the
/// ledger's endorsement over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub tx_id: String,
    pub function: String,
    #[serde(with = "ctoken_primitives::codec::hex_bytes")]
    pub results: Vec<u8>,
    #[serde(with = "ctoken_primitives::codec::hex_bytes")]
    pub endorsement: Vec<u8>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn invoke(&self, invocation: Invocation) -> Result<Envelope, LedgerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub status: Status,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    /// Long-term identity of the other side.
    pub caller: Identity,
}

/// Ordered, bidirectional channel with one peer.
#[async_trait]
pub trait Session: Send + Sync {
    fn info(&self) -> SessionInfo;
    async fn send(&self, payload: Vec<u8>) -> Result<(), TransportError>;
    async fn send_error(&self, message: String) -> Result<(), TransportError>;
    async fn receive(&self) -> Result<Message, TransportError>;
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Session with the node behind `party` for protocol instance `context`.
    /// Repeated calls with the same context and node return the same session.
    async fn session(
        &self,
        context: &str,
        party: &Identity,
    ) -> Result<Arc<dyn Session>, TransportError>;

    /// Forget the sessions of protocol instance `context` once it is over.
    fn close(&self, context: &str);
}

/// How an identity's signature can be obtained.
pub enum SigningCapability {
    Local(Arc<dyn Signer>),
    Remote(Identity),
}

/// Wallets of the local node.
pub trait WalletService: Send + Sync {
    /// True if any local wallet holds `id`.
    fn is_me(&self, id: &Identity) -> bool;
    fn is_owner(&self, id: &Identity) -> bool;
    fn is_issuer(&self, id: &Identity) -> bool;
    fn is_auditor(&self) -> bool;
    fn signer(&self, id: &Identity) -> Option<Arc<dyn Signer>>;
    fn verifier(&self, id: &Identity) -> Result<Box<dyn Verifier>, SigningError>;
    /// Fresh pseudonym of an owner wallet (the default wallet for `None`).
    fn recipient_identity(&self, wallet: Option<&str>) -> Result<Identity, SigningError>;
    /// What the auditor learns about the holder of `id`, for local identities
    /// and registered recipients.
    fn audit_info(&self, id: &Identity) -> Result<Vec<u8>, SigningError>;
    fn token_metadata(&self, id: &Identity) -> Result<Vec<u8>, SigningError>;
    /// Remember a remote recipient identity. Its audit info must belong to it.
    fn register_recipient_identity(&self, data: &RecipientData) -> Result<(), SigningError>;

    fn signing_capability(&self, id: &Identity) -> SigningCapability {
        match self.signer(id) {
            Some(signer) => SigningCapability::Local(signer),
            None => SigningCapability::Remote(id.clone()),
        }
    }
}

/// Maps pseudonyms to the long-term identity of the node holding them.
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self, id: &Identity) -> Result<Identity, TransportError>;
    fn bind(&self, long_term: &Identity, id: &Identity);
}

/// Next reply from `party`, bounded by `limit`. An error status from the
/// other side becomes [`TtxError::Remote`].
pub(crate) async fn read_reply(
    session: &dyn Session,
    party: &Identity,
    limit: Option<Duration>,
) -> Result<Vec<u8>, TtxError> {
    let msg = match limit {
        Some(limit) => tokio::time::timeout(limit, session.receive())
            .await
            .map_err(|_| TtxError::PartyTimeout {
                party: party.clone(),
            })??,
        None => session.receive().await?,
    };
    match msg.status {
        Status::Ok => Ok(msg.payload),
        Status::Error => Err(TtxError::Remote(
            String::from_utf8_lossy(&msg.payload).into_owned(),
        )),
    }
}

pub(crate) async fn read_message(
    session: &dyn Session,
    party: &Identity,
    limit: Option<Duration>,
) -> Result<WireMessage, TtxError> {
    let raw = read_reply(session, party, limit).await?;
    Ok(serde_json::from_slice(&raw)?)
}

pub(crate) async fn send_message(
    session: &dyn Session,
    message: &WireMessage,
) -> Result<(), TtxError> {
    session.send(serde_json::to_vec(message)?).await?;
    Ok(())
}

/// Send `message` and wait for the single reply to it.
pub(crate) async fn request_reply(
    session: &dyn Session,
    message: &WireMessage,
    party: &Identity,
    limit: Option<Duration>,
) -> Result<Vec<u8>, TtxError> {
    send_message(session, message).await?;
    read_reply(session, party, limit).await
}
