//! Session payloads. Requests travel as a tagged [`WireMessage`] so a
//! responder can dispatch on the first one; replies are raw (signatures,
//! `b"ack"`) or a bare JSON record ([`RecipientData`]).

use ctoken_primitives::{
    Identity, TokenRequest, TokenRequestMetadata, signing_message,
};
use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;

/// Acknowledgement of a committed transaction.
pub const ACK: &[u8] = b"ack";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRequest {
    pub request: TokenRequest,
    pub tx_id: String,
    pub signer: Identity,
}

impl SignatureRequest {
    pub fn message_to_sign(&self) -> Result<Vec<u8>, serde_json::Error> {
        Ok(signing_message(&self.request.marshal_to_sign()?, &self.tx_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRequest {
    pub request: TokenRequest,
    pub metadata: TokenRequestMetadata,
    pub tx_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientData {
    pub identity: Identity,
    #[serde(with = "ctoken_primitives::codec::hex_bytes")]
    pub audit_info: Vec<u8>,
    #[serde(with = "ctoken_primitives::codec::hex_bytes")]
    pub metadata: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRequest {
    pub channel: String,
    pub wallet_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRecipientRequest {
    pub channel: String,
    pub wallet_id: Option<String>,
    pub recipient_data: RecipientData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum WireMessage {
    SignatureRequest(SignatureRequest),
    AuditRequest(AuditRequest),
    Transaction(Box<Transaction>),
    RecipientRequest(RecipientRequest),
    ExchangeRecipientRequest(ExchangeRecipientRequest),
}
