//! Token requests (what goes to the ledger) and their metadata (what stays
//! off-ledger, transmitted to entitled parties only).

use serde::{Deserialize, Serialize};

use crate::{
    action::{IssueAction, TransferAction},
    identity::Identity,
    token::{Token, TokenId, TokenOpening},
};

/// All actions of one ledger transaction plus the accumulated signatures.
///
/// `signatures[i]` authorizes `signers()[i]`; the only mutation after
/// construction is appending signatures.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    pub issues: Vec<IssueAction>,
    pub transfers: Vec<TransferAction>,
    #[serde(with = "crate::codec::hex_bytes_vec")]
    pub signatures: Vec<Vec<u8>>,
    #[serde(with = "crate::codec::hex_bytes_vec")]
    pub auditor_signatures: Vec<Vec<u8>>,
}

#[derive(Serialize)]
struct Unsigned<'a> {
    issues: &'a [IssueAction],
    transfers: &'a [TransferAction],
}

impl TokenRequest {
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty() && self.transfers.is_empty()
    }

    /// Required signers: each issuer, then each transfer input owner.
    pub fn signers(&self) -> Vec<Identity> {
        let issuers = self.issues.iter().map(|a| a.issuer.clone());
        let senders = self.transfers.iter().flat_map(|a| a.senders().cloned());
        issuers.chain(senders).collect()
    }

    /// Deterministic encoding of the actions, without signatures.
    pub fn marshal_to_sign(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&Unsigned {
            issues: &self.issues,
            transfers: &self.transfers,
        })
    }

    pub fn append_signature(&mut self, signature: Vec<u8>) {
        self.signatures.push(signature);
    }

    pub fn append_auditor_signature(&mut self, signature: Vec<u8>) {
        self.auditor_signatures.push(signature);
    }

    /// Every output with its ledger index: issues first, then transfers.
    pub fn outputs(&self) -> Vec<(u64, &Token)> {
        let issued = self.issues.iter().flat_map(|a| a.outputs.iter());
        let transferred = self.transfers.iter().flat_map(|a| a.outputs.iter());
        issued
            .chain(transferred)
            .enumerate()
            .map(|(i, t)| (i as u64, t))
            .collect()
    }

    pub fn spent_token_ids(&self) -> Vec<TokenId> {
        self.transfers
            .iter()
            .flat_map(|a| a.inputs.iter().cloned())
            .collect()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMetadata {
    pub owner: Identity,
    /// `None` once filtered out for a party not entitled to it.
    pub opening: Option<TokenOpening>,
    #[serde(with = "crate::codec::hex_bytes")]
    pub audit_info: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueMetadata {
    pub issuer: Identity,
    pub outputs: Vec<OutputMetadata>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetadata {
    pub token_ids: Vec<TokenId>,
    pub senders: Vec<Identity>,
    pub inputs: Vec<Option<TokenOpening>>,
    pub outputs: Vec<OutputMetadata>,
}

impl TransferMetadata {
    pub fn receivers(&self) -> impl Iterator<Item = &Identity> {
        self.outputs.iter().map(|o| &o.owner)
    }
}

/// Off-ledger openings, parallel to a [`TokenRequest`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequestMetadata {
    pub issues: Vec<IssueMetadata>,
    pub transfers: Vec<TransferMetadata>,
}

impl TokenRequestMetadata {
    /// Copy retaining only the openings `identities` are entitled to: outputs
    /// they own or issued, inputs they spent.
    pub fn filter_by(&self, identities: &[Identity]) -> Self {
        let keep = |id: &Identity| identities.contains(id);
        let filter_output = |o: &OutputMetadata, issuer: Option<&Identity>| OutputMetadata {
            owner: o.owner.clone(),
            opening: if keep(&o.owner) || issuer.is_some_and(keep) {
                o.opening.clone()
            } else {
                None
            },
            audit_info: Vec::new(),
        };

        Self {
            issues: self
                .issues
                .iter()
                .map(|m| IssueMetadata {
                    issuer: m.issuer.clone(),
                    outputs: m
                        .outputs
                        .iter()
                        .map(|o| filter_output(o, Some(&m.issuer)))
                        .collect(),
                })
                .collect(),
            transfers: self
                .transfers
                .iter()
                .map(|m| TransferMetadata {
                    token_ids: m.token_ids.clone(),
                    senders: m.senders.clone(),
                    inputs: m
                        .senders
                        .iter()
                        .zip(&m.inputs)
                        .map(|(s, o)| if keep(s) { o.clone() } else { None })
                        .collect(),
                    outputs: m.outputs.iter().map(|o| filter_output(o, None)).collect(),
                })
                .collect(),
        }
    }

    pub fn spent_token_ids(&self) -> Vec<TokenId> {
        self.transfers
            .iter()
            .flat_map(|m| m.token_ids.iter().cloned())
            .collect()
    }

    /// Output metadata at ledger index `index` (same order as
    /// [`TokenRequest::outputs`]) and the issuer, for issued outputs.
    pub fn output(&self, index: u64) -> Option<(&OutputMetadata, Option<&Identity>)> {
        let issued = self
            .issues
            .iter()
            .flat_map(|m| m.outputs.iter().map(move |o| (o, Some(&m.issuer))));
        let transferred = self
            .transfers
            .iter()
            .flat_map(|m| m.outputs.iter().map(|o| (o, None)));
        issued.chain(transferred).nth(usize::try_from(index).ok()?)
    }

    /// Issuers, senders and receivers of every action, in request order.
    pub fn parties(&self) -> Vec<Identity> {
        let mut out = Vec::new();
        for m in &self.issues {
            out.push(m.issuer.clone());
            out.extend(m.outputs.iter().map(|o| o.owner.clone()));
        }
        for m in &self.transfers {
            out.extend(m.senders.iter().cloned());
            out.extend(m.receivers().cloned());
        }
        out
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}
