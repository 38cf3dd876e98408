use ctoken_primitives::{
    Action, Identity, PublicParameters, TokenRequest, TokenRequestMetadata,
};
use ctoken_prover::{Issuer, ProverError, Sender};
use ctoken_verifier::{VerificationError, verify_action};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    config::TtxConfig,
    error::{TtxError, VaultError},
    network::{Envelope, WalletService},
    vault::{StoredToken, TRANSIENT_METADATA_KEY, TransientMap, Vault},
};

const NONCE_LEN: usize = 24;

/// `hex(SHA-256(nonce || creator))`.
pub fn compute_tx_id(nonce: &[u8], creator: &Identity) -> String {
    let mut h = Sha256::new();
    h.update(nonce);
    h.update(creator.as_bytes());
    hex::encode(h.finalize())
}

/// A token transaction under construction or in flight: the request that
/// goes to the ledger, the metadata that stays off-ledger, and, once
/// endorsed, the ledger envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub network: String,
    pub channel: String,
    pub namespace: String,
    pub creator: Identity,
    #[serde(with = "ctoken_primitives::codec::hex_bytes")]
    pub nonce: Vec<u8>,
    pub request: TokenRequest,
    pub metadata: TokenRequestMetadata,
    pub auditor: Option<Identity>,
    pub envelope: Option<Envelope>,
}

impl Transaction {
    pub fn new<R: RngCore>(
        config: &TtxConfig,
        creator: Identity,
        auditor: Option<Identity>,
        rng: &mut R,
    ) -> Self {
        let mut nonce = vec![0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);
        Self {
            id: compute_tx_id(&nonce, &creator),
            network: config.network.clone(),
            channel: config.channel.clone(),
            namespace: config.namespace.clone(),
            creator,
            nonce,
            request: TokenRequest::default(),
            metadata: TokenRequestMetadata::default(),
            auditor,
            envelope: None,
        }
    }

    /// Append an issue of `values` of `token_type` to `owners`.
    pub fn issue<R: RngCore>(
        &mut self,
        pp: &PublicParameters,
        issuer: &Identity,
        token_type: &str,
        values: &[u64],
        owners: &[Identity],
        rng: &mut R,
    ) -> Result<(), TtxError> {
        let (action, metadata) =
            Issuer::new(pp, issuer.clone()).generate_issue(token_type, values, owners, rng)?;
        self.request.issues.push(action);
        self.metadata.issues.push(metadata);
        Ok(())
    }

    /// Append a transfer spending all of `inputs` into `values` for `owners`.
    pub fn transfer<R: RngCore>(
        &mut self,
        pp: &PublicParameters,
        inputs: &[StoredToken],
        values: &[u64],
        owners: &[Identity],
        rng: &mut R,
    ) -> Result<(), TtxError> {
        let sender = Sender::new(
            pp,
            inputs.iter().map(|t| t.id.clone()).collect(),
            inputs.iter().map(|t| t.token.clone()).collect(),
            inputs.iter().map(|t| t.opening.clone()).collect(),
        )?;
        let (action, metadata) = sender.generate_transfer(values, owners, rng)?;
        self.request.transfers.push(action);
        self.metadata.transfers.push(metadata);
        Ok(())
    }

    /// Append a redemption of `value` out of `inputs`. The redeemed amount goes
    /// to nobody; any change goes to `change_owner`.
    pub fn redeem<R: RngCore>(
        &mut self,
        pp: &PublicParameters,
        inputs: &[StoredToken],
        value: u64,
        change_owner: &Identity,
        rng: &mut R,
    ) -> Result<(), TtxError> {
        let total: u128 = inputs.iter().map(|t| t.value() as u128).sum();
        let change = total
            .checked_sub(value as u128)
            .and_then(|c| u64::try_from(c).ok())
            .ok_or_else(|| ProverError::Unbalanced {
                token_type: inputs
                    .first()
                    .map(|t| t.token_type().to_string())
                    .unwrap_or_default(),
                inputs: total,
                outputs: value as u128,
            })?;
        if change == 0 {
            self.transfer(pp, inputs, &[value], &[Identity::none()], rng)
        } else {
            self.transfer(
                pp,
                inputs,
                &[value, change],
                &[Identity::none(), change_owner.clone()],
                rng,
            )
        }
    }

    /// Run public verification on every action.
    pub fn verify(&self, pp: &PublicParameters) -> Result<(), VerificationError> {
        for action in &self.request.issues {
            verify_action(&Action::Issue(action.clone()), pp)?;
        }
        for action in &self.request.transfers {
            verify_action(&Action::Transfer(action.clone()), pp)?;
        }
        Ok(())
    }

    /// Every party the transaction concerns, from the public request:
    /// issuers and their receivers, senders and their receivers.
    pub fn parties(&self) -> Vec<Identity> {
        let mut out = Vec::new();
        for issue in &self.request.issues {
            out.push(issue.issuer.clone());
            out.extend(issue.outputs.iter().map(|t| t.owner.clone()));
        }
        for transfer in &self.request.transfers {
            out.extend(transfer.senders().cloned());
            out.extend(transfer.outputs.iter().map(|t| t.owner.clone()));
        }
        out
    }

    /// Attach to every owned output the audit info `wallets` holds for its
    /// owner. Redeemed outputs have none.
    pub fn attach_audit_info(&mut self, wallets: &dyn WalletService) -> Result<(), TtxError> {
        let issued = self.metadata.issues.iter_mut().flat_map(|m| m.outputs.iter_mut());
        let transferred = self
            .metadata
            .transfers
            .iter_mut()
            .flat_map(|m| m.outputs.iter_mut());
        for output in issued.chain(transferred) {
            if !output.owner.is_none() {
                output.audit_info = wallets.audit_info(&output.owner)?;
            }
        }
        Ok(())
    }

    /// Copy carrying only the openings `identities` are entitled to.
    pub fn filtered_for(&self, identities: &[Identity]) -> Self {
        Self {
            metadata: self.metadata.filter_by(identities),
            ..self.clone()
        }
    }

    pub fn transient(&self) -> Result<TransientMap, serde_json::Error> {
        let mut map = TransientMap::new();
        map.insert(TRANSIENT_METADATA_KEY.to_string(), self.metadata.to_bytes()?);
        Ok(map)
    }

    pub fn store_transient(&self, vault: &dyn Vault) -> Result<(), VaultError> {
        vault.store_transient(&self.id, self.transient()?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}
