use std::sync::Arc;

use ctoken_primitives::{PublicParameters, Token, TokenId, TokenRequestMetadata};
use tracing::{debug, warn};

use super::{
    ProcessedTx, RwSet, RwSetProcessor, StoredToken, TRANSIENT_METADATA_KEY,
    keys::{self, TOKEN_KEY_PREFIX},
};
use crate::{error::VaultError, network::WalletService};

/// Recovers plaintext token records from the writes of committed token
/// transactions.
///
/// For every output this node can open: owned outputs get a `mine` marker
/// and an owned record, otherwise an auditor node keeps an audit record.
/// Outputs of a local issuer are also kept in the issuance history.
pub struct TokenProcessor {
    namespace: String,
    pp: Arc<PublicParameters>,
    wallets: Arc<dyn WalletService>,
}

impl TokenProcessor {
    pub fn new(
        namespace: impl Into<String>,
        pp: Arc<PublicParameters>,
        wallets: Arc<dyn WalletService>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pp,
            wallets,
        }
    }

    fn setup(&self, tx: ProcessedTx<'_>, ns: &str, rws: &mut RwSet) -> Result<(), VaultError> {
        debug!(tx_id = tx.tx_id, "store setup bundle");
        rws.set_state(ns, keys::setup_key()?, tx.tx_id.as_bytes().to_vec());
        Ok(())
    }

    fn token_request(
        &self,
        tx: ProcessedTx<'_>,
        ns: &str,
        rws: &mut RwSet,
    ) -> Result<(), VaultError> {
        let tx_id = tx.tx_id;
        let Some(raw) = tx.transient.and_then(|t| t.get(TRANSIENT_METADATA_KEY)) else {
            debug!(tx_id, "transaction not known to this node, no tokens to extract");
            return Ok(());
        };
        let metadata = TokenRequestMetadata::from_bytes(raw)?;

        if self.pp.graph_hiding {
            for id in metadata.spent_token_ids() {
                delete_owned(ns, &id.tx_id, id.index, rws)?;
            }
        }

        // snapshot, our own writes are not reprocessed
        for (key, value) in rws.writes(ns) {
            let (prefix, components) = keys::split_composite_key(&key)?;
            if prefix != TOKEN_KEY_PREFIX {
                continue;
            }
            let Some(first) = components.first() else {
                continue;
            };
            if matches!(
                first.as_str(),
                keys::MINE | keys::TOKEN_REQUEST | keys::SERIAL_NUMBER | keys::SETUP | keys::PARAMS
            ) {
                continue;
            }
            let index = components
                .get(1)
                .and_then(|c| c.parse::<u64>().ok())
                .ok_or_else(|| VaultError::InvalidKey(key.clone()))?;

            if value.is_empty() {
                delete_owned(ns, first, index, rws)?;
                continue;
            }
            if first != tx_id {
                return Err(VaultError::ForeignOutput {
                    tx_id: tx_id.to_string(),
                    found: first.clone(),
                });
            }
            self.store_output(tx_id, index, &value, &metadata, ns, rws)?;
        }
        Ok(())
    }

    fn store_output(
        &self,
        tx_id: &str,
        index: u64,
        raw_token: &[u8],
        metadata: &TokenRequestMetadata,
        ns: &str,
        rws: &mut RwSet,
    ) -> Result<(), VaultError> {
        let token: Token = serde_json::from_slice(raw_token)?;
        let Some((output, issuer)) = metadata.output(index) else {
            warn!(tx_id, index, "no metadata for output, skipping");
            return Ok(());
        };
        let Some(opening) = output
            .opening
            .as_ref()
            .filter(|o| o.opens(&self.pp, &token))
        else {
            debug!(tx_id, index, "output cannot be opened here, skipping");
            return Ok(());
        };

        let record = StoredToken {
            id: TokenId::new(tx_id, index),
            token,
            opening: opening.clone(),
            issuer: issuer.cloned(),
        };
        let raw = serde_json::to_vec(&record)?;

        if self.wallets.is_owner(&record.token.owner) {
            debug!(tx_id, index, "output is mine");
            rws.set_state(ns, keys::mine_key(tx_id, index)?, vec![1]);
            rws.set_state(ns, keys::owned_token_key(tx_id, index)?, raw.clone());
        } else if self.wallets.is_auditor() {
            debug!(tx_id, index, "recording output for audit");
            rws.set_state(ns, keys::audit_token_key(tx_id, index)?, raw.clone());
        }

        if issuer.is_some_and(|i| !i.is_none() && self.wallets.is_issuer(i)) {
            debug!(tx_id, index, "output issued by me");
            rws.set_state(ns, keys::issued_token_key(tx_id, index)?, raw);
        }
        Ok(())
    }
}

fn delete_owned(ns: &str, tx_id: &str, index: u64, rws: &mut RwSet) -> Result<(), VaultError> {
    rws.delete_state(ns, keys::owned_token_key(tx_id, index)?);
    rws.delete_state(ns, keys::mine_key(tx_id, index)?);
    Ok(())
}

impl RwSetProcessor for TokenProcessor {
    fn process(&self, tx: ProcessedTx<'_>, ns: &str, rws: &mut RwSet) -> Result<(), VaultError> {
        if ns != self.namespace {
            return Err(VaultError::Namespace(ns.to_string()));
        }
        debug!(tx_id = tx.tx_id, function = tx.function, "process namespace");
        match tx.function {
            "setup" => self.setup(tx, ns, rws),
            _ => self.token_request(tx, ns, rws),
        }
    }
}
