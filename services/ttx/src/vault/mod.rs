//! Local view of the ledger: committed state, transient (off-ledger) data,
//! and the write-set processing that turns opaque ledger writes into token
//! records this node may use.

pub mod keys;
pub mod processor;

use std::collections::BTreeMap;

use ctoken_primitives::{Identity, Token, TokenId, TokenOpening};
use serde::{Deserialize, Serialize};

use crate::{error::VaultError, network::Envelope};

/// Off-ledger data attached to a transaction, keyed by name.
pub type TransientMap = BTreeMap<String, Vec<u8>>;

/// Transient entry holding the serialized `TokenRequestMetadata`.
pub const TRANSIENT_METADATA_KEY: &str = "ctoken.metadata";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Write {
    key: String,
    #[serde(with = "ctoken_primitives::codec::hex_bytes")]
    value: Vec<u8>,
}

/// Ordered writes of one transaction, per namespace. An empty value deletes
/// the key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RwSet {
    writes: BTreeMap<String, Vec<Write>>,
}

impl RwSet {
    pub fn num_writes(&self, ns: &str) -> usize {
        self.writes.get(ns).map_or(0, Vec::len)
    }

    pub fn get_write_at(&self, ns: &str, i: usize) -> Option<(&str, &[u8])> {
        self.writes
            .get(ns)
            .and_then(|w| w.get(i))
            .map(|w| (w.key.as_str(), w.value.as_slice()))
    }

    /// Later writes to the same key replace earlier ones in place.
    pub fn set_state(&mut self, ns: &str, key: String, value: Vec<u8>) {
        let writes = self.writes.entry(ns.to_string()).or_default();
        match writes.iter_mut().find(|w| w.key == key) {
            Some(w) => w.value = value,
            None => writes.push(Write { key, value }),
        }
    }

    pub fn delete_state(&mut self, ns: &str, key: String) {
        self.set_state(ns, key, Vec::new());
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.writes.keys().map(String::as_str)
    }

    /// Owned copy of the writes of `ns`, in order.
    pub fn writes(&self, ns: &str) -> Vec<(String, Vec<u8>)> {
        self.writes
            .get(ns)
            .map(|w| w.iter().map(|w| (w.key.clone(), w.value.clone())).collect())
            .unwrap_or_default()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}

/// A transaction as seen by a write-set processor.
#[derive(Debug, Clone, Copy)]
pub struct ProcessedTx<'a> {
    pub tx_id: &'a str,
    pub function: &'a str,
    pub transient: Option<&'a TransientMap>,
}

/// Hook run by the vault on commit, before the write-set is applied. May add
/// writes of its own; runs under the vault's commit lock.
pub trait RwSetProcessor: Send + Sync {
    fn process(&self, tx: ProcessedTx<'_>, ns: &str, rws: &mut RwSet) -> Result<(), VaultError>;
}

/// Local ledger view of one node.
pub trait Vault: Send + Sync {
    /// True once `tx_id` has been committed locally.
    fn exists(&self, tx_id: &str) -> bool;
    fn store_transient(&self, tx_id: &str, map: TransientMap) -> Result<(), VaultError>;
    fn load_transient(&self, tx_id: &str) -> Option<TransientMap>;
    fn get_rwset(&self, tx_id: &str, results: &[u8]) -> Result<RwSet, VaultError>;
    fn store_envelope(&self, envelope: &Envelope) -> Result<(), VaultError>;
    /// Process and apply the stored envelope of `tx_id` atomically.
    fn commit(&self, tx_id: &str) -> Result<(), VaultError>;
    fn get_state(&self, ns: &str, key: &str) -> Option<Vec<u8>>;
    /// Every `(key, value)` of `ns` whose key starts with `prefix`, in key order.
    fn states_with_prefix(&self, ns: &str, prefix: &str) -> Vec<(String, Vec<u8>)>;
}

/// A token in the clear, as reconciliation records it locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub id: TokenId,
    pub token: Token,
    pub opening: TokenOpening,
    pub issuer: Option<Identity>,
}

impl StoredToken {
    pub fn value(&self) -> u64 {
        self.opening.value
    }

    pub fn token_type(&self) -> &str {
        &self.opening.token_type
    }
}

fn load_records(vault: &dyn Vault, ns: &str, prefix: &str) -> Result<Vec<StoredToken>, VaultError> {
    let start = keys::prefix_range(prefix)?;
    vault
        .states_with_prefix(ns, &start)
        .into_iter()
        .map(|(_, raw)| serde_json::from_slice(&raw).map_err(VaultError::from))
        .collect()
}

/// Unspent tokens owned by this node, optionally of one type.
pub fn owned_tokens(
    vault: &dyn Vault,
    ns: &str,
    token_type: Option<&str>,
) -> Result<Vec<StoredToken>, VaultError> {
    let mut tokens = load_records(vault, ns, keys::OWNED_TOKEN_PREFIX)?;
    if let Some(ty) = token_type {
        tokens.retain(|t| t.token_type() == ty);
    }
    Ok(tokens)
}

pub fn audit_tokens(vault: &dyn Vault, ns: &str) -> Result<Vec<StoredToken>, VaultError> {
    load_records(vault, ns, keys::AUDIT_TOKEN_PREFIX)
}

pub fn issued_tokens(vault: &dyn Vault, ns: &str) -> Result<Vec<StoredToken>, VaultError> {
    load_records(vault, ns, keys::ISSUED_TOKEN_PREFIX)
}

/// Sum of owned unspent value of `token_type`.
pub fn balance(vault: &dyn Vault, ns: &str, token_type: &str) -> Result<u128, VaultError> {
    Ok(owned_tokens(vault, ns, Some(token_type))?
        .iter()
        .map(|t| t.value() as u128)
        .sum())
}
