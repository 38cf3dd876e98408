use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use ctoken_primitives::{PublicParameters, Token, TokenId, TokenRequest};
use ctoken_verifier::verify_request;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::{
    error::LedgerError,
    network::{Envelope, Invocation, Ledger},
    vault::{RwSet, keys},
};

/// Ledger that validates token requests the way a token chaincode would and
/// keeps the world state of one namespace in memory.
pub struct MemoryLedger {
    pp: Arc<PublicParameters>,
    namespace: String,
    world: Mutex<BTreeMap<String, Vec<u8>>>,
}

/// Spent marker of `id` under graph hiding.
fn serial_number(id: &TokenId) -> String {
    let mut h = Sha256::new();
    h.update(id.tx_id.as_bytes());
    h.update(id.index.to_le_bytes());
    hex::encode(h.finalize())
}

impl MemoryLedger {
    pub fn new(pp: Arc<PublicParameters>, namespace: impl Into<String>) -> Self {
        Self {
            pp,
            namespace: namespace.into(),
            world: Mutex::new(BTreeMap::new()),
        }
    }

    /// Current world-state value of `key`.
    pub fn get_state(&self, key: &str) -> Option<Vec<u8>> {
        self.world.lock().get(key).cloned()
    }

    fn setup(&self) -> Result<RwSet, LedgerError> {
        let mut rws = RwSet::default();
        let raw = self
            .pp
            .to_bytes()
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        rws.set_state(&self.namespace, keys::params_key()?, raw);
        Ok(rws)
    }

    fn token_request(
        &self,
        world: &BTreeMap<String, Vec<u8>>,
        tx_id: &str,
        raw: &[u8],
    ) -> Result<RwSet, LedgerError> {
        let ns = &self.namespace;
        let request = TokenRequest::from_bytes(raw)?;
        verify_request(&request, &self.pp, tx_id)?;

        let request_key = keys::token_request_key(tx_id)?;
        if world.contains_key(&request_key) {
            return Err(LedgerError::Rejected(format!("transaction {tx_id} already recorded")));
        }

        let mut rws = RwSet::default();
        let mut spent = HashSet::new();
        for transfer in &request.transfers {
            for (id, token) in transfer.inputs.iter().zip(&transfer.input_tokens) {
                if !spent.insert(id.clone()) {
                    return Err(LedgerError::Rejected(format!("input {id} spent twice")));
                }
                let key = keys::token_key(&id.tx_id, id.index)?;
                let stored = world
                    .get(&key)
                    .ok_or_else(|| LedgerError::Rejected(format!("input {id} does not exist")))?;
                let stored: Token = serde_json::from_slice(stored)?;
                if stored != *token {
                    return Err(LedgerError::Rejected(format!(
                        "input {id} does not match the ledger"
                    )));
                }

                if self.pp.graph_hiding {
                    let sn_key = keys::serial_number_key(&serial_number(id))?;
                    if world.contains_key(&sn_key) {
                        return Err(LedgerError::Rejected(format!("input {id} already spent")));
                    }
                    rws.set_state(ns, sn_key, vec![1]);
                } else {
                    rws.delete_state(ns, key);
                }
            }
        }

        for (index, token) in request.outputs() {
            if token.owner.is_none() {
                // redeemed
                continue;
            }
            rws.set_state(ns, keys::token_key(tx_id, index)?, serde_json::to_vec(token)?);
        }
        rws.set_state(ns, request_key, raw.to_vec());
        Ok(rws)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn invoke(&self, invocation: Invocation) -> Result<Envelope, LedgerError> {
        if invocation.namespace != self.namespace {
            return Err(LedgerError::Rejected(format!(
                "unknown namespace {}",
                invocation.namespace
            )));
        }
        let tx_id = invocation.tx_id.as_str();
        debug!(tx_id, function = %invocation.function, "invoke");

        let mut world = self.world.lock();
        let rws = match invocation.function.as_str() {
            "setup" => self.setup()?,
            "invoke" => self.token_request(&world, tx_id, &invocation.request)?,
            other => return Err(LedgerError::UnknownFunction(other.to_string())),
        };

        for (key, value) in rws.writes(&self.namespace) {
            if value.is_empty() {
                world.remove(&key);
            } else {
                world.insert(key, value);
            }
        }
        drop(world);

        let results = rws.to_bytes()?;
        let endorsement = Sha256::digest(&results).to_vec();
        info!(tx_id, writes = rws.num_writes(&self.namespace), "request recorded");
        Ok(Envelope {
            tx_id: invocation.tx_id,
            function: invocation.function,
            results,
            endorsement,
        })
    }
}
