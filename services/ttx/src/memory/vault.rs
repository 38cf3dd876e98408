use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    error::VaultError,
    network::Envelope,
    vault::{ProcessedTx, RwSet, RwSetProcessor, TransientMap, Vault},
};

#[derive(Default)]
struct VaultState {
    /// namespace -> key -> value
    state: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    transient: HashMap<String, TransientMap>,
    envelopes: HashMap<String, Envelope>,
    committed: HashSet<String>,
}

/// Vault holding everything in memory. Commits run the namespace's processor
/// and apply the resulting write-set under one lock.
#[derive(Default)]
pub struct MemoryVault {
    processors: BTreeMap<String, Arc<dyn RwSetProcessor>>,
    inner: Mutex<VaultState>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `processor` on the writes of `ns` at every commit.
    pub fn with_processor(
        mut self,
        ns: impl Into<String>,
        processor: Arc<dyn RwSetProcessor>,
    ) -> Self {
        self.processors.insert(ns.into(), processor);
        self
    }
}

impl Vault for MemoryVault {
    fn exists(&self, tx_id: &str) -> bool {
        self.inner.lock().committed.contains(tx_id)
    }

    fn store_transient(&self, tx_id: &str, map: TransientMap) -> Result<(), VaultError> {
        self.inner.lock().transient.insert(tx_id.to_string(), map);
        Ok(())
    }

    fn load_transient(&self, tx_id: &str) -> Option<TransientMap> {
        self.inner.lock().transient.get(tx_id).cloned()
    }

    fn get_rwset(&self, _tx_id: &str, results: &[u8]) -> Result<RwSet, VaultError> {
        Ok(RwSet::from_bytes(results)?)
    }

    fn store_envelope(&self, envelope: &Envelope) -> Result<(), VaultError> {
        self.inner
            .lock()
            .envelopes
            .insert(envelope.tx_id.clone(), envelope.clone());
        Ok(())
    }

    fn commit(&self, tx_id: &str) -> Result<(), VaultError> {
        let mut inner = self.inner.lock();
        if inner.committed.contains(tx_id) {
            debug!(tx_id, "already committed");
            return Ok(());
        }
        let envelope = inner
            .envelopes
            .get(tx_id)
            .ok_or_else(|| VaultError::UnknownTransaction(tx_id.to_string()))?;
        let mut rws = RwSet::from_bytes(&envelope.results)?;

        let tx = ProcessedTx {
            tx_id,
            function: &envelope.function,
            transient: inner.transient.get(tx_id),
        };
        let namespaces: Vec<String> = rws.namespaces().map(str::to_string).collect();
        for ns in &namespaces {
            if let Some(processor) = self.processors.get(ns) {
                processor.process(tx, ns, &mut rws)?;
            }
        }

        for ns in &namespaces {
            let state = inner.state.entry(ns.clone()).or_default();
            for (key, value) in rws.writes(ns) {
                if value.is_empty() {
                    state.remove(&key);
                } else {
                    state.insert(key, value);
                }
            }
        }
        inner.committed.insert(tx_id.to_string());
        debug!(tx_id, "committed");
        Ok(())
    }

    fn get_state(&self, ns: &str, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().state.get(ns)?.get(key).cloned()
    }

    fn states_with_prefix(&self, ns: &str, prefix: &str) -> Vec<(String, Vec<u8>)> {
        let inner = self.inner.lock();
        let Some(state) = inner.state.get(ns) else {
            return Vec::new();
        };
        state
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
