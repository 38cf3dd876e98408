//! In-process token network
//!
//! A [`TestNetwork`] owns the ledger and the session hub; every
//! [`TestNode`] spawned on it serves its incoming sessions in the background
//! until it is dropped.

use std::sync::Arc;

use ctoken_primitives::{Identity, PublicParameters};
use ctoken_ttx::{
    Node, Served, TtxConfig, TtxError,
    memory::{MemoryLedger, MemoryNetwork, MemoryVault, MemoryWallets},
    network::EndpointResolver,
    serve,
    vault::processor::TokenProcessor,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{Instrument, info, info_span};

pub struct TestNetwork {
    pub network: MemoryNetwork,
    pub pp: Arc<PublicParameters>,
    pub ledger: Arc<MemoryLedger>,
    pub config: TtxConfig,
}

impl TestNetwork {
    pub fn new(pp: PublicParameters) -> Self {
        let config = TtxConfig::default();
        let pp = Arc::new(pp);
        Self {
            network: MemoryNetwork::new(),
            ledger: Arc::new(MemoryLedger::new(pp.clone(), config.namespace.clone())),
            pp,
            config,
        }
    }

    /// Attach a node named `name` holding `wallets` and start serving its
    /// incoming sessions. Every identity the wallets already hold (issuers,
    /// auditors) becomes reachable through the node.
    pub fn spawn_node(&self, name: &str, wallets: Arc<MemoryWallets>) -> TestNode {
        let me = Identity::new(name.as_bytes().to_vec());
        let (transport, mut incoming) = self.network.register(me.clone());
        for id in wallets.identities() {
            self.network.bind(&me, &id);
        }
        let ns = self.config.namespace.clone();
        let processor = TokenProcessor::new(ns.clone(), self.pp.clone(), wallets.clone());
        let node = Node {
            me,
            config: Arc::new(self.config.clone()),
            pp: self.pp.clone(),
            ledger: self.ledger.clone(),
            vault: Arc::new(MemoryVault::new().with_processor(ns, Arc::new(processor))),
            transport: Arc::new(transport),
            wallets: wallets.clone(),
            resolver: Arc::new(self.network.clone()),
        };

        let (results_tx, results) = mpsc::unbounded_channel();
        let server = node.clone();
        let accept_loop = tokio::spawn(
            async move {
                while let Some(session) = incoming.accept().await {
                    let node = server.clone();
                    let results_tx = results_tx.clone();
                    tokio::spawn(async move {
                        let _ = results_tx.send(serve(node, session).await);
                    });
                }
            }
            .instrument(info_span!("node", name)),
        );
        info!(name, "node started");

        TestNode {
            name: name.to_string(),
            node,
            wallets,
            results,
            accept_loop,
        }
    }
}

pub struct TestNode {
    pub name: String,
    pub node: Node,
    pub wallets: Arc<MemoryWallets>,
    results: mpsc::UnboundedReceiver<Result<Served, TtxError>>,
    accept_loop: JoinHandle<()>,
}

impl TestNode {
    /// Outcome of the next session this node served.
    pub async fn next_served(&mut self) -> Option<Result<Served, TtxError>> {
        self.results.recv().await
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}
