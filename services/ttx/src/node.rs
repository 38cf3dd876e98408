use std::sync::Arc;

use ctoken_primitives::{Identity, PublicParameters};

use crate::{
    config::TtxConfig,
    network::{EndpointResolver, Ledger, Transport, WalletService},
    vault::Vault,
};

/// Everything one token node needs to run the transaction protocols.
#[derive(Clone)]
pub struct Node {
    /// Long-term identity of this node.
    pub me: Identity,
    pub config: Arc<TtxConfig>,
    pub pp: Arc<PublicParameters>,
    pub ledger: Arc<dyn Ledger>,
    pub vault: Arc<dyn Vault>,
    pub transport: Arc<dyn Transport>,
    pub wallets: Arc<dyn WalletService>,
    pub resolver: Arc<dyn EndpointResolver>,
}

impl Node {
    /// Long-term identity behind `party`; local identities resolve to us.
    pub fn long_term(&self, party: &Identity) -> Result<Identity, crate::error::TransportError> {
        if self.wallets.is_me(party) {
            return Ok(self.me.clone());
        }
        self.resolver.resolve(party)
    }
}
