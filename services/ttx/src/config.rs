use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where token transactions go and how long each protocol step may wait.
///
/// Every field has a default, so a JSON document only needs to name what it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtxConfig {
    pub network: String,
    pub channel: String,
    /// Ledger namespace holding the token state.
    pub namespace: String,
    /// Wait for a remote signature, and for the first message a responder reads.
    pub signature_timeout_secs: u64,
    /// Wait for the auditor's signature.
    pub audit_timeout_secs: u64,
    /// Wait for a party to acknowledge the distributed transaction.
    pub distribution_timeout_secs: u64,
    /// Wait for a recipient identity.
    pub recipient_timeout_secs: u64,
    /// Wait for the other side of a recipient identity exchange.
    pub exchange_timeout_secs: u64,
    /// Responder wait for the final transaction; `None` waits forever.
    pub final_transaction_timeout_secs: Option<u64>,
}

impl Default for TtxConfig {
    fn default() -> Self {
        Self {
            network: "default".into(),
            channel: "testchannel".into(),
            namespace: "ctoken".into(),
            signature_timeout_secs: 60,
            audit_timeout_secs: 60,
            distribution_timeout_secs: 240,
            recipient_timeout_secs: 60,
            exchange_timeout_secs: 30,
            final_transaction_timeout_secs: Some(240),
        }
    }
}

impl TtxConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn signature_timeout(&self) -> Duration {
        Duration::from_secs(self.signature_timeout_secs)
    }

    pub fn audit_timeout(&self) -> Duration {
        Duration::from_secs(self.audit_timeout_secs)
    }

    pub fn distribution_timeout(&self) -> Duration {
        Duration::from_secs(self.distribution_timeout_secs)
    }

    pub fn recipient_timeout(&self) -> Duration {
        Duration::from_secs(self.recipient_timeout_secs)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs)
    }

    pub fn final_transaction_timeout(&self) -> Option<Duration> {
        self.final_transaction_timeout_secs.map(Duration::from_secs)
    }
}
