//! ctoken-ttx
//!
//! Token transactions between nodes.
//! - [`Transaction`]: issue, transfer and redeem builders over the prover
//! - [`collect_endorsements`]: initiator protocol (signatures, audit, ledger,
//!   distribution)
//! - [`responder::serve`]: the peer side of every protocol
//! - [`vault`]: local ledger view and write-set reconciliation into owned,
//!   audited and issued token records
//! - [`memory`]: in-process ledger, vault, wallets and session hub
//!
//! Every protocol instance runs in its own `tracing` span carrying its
//! transaction id or peer. Waits on remote parties are bounded by the
//! timeouts of [`TtxConfig`].

mod auditing;
pub mod config;
pub mod endorse;
pub mod error;
pub mod memory;
pub mod network;
pub mod node;
pub mod recipients;
pub mod responder;
pub mod transaction;
pub mod vault;
pub mod wire;


pub use config::TtxConfig;
pub use endorse::collect_endorsements;
pub use error::{LedgerError, TransportError, TtxError, VaultError};
pub use node::Node;
pub use recipients::{exchange_recipient_identities, request_recipient_identity};
pub use responder::{Served, serve};
pub use transaction::{Transaction, compute_tx_id};
