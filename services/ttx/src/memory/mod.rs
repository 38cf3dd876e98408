//! In-process collaborators: a session hub with its endpoint directory, a
//! vault, Ed25519 wallets and a ledger that validates and applies token
//! requests. Enough to run every protocol between several nodes of one
//! process.

mod ledger;
mod network;
mod vault;
mod wallets;

pub use ledger::MemoryLedger;
pub use network::{IncomingSessions, MemoryNetwork, MemorySession, MemoryTransport};
pub use vault::MemoryVault;
pub use wallets::{MemoryWallets, Role};
