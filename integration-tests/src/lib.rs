//! End-to-end tests for confidential token transactions
//!
//! This crate wires several token nodes together in one process and runs the
//! full transaction protocols between them: recipient identity requests,
//! signature collection, auditing, ledger submission, distribution and vault
//! reconciliation.
//!
//! ## Overview
//!
//! Every node gets its own wallets, vault and transport over a shared
//! [`MemoryNetwork`](ctoken_ttx::memory::MemoryNetwork). All nodes submit to
//! one [`MemoryLedger`](ctoken_ttx::memory::MemoryLedger), which validates
//! every request (proofs, signatures, auditor signature, inputs) the way a
//! token chaincode would. Each node runs an accept loop that serves incoming
//! sessions, so any node can initiate while the others respond.
//!
//! ## Test Categories
//!
//! 1. **Lifecycle**: issue, transfer and redeem with an auditor
//! 2. **Graph hiding**: serial numbers instead of deletions, double spends
//! 3. **Multi-party**: signers spread over several nodes
//! 4. **Identities**: recipient identity requests and exchanges
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p integration-tests
//!
//! # Run with logging
//! RUST_LOG=ctoken_ttx=debug cargo test -p integration-tests -- --nocapture
//!
//! # Run specific test
//! cargo test -p integration-tests lifecycle
//! ```

pub mod helpers;
pub mod network;

use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber honouring `RUST_LOG`. Safe to call from
/// every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_test_writer()
        .try_init();
}

/// Wallet seeds of the nodes used across the scenarios, so key material is
/// reproducible between runs.
pub mod test_accounts {
    pub const ISSUER: u64 = 1;
    pub const AUDITOR: u64 = 2;
    pub const ALICE: u64 = 10;
    pub const BOB: u64 = 11;
    pub const CHARLIE: u64 = 12;
}
