//! End-to-end confidential token scenarios
//!
//! Every test spawns a set of nodes on one in-process network and drives the
//! full protocols between them.
//!
//! ## Running
//!
//! ```bash
//! RUST_LOG=ctoken_ttx=debug cargo test -p integration-tests -- --nocapture
//! ```

use std::sync::Arc;

use anyhow::Result;
use ctoken_primitives::{AuditInfo, Identity, PublicParameters, TokenRequestMetadata};
use ctoken_ttx::{
    LedgerError, Served, Transaction, TtxError, collect_endorsements,
    exchange_recipient_identities,
    memory::MemoryWallets,
    network::EndpointResolver,
    request_recipient_identity,
    vault::{self, keys},
};
use ctoken_verifier::VerificationError;
use integration_tests::{
    helpers::{
        balance, issue, owned, publish_parameters, redeem, select_inputs, transfer,
        transfer_inputs,
    },
    network::{TestNetwork, TestNode},
    test_accounts,
};
use tracing::info;

const USD: &str = "USD";

fn wallets(seed: u64) -> Arc<MemoryWallets> {
    Arc::new(MemoryWallets::new(seed))
}

/// A network with one issuer node. `pp` builds the public parameters given
/// the issuer identity.
fn with_issuer(
    pp: impl FnOnce(Identity) -> PublicParameters,
) -> (TestNetwork, TestNode, Identity) {
    let issuer_wallets = wallets(test_accounts::ISSUER);
    let issuer = issuer_wallets.new_issuer();
    let net = TestNetwork::new(pp(issuer.clone()));
    let issuer_node = net.spawn_node("issuer", issuer_wallets);
    (net, issuer_node, issuer)
}

// ==============================================================================
// Lifecycle
// ==============================================================================

/// Issue {50, 20, 30} to Alice, transfer {65, 35} to Bob and Charlie, Bob
/// redeems 15. Every step is audited.
#[test_log::test(tokio::test)]
async fn lifecycle_with_auditor() -> Result<()> {
    let issuer_wallets = wallets(test_accounts::ISSUER);
    let issuer = issuer_wallets.new_issuer();
    let auditor_wallets = wallets(test_accounts::AUDITOR);
    let auditor = auditor_wallets.new_auditor();
    let pp = PublicParameters::setup(32, vec![issuer.clone()], Some(auditor))?;

    let net = TestNetwork::new(pp);
    let issuer_node = net.spawn_node("issuer", issuer_wallets);
    let auditor_node = net.spawn_node("auditor", auditor_wallets);
    let alice = net.spawn_node("alice", wallets(test_accounts::ALICE));
    let bob = net.spawn_node("bob", wallets(test_accounts::BOB));
    let charlie = net.spawn_node("charlie", wallets(test_accounts::CHARLIE));
    let ns = net.config.namespace.clone();

    info!("issuing to alice");
    let a = request_recipient_identity(&issuer_node.node, &alice.node.me).await?;
    let owners = [a.clone(), a.clone(), a];
    let issued = issue(&issuer_node, &issuer, USD, &[50, 20, 30], &owners).await?;
    assert_eq!(issued.request.signatures.len(), 1);
    assert_eq!(issued.request.auditor_signatures.len(), 1);
    assert_eq!(balance(&alice, USD)?, 100);
    assert_eq!(vault::issued_tokens(&*issuer_node.node.vault, &ns)?.len(), 3);
    assert_eq!(vault::audit_tokens(&*auditor_node.node.vault, &ns)?.len(), 3);
    assert!(issuer_node.node.vault.exists(&issued.id));
    assert!(auditor_node.node.vault.exists(&issued.id));
    // the auditor links alice's pseudonym to her enrollment
    let audited = auditor_node.node.vault.load_transient(&issued.id).expect("transient");
    let md = TokenRequestMetadata::from_bytes(&audited[vault::TRANSIENT_METADATA_KEY])?;
    let first = &md.issues[0].outputs[0];
    let info = AuditInfo::open(&first.audit_info, &first.owner)?;
    assert_eq!(info.enrollment_id, alice.wallets.enrollment_id());

    info!("alice transfers to bob and charlie");
    let b = request_recipient_identity(&alice.node, &bob.node.me).await?;
    let c = request_recipient_identity(&alice.node, &charlie.node.me).await?;
    let transferred = transfer(&alice, USD, &[65, 35], &[b, c]).await?;
    assert_eq!(transferred.request.signatures.len(), 3);
    assert_eq!(transferred.request.auditor_signatures.len(), 1);
    assert_eq!(balance(&alice, USD)?, 0);
    assert_eq!(balance(&bob, USD)?, 65);
    assert_eq!(balance(&charlie, USD)?, 35);
    assert_eq!(vault::audit_tokens(&*auditor_node.node.vault, &ns)?.len(), 5);
    // bob only learns his own opening
    let bob_view = bob.node.vault.load_transient(&transferred.id).expect("transient");
    let md = TokenRequestMetadata::from_bytes(&bob_view[vault::TRANSIENT_METADATA_KEY])?;
    let opened: Vec<bool> = md.transfers[0]
        .outputs
        .iter()
        .map(|o| o.opening.is_some())
        .collect();
    assert_eq!(opened, vec![true, false]);

    info!("bob redeems");
    let redeemed = redeem(&bob, USD, 15).await?;
    assert_eq!(balance(&bob, USD)?, 50);
    assert!(net.ledger.get_state(&keys::token_key(&redeemed.id, 0)?).is_none());
    assert!(net.ledger.get_state(&keys::token_key(&redeemed.id, 1)?).is_some());
    assert!(auditor_node.node.vault.exists(&redeemed.id));
    Ok(())
}

/// Only issuers named in the public parameters may issue. The rogue node
/// proves under parameters of its own that admit anyone; the ledger still
/// holds the restricted set.
#[test_log::test(tokio::test)]
async fn unknown_issuer_is_rejected_by_the_ledger() -> Result<()> {
    let (net, _issuer_node, _) = with_issuer(|issuer| {
        PublicParameters::setup(32, vec![issuer], None).expect("pp")
    });
    let rogue_wallets = wallets(test_accounts::CHARLIE);
    let rogue = rogue_wallets.new_issuer();
    let owner = rogue_wallets.new_pseudonym();
    let rogue_node = net.spawn_node("rogue", rogue_wallets);

    let open = PublicParameters::setup(32, vec![], None)?;
    let mut tx = {
        let mut rng = rand::rng();
        let creator = rogue_node.node.me.clone();
        let mut tx = Transaction::new(&rogue_node.node.config, creator, None, &mut rng);
        tx.issue(&open, &rogue, USD, &[10], &[owner], &mut rng)?;
        tx
    };
    let err = collect_endorsements(&rogue_node.node, &mut tx)
        .await
        .expect_err("rogue issuer");
    assert!(matches!(
        err,
        TtxError::Ledger {
            source: LedgerError::Verification(VerificationError::UnknownIssuer),
            ..
        }
    ));
    assert!(tx.envelope.is_none());
    assert_eq!(balance(&rogue_node, USD)?, 0);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn redeeming_more_than_held_fails_before_any_signature() -> Result<()> {
    let (net, issuer_node, issuer) =
        with_issuer(|_| PublicParameters::setup(32, vec![], None).expect("pp"));
    let alice = net.spawn_node("alice", wallets(test_accounts::ALICE));
    let a = request_recipient_identity(&issuer_node.node, &alice.node.me).await?;
    issue(&issuer_node, &issuer, USD, &[30], &[a]).await?;

    let inputs = owned(&alice, Some(USD))?;
    let mut rng = rand::rng();
    let mut tx = Transaction::new(&alice.node.config, alice.node.me.clone(), None, &mut rng);
    let change = alice.wallets.new_pseudonym();
    let err = tx
        .redeem(&alice.node.pp, &inputs, 50, &change, &mut rng)
        .expect_err("unbalanced");
    assert!(matches!(err, TtxError::Prover(_)));
    assert!(tx.request.is_empty());
    assert_eq!(balance(&alice, USD)?, 30);
    Ok(())
}

// ==============================================================================
// Graph hiding
// ==============================================================================

/// Spent tokens stay on the ledger behind serial numbers; spending them again
/// is rejected.
#[test_log::test(tokio::test)]
async fn graph_hiding_rejects_double_spends() -> Result<()> {
    let (net, issuer_node, issuer) = with_issuer(|_| {
        PublicParameters::setup(64, vec![], None)
            .expect("pp")
            .with_graph_hiding(true)
    });
    let alice = net.spawn_node("alice", wallets(test_accounts::ALICE));
    let bob = net.spawn_node("bob", wallets(test_accounts::BOB));

    let setup_id = publish_parameters(&issuer_node).await?;
    assert_eq!(
        issuer_node
            .node
            .vault
            .get_state(&net.config.namespace, &keys::setup_key()?),
        Some(setup_id.into_bytes())
    );
    assert!(net.ledger.get_state(&keys::params_key()?).is_some());

    let a = request_recipient_identity(&issuer_node.node, &alice.node.me).await?;
    issue(&issuer_node, &issuer, USD, &[40], &[a]).await?;

    let inputs = select_inputs(&alice, USD, 30)?;
    let b = request_recipient_identity(&alice.node, &bob.node.me).await?;
    transfer_inputs(&alice, &inputs, &[30], &[b.clone()]).await?;
    assert_eq!(balance(&alice, USD)?, 10);
    assert_eq!(balance(&bob, USD)?, 30);
    let spent = &inputs[0].id;
    assert!(net.ledger.get_state(&keys::token_key(&spent.tx_id, spent.index)?).is_some());
    assert!(owned(&alice, None)?.iter().all(|t| t.id != *spent));

    let err = transfer_inputs(&alice, &inputs, &[30], &[b])
        .await
        .expect_err("double spend");
    assert!(matches!(err.downcast_ref::<TtxError>(), Some(TtxError::Ledger { .. })));
    assert_eq!(balance(&bob, USD)?, 30);
    Ok(())
}

// ==============================================================================
// Multi-party
// ==============================================================================

/// Bob spends his token together with two tokens held under two pseudonyms
/// on Alice's node; Alice's node signs both slots over one session.
#[test_log::test(tokio::test)]
async fn signers_on_several_nodes() -> Result<()> {
    let (net, issuer_node, issuer) =
        with_issuer(|_| PublicParameters::setup(32, vec![], None).expect("pp"));
    let alice = net.spawn_node("alice", wallets(test_accounts::ALICE));
    let bob = net.spawn_node("bob", wallets(test_accounts::BOB));
    let charlie = net.spawn_node("charlie", wallets(test_accounts::CHARLIE));

    let a1 = request_recipient_identity(&issuer_node.node, &alice.node.me).await?;
    let a2 = request_recipient_identity(&issuer_node.node, &alice.node.me).await?;
    let b = request_recipient_identity(&issuer_node.node, &bob.node.me).await?;
    issue(&issuer_node, &issuer, USD, &[30, 10, 25], &[a1, a2, b]).await?;

    // alice shares her openings with bob out of band
    let mut inputs = owned(&alice, Some(USD))?;
    inputs.extend(owned(&bob, Some(USD))?);
    let c = request_recipient_identity(&bob.node, &charlie.node.me).await?;
    let tx = transfer_inputs(&bob, &inputs, &[65], &[c]).await?;

    assert_eq!(tx.request.signers().len(), 3);
    assert_eq!(tx.request.signatures.len(), 3);
    assert_eq!(balance(&alice, USD)?, 0);
    assert_eq!(balance(&bob, USD)?, 0);
    assert_eq!(balance(&charlie, USD)?, 65);
    assert!(alice.node.vault.exists(&tx.id));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn concurrent_transfers_to_one_recipient() -> Result<()> {
    let (net, issuer_node, issuer) =
        with_issuer(|_| PublicParameters::setup(32, vec![], None).expect("pp"));
    let alice = net.spawn_node("alice", wallets(test_accounts::ALICE));
    let bob = net.spawn_node("bob", wallets(test_accounts::BOB));
    let charlie = net.spawn_node("charlie", wallets(test_accounts::CHARLIE));

    let a = request_recipient_identity(&issuer_node.node, &alice.node.me).await?;
    let b = request_recipient_identity(&issuer_node.node, &bob.node.me).await?;
    issue(&issuer_node, &issuer, USD, &[100, 200], &[a, b]).await?;

    let c1 = request_recipient_identity(&alice.node, &charlie.node.me).await?;
    let c2 = request_recipient_identity(&bob.node, &charlie.node.me).await?;
    let (from_alice, from_bob) = futures::try_join!(
        transfer(&alice, USD, &[60], std::slice::from_ref(&c1)),
        transfer(&bob, USD, &[150], std::slice::from_ref(&c2)),
    )?;
    assert_ne!(from_alice.id, from_bob.id);
    assert_eq!(balance(&charlie, USD)?, 210);
    assert_eq!(balance(&alice, USD)?, 40);
    assert_eq!(balance(&bob, USD)?, 50);
    Ok(())
}

// ==============================================================================
// Identities
// ==============================================================================

#[test_log::test(tokio::test)]
async fn recipient_identity_exchange_binds_both_sides() -> Result<()> {
    let (net, issuer_node, issuer) =
        with_issuer(|_| PublicParameters::setup(32, vec![], None).expect("pp"));
    let alice = net.spawn_node("alice", wallets(test_accounts::ALICE));
    let mut bob = net.spawn_node("bob", wallets(test_accounts::BOB));

    let (mine, theirs) =
        exchange_recipient_identities(&alice.node, None, &bob.node.me).await?;
    assert_eq!(net.network.resolve(&mine)?, alice.node.me);
    assert_eq!(net.network.resolve(&theirs)?, bob.node.me);
    assert!(alice.wallets.recipient(&theirs).is_some());

    match bob.next_served().await {
        Some(Ok(Served::Exchanged(bob_mine, bob_theirs))) => {
            assert_eq!(bob_mine, theirs);
            assert_eq!(bob_theirs, mine);
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    // the exchanged identities are usable right away
    issue(&issuer_node, &issuer, USD, &[5], &[mine]).await?;
    transfer(&alice, USD, &[5], &[theirs]).await?;
    assert_eq!(balance(&bob, USD)?, 5);
    Ok(())
}
