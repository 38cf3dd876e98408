//! Unit tests for public verification and auditing.
//! Covered:
//!   1) Happy path: issue and transfer verify, repeatedly, with identical results
//!   2) Rejection: tampered commitments, swapped range proofs, policy and issuer gates
//!   3) Request validation: signature count, slot binding, auditor signature
//!   4) Auditor: proofs re-verified, openings against commitments, owner audit info,
//!      offending token ids, conservation

use std::sync::Arc;

use crate::*;
use ctoken_primitives::{
    AuditInfo, Ed25519Signer, Identity, IssueAction, IssueMetadata, OutputMetadata,
    PublicParameters, Signer, Token, TokenId, TokenOpening, TokenRequest, TokenRequestMetadata,
    TransferAction, TransferMetadata, TransferProof,
};
use ctoken_prover::{Issuer, OutputSpec, Sender, sign_action};
use curve25519_dalek::scalar::Scalar;
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn pp() -> PublicParameters {
    PublicParameters::setup(32, vec![], None).expect("pp")
}

/// Deterministic Ed25519 holder named `name`.
fn holder(name: &str) -> Ed25519Signer {
    let mut seed = [0u8; 32];
    seed[..name.len()].copy_from_slice(name.as_bytes());
    Ed25519Signer::from_seed(&seed)
}

fn id(name: &str) -> Identity {
    holder(name).identity()
}

fn audit_info(name: &str) -> Vec<u8> {
    AuditInfo::sign(&holder(name), name)
        .expect("audit info")
        .to_bytes()
        .expect("encode")
}

/// Attach the owners' audit info, as the initiator does before an audit.
fn disclose(outputs: &mut [OutputMetadata]) {
    for out in outputs {
        let name = ["alice", "bob", "carol"]
            .into_iter()
            .find(|n| id(n) == out.owner)
            .expect("known owner");
        out.audit_info = audit_info(name);
    }
}

fn issue(
    pp: &PublicParameters,
    token_type: &str,
    values: &[u64],
    owner: &Identity,
    rng: &mut ChaCha20Rng,
) -> (IssueAction, IssueMetadata) {
    let owners = vec![owner.clone(); values.len()];
    Issuer::new(pp, id("issuer"))
        .generate_issue(token_type, values, &owners, rng)
        .expect("issue")
}

/// Transfer {50, 20, 30} -> {65, 35}, spending outputs of issue tx "tx0".
fn scenario(
    pp: &PublicParameters,
    rng: &mut ChaCha20Rng,
) -> (IssueAction, IssueMetadata, TransferAction, TransferMetadata) {
    let alice = id("alice");
    let (issued, issue_md) = issue(pp, "USD", &[50, 20, 30], &alice, rng);
    let ids = (0..3).map(|i| TokenId::new("tx0", i)).collect();
    let openings = issue_md
        .outputs
        .iter()
        .map(|o| o.opening.clone().expect("opening"))
        .collect();
    let sender = Sender::new(pp, ids, issued.outputs.clone(), openings).expect("sender");
    let (transfer, transfer_md) = sender
        .generate_transfer(&[65, 35], &[id("bob"), id("carol")], rng)
        .expect("transfer");
    (issued, issue_md, transfer, transfer_md)
}

#[test]
fn issue_verifies() {
    let pp = pp();
    let mut rng = ChaCha20Rng::from_seed([1u8; 32]);
    let (action, _) = issue(&pp, "USD", &[1, 2, 3], &id("alice"), &mut rng);
    verify_issue(&action, &pp).expect("issue verifies");
    verify_action(&action.into(), &pp).expect("as action");
}

#[test]
fn transfer_verifies_and_is_idempotent() {
    let pp = pp();
    let mut rng = ChaCha20Rng::from_seed([2u8; 32]);
    let (_, _, transfer, _) = scenario(&pp, &mut rng);
    let snapshot = transfer.clone();

    let first = verify_transfer(&transfer, &pp);
    let second = verify_transfer(&transfer, &pp);
    assert_eq!(first, Ok(()));
    assert_eq!(first, second);
    assert_eq!(transfer, snapshot);
}

#[test]
fn tampered_output_commitment_is_rejected() {
    let pp = pp();
    let mut rng = ChaCha20Rng::from_seed([3u8; 32]);
    let (_, _, mut transfer, md) = scenario(&pp, &mut rng);

    // inflate output 0 by one unit of value
    let opening = md.outputs[0].opening.clone().expect("opening");
    let inflated = TokenOpening {
        value: opening.value + 1,
        ..opening
    };
    transfer.outputs[0].commitment = inflated.commitment(&pp);
    assert!(verify_transfer(&transfer, &pp).is_err());
}

#[test]
fn swapped_range_proof_is_rejected() {
    let pp = pp();
    let mut rng = ChaCha20Rng::from_seed([4u8; 32]);
    let (_, _, mut transfer, _) = scenario(&pp, &mut rng);
    transfer.proof.range_proofs.swap(0, 1);
    assert_eq!(
        verify_transfer(&transfer, &pp),
        Err(VerificationError::Range { output: 0 })
    );

    let (_, _, mut transfer, _) = scenario(&pp, &mut rng);
    transfer.proof.range_proofs[1].truncate(10);
    assert_eq!(
        verify_transfer(&transfer, &pp),
        Err(VerificationError::Range { output: 1 })
    );
}

#[test]
fn substituted_input_type_is_rejected() {
    let pp = pp();
    let mut rng = ChaCha20Rng::from_seed([5u8; 32]);
    let (_, _, mut transfer, md) = scenario(&pp, &mut rng);
    let usd = md.inputs[0].clone().expect("opening");
    let eur = TokenOpening {
        token_type: "EUR".into(),
        ..usd
    };
    transfer.input_tokens[0].commitment = eur.commitment(&pp);
    assert!(verify_transfer(&transfer, &pp).is_err());
}

#[test]
fn broken_group_layout_is_rejected() {
    let pp = pp();
    let mut rng = ChaCha20Rng::from_seed([6u8; 32]);
    let (_, _, transfer, _) = scenario(&pp, &mut rng);

    let mut missing = transfer.clone();
    missing.proof.groups[0].outputs.pop();
    assert!(matches!(
        verify_transfer(&missing, &pp),
        Err(VerificationError::GroupLayout(_))
    ));

    let mut duplicated = transfer;
    duplicated.proof.groups[0].inputs.push(0);
    assert!(matches!(
        verify_transfer(&duplicated, &pp),
        Err(VerificationError::GroupLayout(_))
    ));
}

#[test]
fn mixed_types_follow_policy() {
    let relaxed = pp().with_mixed_types(true);
    let strict = pp();
    let mut rng = ChaCha20Rng::from_seed([7u8; 32]);
    let alice = id("alice");
    let (usd, usd_md) = issue(&relaxed, "USD", &[10], &alice, &mut rng);
    let (eur, eur_md) = issue(&relaxed, "EUR", &[4], &alice, &mut rng);

    let tokens = vec![usd.outputs[0].clone(), eur.outputs[0].clone()];
    let openings = vec![
        usd_md.outputs[0].opening.clone().expect("opening"),
        eur_md.outputs[0].opening.clone().expect("opening"),
    ];
    let ids = vec![TokenId::new("usd", 0), TokenId::new("eur", 0)];
    let sender = Sender::new(&relaxed, ids, tokens, openings).expect("sender");
    let specs = [("USD", 7), ("EUR", 4), ("USD", 3)].map(|(ty, value)| OutputSpec {
        token_type: ty.into(),
        value,
        owner: id("bob"),
    });
    let (action, _) = sender
        .generate_typed_transfer(&specs, &mut rng)
        .expect("mixed transfer");

    verify_transfer(&action, &relaxed).expect("allowed by policy");
    assert_eq!(
        verify_transfer(&action, &strict),
        Err(VerificationError::MixedTypes)
    );
}

#[test]
fn issuer_outside_the_set_is_rejected() {
    let open = pp();
    let gated = PublicParameters::setup(32, vec![id("mint")], None).expect("pp");
    let mut rng = ChaCha20Rng::from_seed([8u8; 32]);
    let (action, _) = issue(&open, "USD", &[5], &id("alice"), &mut rng);
    assert_eq!(
        verify_issue(&action, &gated),
        Err(VerificationError::UnknownIssuer)
    );
}

#[test]
fn proofs_are_bound_to_public_parameters() {
    let pp32 = pp();
    let pp64 = PublicParameters::setup(64, vec![], None).expect("pp");
    let mut rng = ChaCha20Rng::from_seed([9u8; 32]);
    let (action, _) = issue(&pp32, "USD", &[5], &id("alice"), &mut rng);
    assert!(verify_issue(&action, &pp64).is_err());
}

fn signed_request(
    pp: &PublicParameters,
    owner: Arc<dyn Signer>,
    tx_id: &str,
    rng: &mut ChaCha20Rng,
) -> TokenRequest {
    let (action, _) = Issuer::new(pp, owner.identity())
        .generate_issue("USD", &[5, 6], &[id("a"), id("b")], rng)
        .expect("issue");
    let mut request = TokenRequest {
        issues: vec![action],
        ..Default::default()
    };
    let raw = request.marshal_to_sign().expect("marshal");
    for sig in sign_action(&raw, &[owner], tx_id).expect("sign") {
        request.append_signature(sig);
    }
    request
}

#[test]
fn request_needs_one_valid_signature_per_signer() {
    let pp = pp();
    let mut rng = ChaCha20Rng::from_seed([10u8; 32]);
    let issuer: Arc<dyn Signer> = Arc::new(Ed25519Signer::generate(&mut rng));
    let request = signed_request(&pp, issuer, "tx-1", &mut rng);
    verify_request(&request, &pp, "tx-1").expect("valid request");

    // signatures bind the transaction id
    assert_eq!(
        verify_request(&request, &pp, "tx-2"),
        Err(VerificationError::Signature { slot: 0 })
    );

    let mut unsigned = request.clone();
    unsigned.signatures.clear();
    assert_eq!(
        verify_request(&unsigned, &pp, "tx-1"),
        Err(VerificationError::MissingSignatures { expected: 1, got: 0 })
    );
}

#[test]
fn request_needs_auditor_signature_when_audited() {
    let mut rng = ChaCha20Rng::from_seed([11u8; 32]);
    let auditor = Ed25519Signer::generate(&mut rng);
    let pp = PublicParameters::setup(32, vec![], Some(auditor.identity())).expect("pp");
    let issuer: Arc<dyn Signer> = Arc::new(Ed25519Signer::generate(&mut rng));
    let mut request = signed_request(&pp, issuer, "tx-1", &mut rng);

    assert_eq!(
        verify_request(&request, &pp, "tx-1"),
        Err(VerificationError::AuditorSignature)
    );

    let raw = request.marshal_to_sign().expect("marshal");
    let sig = sign_action(&raw, &[Arc::new(auditor) as Arc<dyn Signer>], "tx-1")
        .expect("sign")
        .remove(0);
    request.append_auditor_signature(sig);
    verify_request(&request, &pp, "tx-1").expect("audited request");
}

fn audit_fixture(
    pp: &PublicParameters,
    rng: &mut ChaCha20Rng,
) -> (TokenRequest, TokenRequestMetadata, Vec<Vec<Token>>) {
    let (issued, mut issue_md, transfer, mut transfer_md) = scenario(pp, rng);
    disclose(&mut issue_md.outputs);
    disclose(&mut transfer_md.outputs);
    let ledger_inputs = vec![issued.outputs.clone()];
    let request = TokenRequest {
        issues: vec![issued],
        transfers: vec![transfer],
        ..Default::default()
    };
    let metadata = TokenRequestMetadata {
        issues: vec![issue_md],
        transfers: vec![transfer_md],
    };
    (request, metadata, ledger_inputs)
}

#[test]
fn auditor_accepts_consistent_request() {
    let pp = pp();
    let mut rng = ChaCha20Rng::from_seed([12u8; 32]);
    let (request, metadata, inputs) = audit_fixture(&pp, &mut rng);
    Auditor::new(&pp)
        .check(&request, &metadata, &inputs, "tx1")
        .expect("audit");
}

#[test]
fn auditor_cites_mismatching_output() {
    let pp = pp();
    let mut rng = ChaCha20Rng::from_seed([13u8; 32]);
    let (request, mut metadata, inputs) = audit_fixture(&pp, &mut rng);

    // transfer output 1 sits at ledger index 3 + 1
    if let Some(o) = metadata.transfers[0].outputs[1].opening.as_mut() {
        o.value += 1;
    }
    assert_eq!(
        Auditor::new(&pp).check(&request, &metadata, &inputs, "tx1"),
        Err(AuditError::OutputMismatch {
            token_id: TokenId::new("tx1", 4)
        })
    );
}

#[test]
fn auditor_cites_mismatching_input() {
    let pp = pp();
    let mut rng = ChaCha20Rng::from_seed([14u8; 32]);
    let (request, metadata, mut inputs) = audit_fixture(&pp, &mut rng);
    inputs[0][2].commitment = inputs[0][0].commitment;
    assert_eq!(
        Auditor::new(&pp).check(&request, &metadata, &inputs, "tx1"),
        Err(AuditError::InputMismatch {
            token_id: TokenId::new("tx0", 2)
        })
    );
}

#[test]
fn auditor_reverifies_proofs() {
    let pp = pp();
    let mut rng = ChaCha20Rng::from_seed([15u8; 32]);
    let (mut request, metadata, inputs) = audit_fixture(&pp, &mut rng);
    request.transfers[0].proof.range_proofs.swap(0, 1);
    assert_eq!(
        Auditor::new(&pp).check(&request, &metadata, &inputs, "tx1"),
        Err(AuditError::Verification(VerificationError::Range { output: 0 }))
    );
}

#[test]
fn auditor_requires_owner_audit_info() {
    let pp = pp();
    let mut rng = ChaCha20Rng::from_seed([16u8; 32]);
    let (request, metadata, inputs) = audit_fixture(&pp, &mut rng);
    let missing_at = TokenId::new("tx1", 3);

    let mut missing = metadata.clone();
    missing.transfers[0].outputs[0].audit_info.clear();
    assert_eq!(
        Auditor::new(&pp).check(&request, &missing, &inputs, "tx1"),
        Err(AuditError::AuditInfo {
            token_id: missing_at.clone()
        })
    );

    // carol's disclosure does not cover bob's output
    let mut borrowed = metadata;
    borrowed.transfers[0].outputs[0].audit_info = audit_info("carol");
    assert_eq!(
        Auditor::new(&pp).check(&request, &borrowed, &inputs, "tx1"),
        Err(AuditError::AuditInfo {
            token_id: missing_at
        })
    );
}

#[test]
fn auditor_rejects_unbalanced_openings() {
    let pp = pp();
    let opening = |value: u64, r: u64| TokenOpening {
        token_type: "USD".into(),
        value,
        blinding_factor: Scalar::from(r),
    };
    let token = |o: &TokenOpening, owner: &str| Token {
        owner: id(owner),
        commitment: o.commitment(&pp),
    };
    let (input, output) = (opening(10, 1), opening(11, 2));
    let request = TokenRequest {
        transfers: vec![TransferAction {
            inputs: vec![TokenId::new("tx0", 0)],
            input_tokens: vec![token(&input, "alice")],
            outputs: vec![token(&output, "bob")],
            proof: TransferProof {
                groups: vec![],
                input_proofs: vec![],
                range_proofs: vec![],
            },
        }],
        ..Default::default()
    };
    let metadata = TokenRequestMetadata {
        issues: vec![],
        transfers: vec![TransferMetadata {
            token_ids: vec![TokenId::new("tx0", 0)],
            senders: vec![id("alice")],
            inputs: vec![Some(input.clone())],
            outputs: vec![OutputMetadata {
                owner: id("bob"),
                opening: Some(output),
                audit_info: audit_info("bob"),
            }],
        }],
    };
    let inputs = vec![vec![token(&input, "alice")]];
    assert!(matches!(
        Auditor::new(&pp).check_openings(&request, &metadata, &inputs, "tx1"),
        Err(AuditError::Unbalanced {
            transfer: 0,
            inputs: 10,
            outputs: 11,
            ..
        })
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(6))]

    #[test]
    fn balanced_splits_verify(values in proptest::collection::vec(1u64..10_000, 1..4), cut in 0u64..10_000) {
        let pp = pp();
        let mut rng = ChaCha20Rng::from_seed([31u8; 32]);
        let total: u64 = values.iter().sum();
        let cut = cut % (total + 1);
        let (issued, md) = issue(&pp, "USD", &values, &id("alice"), &mut rng);
        let ids = (0..values.len() as u64).map(|i| TokenId::new("tx0", i)).collect();
        let openings = md.outputs.into_iter().map(|o| o.opening.expect("opening")).collect();
        let sender = Sender::new(&pp, ids, issued.outputs, openings).expect("sender");
        let (action, _) = sender
            .generate_transfer(&[cut, total - cut], &[id("b"), id("c")], &mut rng)
            .expect("transfer");
        prop_assert_eq!(verify_transfer(&action, &pp), Ok(()));
    }
}
