//! Unit tests for action construction and signing.
//! Covered:
//!   1) Issue and transfer shapes; metadata openings explain every output
//!   2) Precondition failures: unbalanced, mixed types, out of range, bad openings
//!   3) sign_action: ordered signatures, all-or-nothing on signer failure

use std::sync::Arc;

use crate::*;
use ctoken_primitives::{
    Ed25519Signer, Ed25519Verifier, Identity, PublicParameters, Signer, SigningError, Token,
    TokenId, TokenOpening, Verifier, signing_message,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn pp() -> PublicParameters {
    PublicParameters::setup(32, vec![], None).expect("pp")
}

fn id(name: &str) -> Identity {
    Identity::new(name.as_bytes().to_vec())
}

/// Issue `values` of `token_type` to `owner` and return them as spendable inputs.
fn issued_inputs(
    pp: &PublicParameters,
    token_type: &str,
    values: &[u64],
    owner: &Identity,
    rng: &mut ChaCha20Rng,
) -> (Vec<TokenId>, Vec<Token>, Vec<TokenOpening>) {
    let owners = vec![owner.clone(); values.len()];
    let (action, md) = Issuer::new(pp, id("issuer"))
        .generate_issue(token_type, values, &owners, rng)
        .expect("issue");
    let ids = (0..values.len() as u64)
        .map(|i| TokenId::new("issue-tx", i))
        .collect();
    let openings = md
        .outputs
        .into_iter()
        .map(|o| o.opening.expect("issuer metadata carries openings"))
        .collect();
    (ids, action.outputs, openings)
}

struct FailingSigner(Identity);

impl Signer for FailingSigner {
    fn identity(&self) -> Identity {
        self.0.clone()
    }

    fn sign(&self, _message: &[u8]) -> Result<Vec<u8>, SigningError> {
        Err(SigningError::Signer {
            identity: self.0.clone(),
            reason: "banana republic".to_string(),
        })
    }
}

#[test]
fn issue_shapes() {
    let pp = pp();
    let mut rng = ChaCha20Rng::from_seed([1u8; 32]);
    let owners = vec![id("alice"), id("bob")];
    let (action, md) = Issuer::new(&pp, id("issuer"))
        .generate_issue("USD", &[10, 20], &owners, &mut rng)
        .expect("issue");

    assert_eq!(action.outputs.len(), 2);
    assert_eq!(action.proof.range_proofs.len(), 2);
    assert!(action.proof.range_proofs.iter().all(|p| !p.is_empty()));
    assert_eq!(md.issuer, id("issuer"));
    for (token, out) in action.outputs.iter().zip(&md.outputs) {
        assert_eq!(token.owner, out.owner);
        assert!(out.opening.as_ref().expect("opening").opens(&pp, token));
    }
}

#[test]
fn issue_rejects_unknown_issuer_and_empty_outputs() {
    let gated = PublicParameters::setup(32, vec![id("mint")], None).expect("pp");
    let mut rng = ChaCha20Rng::from_seed([2u8; 32]);
    assert!(matches!(
        Issuer::new(&gated, id("rogue")).generate_issue("USD", &[1], &[id("a")], &mut rng),
        Err(ProverError::InvalidInput(_))
    ));
    assert!(matches!(
        Issuer::new(&gated, id("mint")).generate_issue("USD", &[], &[], &mut rng),
        Err(ProverError::InvalidInput(_))
    ));
}

#[test]
fn transfer_three_inputs_to_two_outputs() {
    let pp = pp();
    let mut rng = ChaCha20Rng::from_seed([7u8; 32]);
    let alice = id("alice");
    let (ids, tokens, openings) = issued_inputs(&pp, "USD", &[50, 20, 30], &alice, &mut rng);

    let sender = Sender::new(&pp, ids.clone(), tokens.clone(), openings).expect("sender");
    let (action, md) = sender
        .generate_transfer(&[65, 35], &[id("bob"), id("carol")], &mut rng)
        .expect("transfer");

    assert_eq!(action.inputs, ids);
    assert_eq!(action.input_tokens, tokens);
    assert_eq!(action.outputs.len(), 2);
    assert_eq!(action.proof.groups.len(), 1);
    assert_eq!(action.proof.groups[0].inputs, vec![0, 1, 2]);
    assert_eq!(action.proof.groups[0].outputs, vec![0, 1]);
    assert_eq!(action.proof.input_proofs.len(), 3);
    assert_eq!(action.proof.range_proofs.len(), 2);

    assert_eq!(md.senders, vec![alice.clone(), alice.clone(), alice]);
    let total: u64 = md
        .outputs
        .iter()
        .zip(&action.outputs)
        .map(|(o, token)| {
            let opening = o.opening.as_ref().expect("opening");
            assert!(opening.opens(&pp, token));
            opening.value
        })
        .sum();
    assert_eq!(total, 100);
}

#[test]
fn transfer_rejects_unbalanced_outputs() {
    let pp = pp();
    let mut rng = ChaCha20Rng::from_seed([8u8; 32]);
    let (ids, tokens, openings) = issued_inputs(&pp, "USD", &[50, 50], &id("alice"), &mut rng);
    let sender = Sender::new(&pp, ids, tokens, openings).expect("sender");

    match sender.generate_transfer(&[60, 41], &[id("b"), id("c")], &mut rng) {
        Err(ProverError::Unbalanced {
            inputs, outputs, ..
        }) => {
            assert_eq!(inputs, 100);
            assert_eq!(outputs, 101);
        }
        other => panic!("expected Unbalanced, got {other:?}"),
    }
}

#[test]
fn transfer_rejects_out_of_range_output() {
    let pp = PublicParameters::setup(8, vec![], None).expect("pp");
    let mut rng = ChaCha20Rng::from_seed([9u8; 32]);
    let (ids, tokens, openings) = issued_inputs(&pp, "USD", &[200, 200], &id("alice"), &mut rng);
    let sender = Sender::new(&pp, ids, tokens, openings).expect("sender");

    assert!(matches!(
        sender.generate_transfer(&[400], &[id("b")], &mut rng),
        Err(ProverError::OutOfRange { value: 400, max: 255 })
    ));
}

#[test]
fn sender_rejects_mismatching_opening() {
    let pp = pp();
    let mut rng = ChaCha20Rng::from_seed([10u8; 32]);
    let (ids, tokens, mut openings) = issued_inputs(&pp, "USD", &[5, 6], &id("alice"), &mut rng);
    openings[1].value = 7;
    assert!(matches!(
        Sender::new(&pp, ids, tokens, openings),
        Err(ProverError::OpeningMismatch { index: 1 })
    ));
}

#[test]
fn mixed_types_follow_policy() {
    let strict = pp();
    let mut rng = ChaCha20Rng::from_seed([11u8; 32]);
    let alice = id("alice");
    let (mut ids, mut tokens, mut openings) = issued_inputs(&strict, "USD", &[10], &alice, &mut rng);
    let (_, tokens2, openings2) = issued_inputs(&strict, "EUR", &[5], &alice, &mut rng);
    ids.push(TokenId::new("issue-tx-2", 0));
    tokens.extend(tokens2);
    openings.extend(openings2);

    let specs = vec![
        OutputSpec {
            token_type: "USD".into(),
            value: 10,
            owner: id("bob"),
        },
        OutputSpec {
            token_type: "EUR".into(),
            value: 5,
            owner: id("bob"),
        },
    ];

    let sender = Sender::new(&strict, ids.clone(), tokens.clone(), openings.clone())
        .expect("sender");
    assert!(matches!(
        sender.generate_transfer(&[15], &[id("bob")], &mut rng),
        Err(ProverError::MixedTypes)
    ));
    assert!(matches!(
        sender.generate_typed_transfer(&specs, &mut rng),
        Err(ProverError::MixedTypes)
    ));

    // the digest changes with the policy, but commitments do not
    let relaxed = strict.clone().with_mixed_types(true);
    let sender = Sender::new(&relaxed, ids, tokens, openings).expect("sender");
    let (action, _) = sender
        .generate_typed_transfer(&specs, &mut rng)
        .expect("mixed transfer");
    assert_eq!(action.proof.groups.len(), 2);
}

#[test]
fn output_type_without_inputs_is_unbalanced() {
    let pp = pp().with_mixed_types(true);
    let mut rng = ChaCha20Rng::from_seed([12u8; 32]);
    let (ids, tokens, openings) = issued_inputs(&pp, "USD", &[10], &id("alice"), &mut rng);
    let sender = Sender::new(&pp, ids, tokens, openings).expect("sender");
    let specs = vec![OutputSpec {
        token_type: "GBP".into(),
        value: 10,
        owner: id("bob"),
    }];
    assert!(matches!(
        sender.generate_typed_transfer(&specs, &mut rng),
        Err(ProverError::Unbalanced { inputs: 0, .. })
    ));
}

#[test]
fn sign_action_signs_every_slot_in_order() {
    let mut rng = ChaCha20Rng::from_seed([13u8; 32]);
    let keys: Vec<Ed25519Signer> = (0..3).map(|_| Ed25519Signer::generate(&mut rng)).collect();
    let verifiers: Vec<Ed25519Verifier> = keys.iter().map(|k| k.verifier()).collect();
    let signers: Vec<Arc<dyn Signer>> = keys
        .into_iter()
        .map(|k| Arc::new(k) as Arc<dyn Signer>)
        .collect();

    let sigs = sign_action(b"raw action", &signers, "tx-1").expect("sign");
    assert_eq!(sigs.len(), 3);
    let msg = signing_message(b"raw action", "tx-1");
    for (v, sig) in verifiers.iter().zip(&sigs) {
        v.verify(&msg, sig).expect("signature verifies");
    }
    // bound to the transaction id
    assert!(verifiers[0].verify(&signing_message(b"raw action", "tx-2"), &sigs[0]).is_err());
}

#[test]
fn sign_action_is_all_or_nothing() {
    let mut rng = ChaCha20Rng::from_seed([14u8; 32]);
    let signers: Vec<Arc<dyn Signer>> = vec![
        Arc::new(Ed25519Signer::generate(&mut rng)),
        Arc::new(Ed25519Signer::generate(&mut rng)),
        Arc::new(FailingSigner(id("third"))),
    ];
    match sign_action(b"raw action", &signers, "tx-1") {
        Err(SigningError::Signer { identity, reason }) => {
            assert_eq!(identity, id("third"));
            assert_eq!(reason, "banana republic");
        }
        other => panic!("expected signer failure, got {other:?}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn any_exact_split_is_accepted(total in 1u64..1_000_000, cut in 0u64..1_000_000) {
        let cut = cut % (total + 1);
        let pp = pp();
        let mut rng = ChaCha20Rng::from_seed([21u8; 32]);
        let (ids, tokens, openings) = issued_inputs(&pp, "USD", &[total], &id("alice"), &mut rng);
        let sender = Sender::new(&pp, ids, tokens, openings).expect("sender");
        let (action, md) = sender
            .generate_transfer(&[cut, total - cut], &[id("b"), id("c")], &mut rng)
            .expect("transfer");
        prop_assert_eq!(action.outputs.len(), 2);
        let sum: u64 = md.outputs.iter().filter_map(|o| o.opening.as_ref()).map(|o| o.value).sum();
        prop_assert_eq!(sum, total);
    }
}
