use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ctoken_primitives::{Identity, IssueAction, PublicParameters, TokenId, TransferAction};
use ctoken_prover::{Issuer, Sender};
use ctoken_verifier::{verify_issue, verify_transfer};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::hint::black_box;

fn fixture(pp: &PublicParameters) -> (IssueAction, TransferAction) {
    let mut rng = ChaCha20Rng::from_seed([42u8; 32]);
    let alice = Identity::new(b"alice".to_vec());
    let (issued, md) = Issuer::new(pp, Identity::new(b"mint".to_vec()))
        .generate_issue("USD", &[50, 20, 30], &[alice.clone(), alice.clone(), alice], &mut rng)
        .expect("issue");
    let ids = (0..3).map(|i| TokenId::new("tx0", i)).collect();
    let openings = md
        .outputs
        .into_iter()
        .map(|o| o.opening.expect("opening"))
        .collect();
    let (transfer, _) = Sender::new(pp, ids, issued.outputs.clone(), openings)
        .expect("sender")
        .generate_transfer(
            &[65, 35],
            &[Identity::new(b"bob".to_vec()), Identity::new(b"carol".to_vec())],
            &mut rng,
        )
        .expect("transfer");
    (issued, transfer)
}

fn bench_issue_verify(c: &mut Criterion) {
    let pp = PublicParameters::setup(64, vec![], None).expect("pp");
    let (issue, _) = fixture(&pp);

    let mut g = c.benchmark_group("verify_issue");
    g.throughput(Throughput::Elements(1));
    g.bench_function(BenchmarkId::from_parameter("3_outputs"), |b| {
        b.iter(|| black_box(verify_issue(&issue, &pp)).expect("issue verify"));
    });
    g.finish();
}

fn bench_transfer_verify(c: &mut Criterion) {
    let mut g = c.benchmark_group("verify_transfer");
    g.throughput(Throughput::Elements(1));

    for bits in [32usize, 64] {
        let pp = PublicParameters::setup(bits, vec![], None).expect("pp");
        let (_, transfer) = fixture(&pp);
        g.bench_function(BenchmarkId::new("3_in_2_out", bits), |b| {
            b.iter(|| black_box(verify_transfer(&transfer, &pp)).expect("transfer verify"));
        });
    }

    g.finish();
}

criterion_group!(benches, bench_issue_verify, bench_transfer_verify);
criterion_main!(benches);
