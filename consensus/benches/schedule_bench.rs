use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tessera_consensus::{Committee, EpochSchedule, LeaderSchedule, RoleResolver};
use tessera_types::{Epoch, Height, NodeId};
use tessera_vrf::Randomness;

fn committee(n: u8) -> Committee {
    Committee::new(Epoch::new(1), (0..n).map(|b| NodeId::new([b; 32])).collect()).unwrap()
}

fn randomness() -> Randomness {
    Randomness {
        epoch: Epoch::new(1),
        value: [0x5a; 32],
        proof: Vec::new(),
    }
}

fn derive_schedule_bench(c: &mut Criterion) {
    let committee = committee(100);
    let randomness = randomness();

    c.bench_function("leader_schedule_derive_100", |b| {
        b.iter(|| {
            LeaderSchedule::derive(black_box(&committee), &randomness, EpochSchedule::new(1000))
        })
    });
}

fn leader_lookup_bench(c: &mut Criterion) {
    let committee = committee(100);
    let schedule =
        LeaderSchedule::derive(&committee, &randomness(), EpochSchedule::new(1000)).unwrap();

    c.bench_function("leader_lookup", |b| {
        b.iter(|| schedule.leader(black_box(Height::new(1500))))
    });
}

fn partition_bench(c: &mut Criterion) {
    let committee = committee(100);
    let schedule =
        LeaderSchedule::derive(&committee, &randomness(), EpochSchedule::new(1000)).unwrap();
    let relays: Vec<NodeId> = (200..220).map(|b| NodeId::new([b; 32])).collect();

    c.bench_function("role_partition_100_members_20_relays", |b| {
        b.iter(|| {
            RoleResolver::partition(
                black_box(Height::new(1500)),
                Some(&committee),
                Some(&schedule),
                &relays,
            )
        })
    });
}

criterion_group!(
    benches,
    derive_schedule_bench,
    leader_lookup_bench,
    partition_bench
);
criterion_main!(benches);
