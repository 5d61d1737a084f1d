// Benchmarks for local editing and remote replay.
//
// Three workloads:
// - seq_insert: forward typing (append at the end)
// - random_insert: inserts at random positions
// - remote_replay: one peer's edit batch applied at another peer

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use concord::Peer;
use concord::PeerId;

const SIZES: &[u64] = &[100, 1_000];

fn seq_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("seq_insert");
    for &size in SIZES {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut peer: Peer<u8> = Peer::new(PeerId([1; 32]));
                for i in 0..size {
                    peer.insert(i, b'x');
                }
                black_box(peer.list().len())
            });
        });
    }
    group.finish();
}

fn random_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_insert");
    for &size in SIZES {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut peer: Peer<u8> = Peer::new(PeerId([1; 32]));
                let mut rng = StdRng::seed_from_u64(42);
                for _ in 0..size {
                    let len = peer.list().len();
                    let pos = if len == 0 { 0 } else { rng.gen_range(0..=len) };
                    peer.insert(pos, b'x');
                }
                black_box(peer.list().len())
            });
        });
    }
    group.finish();
}

fn remote_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("remote_replay");
    for &size in SIZES {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut origin: Peer<u8> = Peer::new(PeerId([1; 32]));
            let mut rng = StdRng::seed_from_u64(42);
            for _ in 0..size {
                let len = origin.list().len();
                let pos = if len == 0 { 0 } else { rng.gen_range(0..=len) };
                origin.insert(pos, b'x');
            }
            let message = origin.make_message();

            b.iter(|| {
                let mut replica: Peer<u8> = Peer::new(PeerId([2; 32]));
                replica
                    .process_message(message.clone())
                    .expect("replay is causally ready");
                black_box(replica.list().len())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, seq_insert, random_insert, remote_replay);
criterion_main!(benches);
