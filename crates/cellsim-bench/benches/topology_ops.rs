//! Criterion benchmarks for topology maintenance: insertion, removal,
//! merges and splits.

use cellsim_bench::{populate, quiet_manager, random_topology};
use cellsim_test_utils::fixtures::plain;
use cellsim_test_utils::{node, GraphWorld};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::hint::black_box;

const NODES: i32 = 500;

/// Place 500 cells over a random topology, from an empty manager.
fn bench_populate_random(c: &mut Criterion) {
    c.bench_function("populate_random_500", |b| {
        b.iter_batched(
            || (quiet_manager().unwrap(), random_topology(NODES, 700, 42)),
            |(mut m, world)| {
                let ids = populate(&mut m, &world, NODES);
                black_box((ids.len(), m.graph_count()));
                m
            },
            BatchSize::LargeInput,
        );
    });
}

/// Remove and re-insert cells of a populated random world.
fn bench_churn_random(c: &mut Criterion) {
    let mut m = quiet_manager().unwrap();
    let world = random_topology(NODES, 700, 7);
    let mut ids = populate(&mut m, &world, NODES);

    c.bench_function("churn_random_500", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let slot = i % ids.len();
            world.remove(&mut m, ids[slot]);
            ids[slot] = world.insert(&mut m, plain(node(slot as i32)));
            i += 1;
            black_box(m.graph_count());
        });
    });
}

/// Split a long chain in the middle and merge it back.
fn bench_split_merge_chain(c: &mut Criterion) {
    let mut m = quiet_manager().unwrap();
    let world = GraphWorld::new();
    for i in 0..NODES - 1 {
        world.link_nodes(i, i + 1);
    }
    let mut ids = populate(&mut m, &world, NODES);
    let middle = (NODES / 2) as usize;

    c.bench_function("split_merge_chain_500", |b| {
        b.iter(|| {
            world.remove(&mut m, ids[middle]);
            debug_assert_eq!(m.graph_count(), 2);
            ids[middle] = world.insert(&mut m, plain(node(middle as i32)));
            black_box(m.graph_count());
        });
    });
}

criterion_group!(
    benches,
    bench_populate_random,
    bench_churn_random,
    bench_split_merge_chain
);
criterion_main!(benches);
