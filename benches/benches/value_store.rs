// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for `understory_value_store`.

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::sync::Once;
use std::vec::Vec;

use understory_value_store::{
    BindingPriority, ObjectId, ObjectTree, OwnerType, Property, PropertyMetadataBuilder,
    PropertyRegistry, ValueFrameBuilder,
};

struct Fixture {
    tree: ObjectTree,
    width: Property<f64>,
    font_size: Property<f64>,
    /// A chain: `nodes[i]` is the parent of `nodes[i + 1]`.
    nodes: Vec<ObjectId>,
}

fn fixture(chain_len: usize) -> Fixture {
    let mut registry = PropertyRegistry::new();
    let width: Property<f64> =
        registry.register("Width", PropertyMetadataBuilder::new(0.0_f64).build());
    let font_size: Property<f64> = registry.register(
        "FontSize",
        PropertyMetadataBuilder::new(12.0_f64)
            .inherits(true)
            .build(),
    );
    let mut tree = ObjectTree::new(registry);
    let mut nodes = Vec::with_capacity(chain_len);
    let mut parent = None;
    for _ in 0..chain_len {
        let id = tree.insert(OwnerType::default(), parent).unwrap();
        nodes.push(id);
        parent = Some(id);
    }
    Fixture {
        tree,
        width,
        font_size,
        nodes,
    }
}

fn bench_resolve(c: &mut Criterion) {
    static PRINT_SIZES: Once = Once::new();
    PRINT_SIZES.call_once(|| {
        eprintln!(
            "sizes: ValueStore={} EffectiveValue={} ErasedValue={}",
            core::mem::size_of::<understory_value_store::ValueStore>(),
            core::mem::size_of::<understory_value_store::EffectiveValue>(),
            core::mem::size_of::<understory_value_store::ErasedValue>(),
        );
    });

    let mut group = c.benchmark_group("value_store/resolve");

    group.bench_function("local", |b| {
        let Fixture {
            mut tree,
            width,
            nodes,
            ..
        } = fixture(1);
        tree.set_value(nodes[0], width, 100.0, BindingPriority::LocalValue)
            .unwrap();
        b.iter(|| black_box(tree.get_value(nodes[0], width)));
    });

    group.bench_function("animation", |b| {
        let Fixture {
            mut tree,
            width,
            nodes,
            ..
        } = fixture(1);
        tree.set_value(nodes[0], width, 100.0, BindingPriority::LocalValue)
            .unwrap();
        tree.set_value(nodes[0], width, 200.0, BindingPriority::Animation)
            .unwrap();
        b.iter(|| black_box(tree.get_value(nodes[0], width)));
    });

    group.bench_function("default", |b| {
        let Fixture { tree, width, nodes, .. } = fixture(1);
        b.iter(|| black_box(tree.get_value(nodes[0], width)));
    });

    for chain_len in [4_usize, 16, 64] {
        group.bench_function(BenchmarkId::new("inherited", chain_len), |b| {
            let Fixture {
                mut tree,
                font_size,
                nodes,
                ..
            } = fixture(chain_len);
            tree.set_value(nodes[0], font_size, 16.0, BindingPriority::LocalValue)
                .unwrap();
            let leaf = nodes[chain_len - 1];
            b.iter(|| black_box(tree.get_value(leaf, font_size)));
        });
    }

    group.finish();
}

fn bench_mutate(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_store/mutate");

    group.bench_function("set_local", |b| {
        let Fixture {
            mut tree,
            width,
            nodes,
            ..
        } = fixture(1);
        let mut next = 0.0_f64;
        b.iter(|| {
            next += 1.0;
            tree.set_value(nodes[0], width, next, BindingPriority::LocalValue)
                .unwrap();
            black_box(tree.drain_changes());
        });
    });

    for chain_len in [16_usize, 64] {
        group.bench_function(BenchmarkId::new("propagate_inherited", chain_len), |b| {
            let Fixture {
                mut tree,
                font_size,
                nodes,
                ..
            } = fixture(chain_len);
            let mut next = 12.0_f64;
            b.iter(|| {
                next += 1.0;
                tree.set_value(nodes[0], font_size, next, BindingPriority::LocalValue)
                    .unwrap();
                black_box(tree.drain_changes());
            });
        });
    }

    // Swap a batch of style frames in and out under a single styling batch,
    // as a selector engine would when an element's classes change.
    for frame_count in [4_usize, 16] {
        group.bench_function(BenchmarkId::new("restyle_batch", frame_count), |b| {
            b.iter_batched(
                || {
                    let Fixture {
                        mut tree,
                        width,
                        font_size,
                        nodes,
                    } = fixture(2);
                    let frames: Vec<_> = (0..frame_count)
                        .map(|i| {
                            ValueFrameBuilder::new(BindingPriority::Style)
                                .set(width, i as f64)
                                .set(font_size, 10.0 + i as f64)
                                .build()
                        })
                        .collect();
                    (tree, nodes[0], frames)
                },
                |(mut tree, object, frames)| {
                    tree.begin_styling(object).unwrap();
                    for frame in frames {
                        tree.add_frame(object, frame).unwrap();
                    }
                    tree.end_styling(object).unwrap();
                    black_box(tree.drain_changes());
                    black_box(tree);
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_mutate);
criterion_main!(benches);
