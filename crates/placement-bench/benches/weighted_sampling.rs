//! Benchmarks the Efraimidis-Spirakis weighted selector (`weighted`)
//! across fleet sizes.
#![allow(clippy::expect_used)]

use std::collections::HashSet;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use placement_bench::{SizeTier, generate_fleet};
use placement_core::context::CancellationToken;
use placement_core::expr::{Bindings, RuleKind, eval_source};
use placement_core::filter::All;
use placement_core::node::NodeId;
use placement_core::selector::SelectCall;
use std::sync::Arc;

fn bench_weighted(c: &mut Criterion) {
    let mut group = c.benchmark_group("weighted_selector");

    for (name, tier) in [("S", SizeTier::Small), ("M", SizeTier::Medium), ("L", SizeTier::Large)] {
        let config = tier.config(42);
        let nodes = generate_fleet(&config);
        group.throughput(Throughput::Elements(nodes.len() as u64));

        let owned = Bindings::bare(RuleKind::Selector);
        let bindings = owned.as_bindings();
        let selector_init = eval_source(r#"weighted("free_disk", 1.0, all())"#, &bindings)
            .expect("compiles")
            .into_selector(r#"weighted("free_disk", 1.0, all())"#)
            .expect("is a selector");
        let base_filter = Arc::new(All);
        let selector = selector_init.init(&nodes, &base_filter);

        let excluded = HashSet::new();
        let requester = NodeId::from_bytes([1; 32]);
        let cancel = CancellationToken::none();

        group.bench_with_input(BenchmarkId::from_parameter(name), &nodes, |b, _| {
            b.iter(|| {
                let call = SelectCall {
                    placement: 0,
                    requester,
                    n: 80,
                    excluded: &excluded,
                    already_selected: &[],
                    cancel: &cancel,
                };
                selector.select(&call).expect("enough nodes")
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_weighted);
criterion_main!(benches);
