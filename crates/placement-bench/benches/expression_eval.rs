//! Benchmarks the expression evaluator's parse+compile path, run once
//! per (re)load rather than per selection, but still worth tracking
//! since a pathological rule set should not make config reload
//! noticeably slow.
#![allow(clippy::expect_used)]

use std::collections::HashMap;

use criterion::{Criterion, criterion_group, criterion_main};
use placement_core::{PlacementDefinitions, load_config};

const SIMPLE_RULES: &str = r#"
placements:
  - id: 10
    filter: country("DE")
"#;

const MODERATE_RULES: &str = r#"
placements:
  - id: 10
    filter: country("DE", "FR", "NL") && exclude(tag("0000000000000000000000000000000000000000000000000000000000000001", "banned"))
    selector: balanced("last_net")
    invariant: clumping("last_net", 1)
  - id: 11
    filter: eu() && exclude(country("RU"))
    selector: attributegroup("last_net")
"#;

const COMPLEX_RULES: &str = r#"
templates:
  BASE: "country(\"DE\", \"FR\", \"NL\", \"US\", \"JP\") && exclude(annotated(select(\"vetted\", \"=\", \"false\")))"
placements:
  - id: 20
    filter: $BASE
    upload-filter: $BASE && exclude(country("RU"))
    selector: dual(0.8, balanced("tag:dc"), unvetted(0.1, random()))
    invariant: combined(clumping("last_net", 1), clumping("tag:dc", 3))
    cohort-requirements: min(49) && withhold(attr("tag:dc") + "-" + attr("tag:rack"), 1, withhold(attr("tag:dc"), 3, min(29)))
    ec: { minimum: 29, success: 49, total: 80, repair: "+1" }
  - id: 21
    filter: placement(20) && country("DE")
    selector: choiceoftwo(compare(daily(0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,1)), random())
"#;

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("config_compile");
    let (success, failure) = (HashMap::new(), HashMap::new());

    for (name, yaml) in [("simple", SIMPLE_RULES), ("moderate", MODERATE_RULES), ("complex", COMPLEX_RULES)] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let config = load_config(yaml).expect("should parse");
                PlacementDefinitions::build(&config, &success, &failure).expect("should compile")
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);
