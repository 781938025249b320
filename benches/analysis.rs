//! Benchmarks of the three cut-set engines over synthetic fault trees.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use scram::analysis::RiskAnalysis;
use scram::model::{Arg, Connective, Model};
use scram::settings::{Algorithm, Settings};

/// Builds a layered random coherent fault tree: `events` leaves, then
/// `gates` random AND/OR/ATLEAST gates over earlier nodes, topped by an OR.
fn random_tree(seed: u64, events: usize, gates: usize) -> Model {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut model = Model::new("bench");
    let mut refs: Vec<Arg> = Vec::new();
    for i in 0..events {
        let p = rng.random_range(0.001..0.1);
        let event = model.add_basic_event(format!("E{}", i), p).unwrap();
        refs.push(Arg::new(event));
    }
    for g in 0..gates {
        let arity = rng.random_range(2..=refs.len().min(4));
        let mut args = Vec::with_capacity(arity);
        let mut taken = std::collections::HashSet::new();
        while args.len() < arity {
            let pick = rng.random_range(0..refs.len());
            if taken.insert(pick) {
                args.push(refs[pick]);
            }
        }
        let gate = match rng.random_range(0..3) {
            0 => model.add_gate(format!("G{}", g), Connective::And, args).unwrap(),
            1 => model.add_gate(format!("G{}", g), Connective::Or, args).unwrap(),
            _ => {
                let k = args.len() - 1;
                model.add_atleast_gate(format!("G{}", g), k.max(1), args).unwrap()
            }
        };
        refs.push(Arg::new(gate));
    }
    let tail: Vec<Arg> = refs[refs.len() - 3..].to_vec();
    let top = model.add_gate("Top", Connective::Or, tail).unwrap();
    model.add_fault_tree("FT", top).unwrap();
    model
}

fn bench_engines(c: &mut Criterion) {
    let model = random_tree(42, 24, 12);
    let mut group = c.benchmark_group("cut_sets");
    for algorithm in [Algorithm::Bdd, Algorithm::Zbdd, Algorithm::Mocus] {
        group.bench_with_input(
            BenchmarkId::from_parameter(algorithm),
            &algorithm,
            |b, &algorithm| {
                let mut settings = Settings::default();
                settings.algorithm(algorithm).limit_order(5);
                b.iter(|| RiskAnalysis::new(&model, &settings).run().unwrap());
            },
        );
    }
    group.finish();
}

fn bench_quantification(c: &mut Criterion) {
    let model = random_tree(7, 20, 10);
    c.bench_function("probability_exact", |b| {
        let mut settings = Settings::default();
        settings
            .algorithm(Algorithm::Bdd)
            .probability_analysis(true)
            .importance_analysis(true)
            .limit_order(5);
        b.iter(|| RiskAnalysis::new(&model, &settings).run().unwrap());
    });
}

criterion_group!(benches, bench_engines, bench_quantification);
criterion_main!(benches);
