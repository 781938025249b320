//! Cross-cutting invariants: determinism, solver equivalence, minimality,
//! order bounds, probability bounds, and CCF expansion soundness.

use proptest::prelude::*;

use scram::analysis::RiskAnalysis;
use scram::model::{Arg, CcfModelKind, Connective, Model};
use scram::settings::{Algorithm, Approximation, Settings};

fn named_products(model: &Model, settings: &Settings) -> Vec<Vec<String>> {
    let results = RiskAnalysis::new(model, settings).run().unwrap();
    results.fault_trees[0].products.named_products()
}

fn medium_tree() -> Model {
    let mut model = Model::new("m");
    let a = model.add_basic_event("A", 0.02).unwrap();
    let b = model.add_basic_event("B", 0.05).unwrap();
    let c = model.add_basic_event("C", 0.1).unwrap();
    let d = model.add_basic_event("D", 0.03).unwrap();
    let e = model.add_basic_event("E", 0.07).unwrap();
    let vote = model.add_atleast_gate("Vote", 2, [a, b, c]).unwrap();
    let pump = model.add_gate("Pump", Connective::And, [d, e]).unwrap();
    let line = model
        .add_gate("Line", Connective::Or, [Arg::new(pump), Arg::new(c)])
        .unwrap();
    let top = model
        .add_gate("Top", Connective::Or, [Arg::new(vote), Arg::new(line), Arg::new(a)])
        .unwrap();
    model.add_fault_tree("FT", top).unwrap();
    model
}

#[test]
fn determinism_byte_identical_reports() {
    let model = medium_tree();
    let mut settings = Settings::default();
    settings
        .algorithm(Algorithm::Bdd)
        .probability_analysis(true)
        .importance_analysis(true)
        .uncertainty_analysis(true);
    settings.trials(100).unwrap();
    settings.seed(99);

    let first = RiskAnalysis::new(&model, &settings).run().unwrap().to_string();
    let second = RiskAnalysis::new(&model, &settings).run().unwrap().to_string();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn solver_equivalence_on_medium_tree() {
    let model = medium_tree();
    let mut reference = None;
    for algorithm in [Algorithm::Bdd, Algorithm::Zbdd, Algorithm::Mocus] {
        let mut settings = Settings::default();
        settings.algorithm(algorithm);
        let products = named_products(&model, &settings);
        match &reference {
            None => reference = Some(products),
            Some(expected) => assert_eq!(expected, &products, "algorithm {}", algorithm),
        }
    }
}

#[test]
fn minimality_no_product_subsumes_another() {
    let model = medium_tree();
    let settings = Settings::default();
    let products = named_products(&model, &settings);
    for (i, p) in products.iter().enumerate() {
        for (j, q) in products.iter().enumerate() {
            if i == j {
                continue;
            }
            let subset = p.iter().all(|lit| q.contains(lit));
            assert!(!subset, "{:?} subsumes {:?}", p, q);
        }
    }
}

#[test]
fn order_bound_respected() {
    let model = medium_tree();
    for limit in 1..=3 {
        for algorithm in [Algorithm::Bdd, Algorithm::Zbdd, Algorithm::Mocus] {
            let mut settings = Settings::default();
            settings.algorithm(algorithm).limit_order(limit);
            let products = named_products(&model, &settings);
            assert!(
                products.iter().all(|p| p.len() <= limit),
                "algorithm {} limit {}",
                algorithm,
                limit
            );
        }
    }
}

#[test]
fn limited_products_are_prefix_of_unlimited() {
    let model = medium_tree();
    let mut settings = Settings::default();
    let unlimited = named_products(&model, &settings);
    settings.limit_order(2);
    let limited = named_products(&model, &settings);
    let expected: Vec<_> = unlimited.into_iter().filter(|p| p.len() <= 2).collect();
    assert_eq!(limited, expected);
}

#[test]
fn probability_bounds_and_ordering() {
    let model = medium_tree();
    let mut values = Vec::new();
    for approximation in [Approximation::RareEvent, Approximation::Mcub, Approximation::None] {
        let mut settings = Settings::default();
        settings
            .algorithm(Algorithm::Bdd)
            .approximation(approximation)
            .probability_analysis(true);
        let results = RiskAnalysis::new(&model, &settings).run().unwrap();
        let p = results.fault_trees[0].probability.as_ref().unwrap().value;
        assert!((0.0..=1.0).contains(&p));
        values.push(p);
    }
    // rare-event >= mcub >= exact on coherent models.
    assert!(values[0] >= values[1] - 1e-12);
    assert!(values[1] >= values[2] - 1e-12);
}

#[test]
fn ccf_beta_zero_matches_plain_analysis() {
    let plain = {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let b = model.add_basic_event("B", 0.1).unwrap();
        let top = model.add_gate("Top", Connective::Or, [a, b]).unwrap();
        model.add_fault_tree("FT", top).unwrap();
        model
    };
    let grouped = {
        let mut model = Model::new("m");
        let a = model.declare_basic_event("A").unwrap();
        let b = model.declare_basic_event("B").unwrap();
        let top = model.add_gate("Top", Connective::Or, [a, b]).unwrap();
        model.add_fault_tree("FT", top).unwrap();
        let q = model.constant(0.1);
        let beta = model.constant(0.0);
        model
            .add_ccf_group("pumps", CcfModelKind::BetaFactor, vec![a, b], q, vec![(2, beta)])
            .unwrap();
        model
    };

    let mut settings = Settings::default();
    settings.probability_analysis(true).importance_analysis(true);
    let baseline = RiskAnalysis::new(&plain, &settings).run().unwrap().to_string();

    settings.ccf_analysis(true);
    let expanded = RiskAnalysis::new(&grouped, &settings).run().unwrap().to_string();
    assert_eq!(baseline, expanded);
}

#[test]
fn ccf_beta_positive_adds_common_cause_product() {
    let mut model = Model::new("m");
    let a = model.declare_basic_event("A").unwrap();
    let b = model.declare_basic_event("B").unwrap();
    let top = model.add_gate("Top", Connective::And, [a, b]).unwrap();
    model.add_fault_tree("FT", top).unwrap();
    let q = model.constant(0.1);
    let beta = model.constant(0.2);
    model
        .add_ccf_group("pumps", CcfModelKind::BetaFactor, vec![a, b], q, vec![(2, beta)])
        .unwrap();

    let mut settings = Settings::default();
    settings.ccf_analysis(true).probability_analysis(true);
    settings.approximation(Approximation::RareEvent);
    let results = RiskAnalysis::new(&model, &settings).run().unwrap();
    let tree = &results.fault_trees[0];
    // AND(A, B) expands to the independent pair plus the common-cause event.
    assert_eq!(
        tree.products.named_products(),
        vec![vec!["[A B]"], vec!["A", "B"]]
    );
    // (0.2)(0.1) + ((0.8)(0.1))^2
    let expected = 0.02 + 0.0064;
    assert!((tree.probability.as_ref().unwrap().value - expected).abs() < 1e-12);
}

#[test]
fn cancellation_surfaces_unchanged() {
    let model = medium_tree();
    let settings = Settings::default();
    let analysis = RiskAnalysis::new(&model, &settings);
    analysis.cancel_token().cancel();
    let err = analysis.run().unwrap_err();
    assert!(err.is_cancelled());
}

// Randomized coherent trees: the three engines must agree exactly.

#[derive(Debug, Clone)]
struct GateSpec {
    kind: u8,
    args: Vec<usize>,
}

fn arb_gate(pool: usize) -> impl Strategy<Value = GateSpec> {
    let indices: Vec<usize> = (0..pool).collect();
    (0u8..3, proptest::sample::subsequence(indices, 2..=pool.min(4)))
        .prop_map(|(kind, args)| GateSpec { kind, args })
}

fn build_random_model(specs: &[GateSpec], events: usize) -> Model {
    let mut model = Model::new("random");
    let mut refs: Vec<Arg> = Vec::new();
    for i in 0..events {
        let event = model
            .add_basic_event(format!("E{}", i), 0.01 * (i + 1) as f64)
            .unwrap();
        refs.push(Arg::new(event));
    }
    for (g, spec) in specs.iter().enumerate() {
        let args: Vec<Arg> = spec.args.iter().map(|&i| refs[i]).collect();
        let gate = match spec.kind {
            0 => model.add_gate(format!("G{}", g), Connective::And, args).unwrap(),
            1 => model.add_gate(format!("G{}", g), Connective::Or, args).unwrap(),
            _ => {
                let k = args.len() - 1;
                model
                    .add_atleast_gate(format!("G{}", g), k.max(1), args)
                    .unwrap()
            }
        };
        refs.push(Arg::new(gate));
    }
    let top_args: Vec<Arg> = vec![refs[refs.len() - 1], refs[0]];
    let top = model.add_gate("Top", Connective::Or, top_args).unwrap();
    model.add_fault_tree("FT", top).unwrap();
    model
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn solver_equivalence_on_random_coherent_trees(
        g1 in arb_gate(5),
        g2 in arb_gate(6),
        g3 in arb_gate(7),
    ) {
        let model = build_random_model(&[g1, g2, g3], 5);
        let mut reference = None;
        for algorithm in [Algorithm::Bdd, Algorithm::Zbdd, Algorithm::Mocus] {
            let mut settings = Settings::default();
            settings.algorithm(algorithm);
            let products = named_products(&model, &settings);
            match &reference {
                None => reference = Some(products),
                Some(expected) => prop_assert_eq!(expected, &products),
            }
        }
    }

    #[test]
    fn random_trees_deterministic(g1 in arb_gate(5), g2 in arb_gate(6)) {
        let model = build_random_model(&[g1, g2], 5);
        let settings = Settings::default();
        let first = named_products(&model, &settings);
        let second = named_products(&model, &settings);
        prop_assert_eq!(first, second);
    }
}
