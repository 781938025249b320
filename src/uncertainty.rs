//! Monte-Carlo uncertainty analysis.
//!
//! Each trial draws every parametric expression through a
//! counter-selected stream of one seeded ChaCha PRNG (`set_stream(trial)`),
//! so the sampled distribution does not depend on trial execution order and
//! stays identical under any future parallel split of the trial range. The
//! probability model is then re-evaluated per trial and summarized as mean,
//! variance, quantiles, and a histogram.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::analysis::CancelToken;
use crate::error::Result;
use crate::model::{BasicEventId, EvalCx, Model, SampleCx};
use crate::products::ProductContainer;
use crate::settings::Approximation;
use crate::solver::TopFunction;

/// Number of bins of the reported distribution histogram.
const HISTOGRAM_BINS: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct UncertaintyResults {
    pub mean: f64,
    pub variance: f64,
    pub std_deviation: f64,
    pub quantile_05: f64,
    pub median: f64,
    pub quantile_95: f64,
    /// `(bin upper bound, fraction of trials)` pairs.
    pub histogram: Vec<(f64, f64)>,
}

/// Runs the Monte-Carlo trials.
///
/// `variables` maps analysis variables (1-indexed) to their model events;
/// `exact` switches the per-trial evaluation to the top-event BDD.
#[allow(clippy::too_many_arguments)]
pub fn analyze(
    model: &Model,
    products: &ProductContainer,
    variables: &[BasicEventId],
    exact: Option<&TopFunction>,
    approximation: Approximation,
    cut_off: f64,
    trials: usize,
    seed: u64,
    mission_time: f64,
    cancel: &CancelToken,
) -> Result<UncertaintyResults> {
    let cx = EvalCx { mission_time };
    let mut samples = Vec::with_capacity(trials);
    for trial in 0..trials {
        cancel.check()?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(trial as u64 + 1);
        let mut trial_cx = SampleCx::new(cx, &mut rng);

        let mut var_prob = vec![0.0; variables.len() + 1];
        for (i, &event) in variables.iter().enumerate() {
            let sampled = match model.basic_event(event).expression() {
                Some(expr) => model.exprs().sample(expr, model.parameters(), &mut trial_cx)?,
                None => 0.0,
            };
            var_prob[i + 1] = sampled.clamp(0.0, 1.0);
        }
        let p = match exact {
            Some(function) => function.probability(&var_prob),
            None => crate::probability::from_products(products, &var_prob, approximation, cut_off),
        };
        samples.push(p);
    }
    Ok(summarize(samples))
}

fn summarize(mut samples: Vec<f64>) -> UncertaintyResults {
    let n = samples.len();
    let mean = samples.iter().sum::<f64>() / n as f64;
    let variance = if n > 1 {
        samples.iter().map(|&x| (x - mean) * (x - mean)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let quantile = |q: f64| -> f64 {
        let position = q * (n - 1) as f64;
        samples[position.round() as usize]
    };

    let min = samples[0];
    let max = samples[n - 1];
    let width = (max - min) / HISTOGRAM_BINS as f64;
    let histogram = if width > 0.0 {
        let mut counts = vec![0usize; HISTOGRAM_BINS];
        for &sample in &samples {
            let bin = (((sample - min) / width) as usize).min(HISTOGRAM_BINS - 1);
            counts[bin] += 1;
        }
        counts
            .into_iter()
            .enumerate()
            .map(|(i, count)| (min + width * (i + 1) as f64, count as f64 / n as f64))
            .collect()
    } else {
        vec![(max, 1.0)]
    };

    UncertaintyResults {
        mean,
        variance,
        std_deviation: variance.sqrt(),
        quantile_05: quantile(0.05),
        median: quantile(0.50),
        quantile_95: quantile(0.95),
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Connective, Expression};
    use crate::products::Product;
    use crate::types::{Lit, Var};

    fn uncertain_model() -> (Model, Vec<BasicEventId>, ProductContainer) {
        let mut model = Model::new("m");
        let min = model.constant(0.05);
        let max = model.constant(0.15);
        let uniform = model.add_expression(Expression::Uniform { min, max });
        let a = model.add_basic_event_expr("A", uniform).unwrap();
        let b = model.add_basic_event("B", 0.2).unwrap();
        let top = model.add_gate("Top", Connective::Or, [a, b]).unwrap();
        model.add_fault_tree("FT", top).unwrap();
        let products = ProductContainer::new(
            vec![
                Product::new(vec![Lit::pos(Var::new(1))]),
                Product::new(vec![Lit::pos(Var::new(2))]),
            ],
            vec![String::new(), "A".into(), "B".into()],
        );
        (model, vec![a, b], products)
    }

    #[test]
    fn test_deterministic_given_seed() {
        let (model, variables, products) = uncertain_model();
        let cancel = CancelToken::new();
        let run = || {
            analyze(
                &model,
                &products,
                &variables,
                None,
                Approximation::RareEvent,
                0.0,
                200,
                42,
                8760.0,
                &cancel,
            )
            .unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_mean_near_point_estimate() {
        let (model, variables, products) = uncertain_model();
        let cancel = CancelToken::new();
        let results = analyze(
            &model,
            &products,
            &variables,
            None,
            Approximation::RareEvent,
            0.0,
            2000,
            7,
            8760.0,
            &cancel,
        )
        .unwrap();
        // E[A] = 0.1, B = 0.2: the rare-event sum is around 0.3.
        assert!((results.mean - 0.3).abs() < 0.01);
        assert!(results.quantile_05 <= results.median);
        assert!(results.median <= results.quantile_95);
        let total: f64 = results.histogram.iter().map(|&(_, f)| f).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_model_degenerates() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.25).unwrap();
        let b = model.add_basic_event("B", 0.25).unwrap();
        let _top = model.add_gate("Top", Connective::And, [a, b]).unwrap();
        let products = ProductContainer::new(
            vec![Product::new(vec![Lit::pos(Var::new(1)), Lit::pos(Var::new(2))])],
            vec![String::new(), "A".into(), "B".into()],
        );
        let cancel = CancelToken::new();
        let results = analyze(
            &model,
            &products,
            &[a, b],
            None,
            Approximation::RareEvent,
            0.0,
            50,
            1,
            8760.0,
            &cancel,
        )
        .unwrap();
        assert_eq!(results.variance, 0.0);
        assert_eq!(results.mean, 0.0625);
        assert_eq!(results.histogram, vec![(0.0625, 1.0)]);
    }

    #[test]
    fn test_cancellation() {
        let (model, variables, products) = uncertain_model();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = analyze(
            &model,
            &products,
            &variables,
            None,
            Approximation::RareEvent,
            0.0,
            10,
            1,
            8760.0,
            &cancel,
        )
        .unwrap_err();
        assert!(err.is_cancelled());
    }
}
