//! Top-event probability: rare-event, min-cut-upper-bound, or exact.
//!
//! The two approximations work on the minimal products; the exact mode
//! evaluates the memoized Shannon expansion of the top-event BDD
//! ([`TopFunction`]). An empty product set means probability 0 (success
//! guaranteed), the unity product means probability 1 (failure
//! guaranteed); both are tolerated, not errors.

use crate::error::{Error, Result};
use crate::products::ProductContainer;
use crate::settings::Approximation;
use crate::solver::TopFunction;

/// The rule-of-thumb bound above which the rare-event approximation is
/// considered unreliable for a single product.
const RARE_EVENT_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityResults {
    pub value: f64,
    pub approximation: Approximation,
    pub warnings: Vec<String>,
}

/// Computes the top-event probability.
///
/// `var_prob` is indexed by variable id; `exact` must be provided when
/// `approximation` is [`Approximation::None`]. Products with probability
/// below `cut_off` are discarded from the approximations.
pub fn analyze(
    products: &ProductContainer,
    var_prob: &[f64],
    approximation: Approximation,
    cut_off: f64,
    exact: Option<&TopFunction>,
) -> Result<ProbabilityResults> {
    let mut warnings = Vec::new();
    let value = match approximation {
        Approximation::None => {
            let function = exact.ok_or_else(|| {
                Error::Logic("exact probability requested without the top-event BDD".to_string())
            })?;
            function.probability(var_prob)
        }
        Approximation::RareEvent => {
            let sum = product_probabilities(products, var_prob, cut_off)
                .inspect(|&p| {
                    if p > RARE_EVENT_THRESHOLD && warnings.is_empty() {
                        warnings.push(format!(
                            "a product probability exceeds {}; \
                             the rare-event approximation may be inaccurate",
                            RARE_EVENT_THRESHOLD
                        ));
                    }
                })
                .sum::<f64>();
            sum.min(1.0)
        }
        Approximation::Mcub => {
            let complement: f64 = product_probabilities(products, var_prob, cut_off)
                .map(|p| 1.0 - p)
                .product();
            1.0 - complement
        }
    };
    debug_assert!((0.0..=1.0).contains(&value));
    Ok(ProbabilityResults { value, approximation, warnings })
}

/// The probability of the top event from the product set alone, without
/// warnings. The helper for importance conditioning and Monte-Carlo trials.
pub fn from_products(
    products: &ProductContainer,
    var_prob: &[f64],
    approximation: Approximation,
    cut_off: f64,
) -> f64 {
    match approximation {
        Approximation::RareEvent | Approximation::None => {
            // Exact re-evaluation goes through the BDD; the rare-event sum
            // is the product-set fallback.
            product_probabilities(products, var_prob, cut_off)
                .sum::<f64>()
                .min(1.0)
        }
        Approximation::Mcub => {
            let complement: f64 = product_probabilities(products, var_prob, cut_off)
                .map(|p| 1.0 - p)
                .product();
            1.0 - complement
        }
    }
}

fn product_probabilities<'a>(
    products: &'a ProductContainer,
    var_prob: &'a [f64],
    cut_off: f64,
) -> impl Iterator<Item = f64> + 'a {
    products
        .iter()
        .map(move |product| product.probability(var_prob))
        .filter(move |&p| p >= cut_off)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::products::Product;
    use crate::types::{Lit, Var};

    fn two_event_products() -> ProductContainer {
        ProductContainer::new(
            vec![
                Product::new(vec![Lit::pos(Var::new(1))]),
                Product::new(vec![Lit::pos(Var::new(2))]),
            ],
            vec![String::new(), "A".into(), "B".into()],
        )
    }

    #[test]
    fn test_rare_event() {
        let probs = vec![0.0, 0.1, 0.2];
        let results =
            analyze(&two_event_products(), &probs, Approximation::RareEvent, 0.0, None).unwrap();
        assert!((results.value - 0.3).abs() < 1e-12);
        // 0.2 > 0.1 triggers the rule-of-thumb warning.
        assert_eq!(results.warnings.len(), 1);
    }

    #[test]
    fn test_mcub() {
        let probs = vec![0.0, 0.1, 0.2];
        let results =
            analyze(&two_event_products(), &probs, Approximation::Mcub, 0.0, None).unwrap();
        assert!((results.value - 0.28).abs() < 1e-12);
        assert!(results.warnings.is_empty());
    }

    #[test]
    fn test_rare_event_clamps_to_one() {
        let products = ProductContainer::new(
            vec![
                Product::new(vec![Lit::pos(Var::new(1))]),
                Product::new(vec![Lit::pos(Var::new(2))]),
            ],
            vec![String::new(), "A".into(), "B".into()],
        );
        let probs = vec![0.0, 0.9, 0.8];
        let results = analyze(&products, &probs, Approximation::RareEvent, 0.0, None).unwrap();
        assert_eq!(results.value, 1.0);
    }

    #[test]
    fn test_cut_off_filters_products() {
        let probs = vec![0.0, 0.1, 0.2];
        let results =
            analyze(&two_event_products(), &probs, Approximation::RareEvent, 0.15, None).unwrap();
        assert!((results.value - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_empty_and_unity() {
        let probs = vec![0.0];
        let empty = ProductContainer::empty();
        let results = analyze(&empty, &probs, Approximation::RareEvent, 0.0, None).unwrap();
        assert_eq!(results.value, 0.0);

        let unity = ProductContainer::new(vec![Product::unity()], vec![String::new()]);
        let results = analyze(&unity, &probs, Approximation::Mcub, 0.0, None).unwrap();
        assert_eq!(results.value, 1.0);
    }
}
