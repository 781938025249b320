//! Per-basic-event importance measures.
//!
//! All five measures derive from the conditional probabilities
//! `P(top | x = 1)` and `P(top | x = 0)`: by BDD conditioning in exact
//! mode, or by re-evaluating the product set under the chosen
//! approximation.

use crate::products::ProductContainer;
use crate::settings::Approximation;
use crate::solver::TopFunction;
use crate::types::Var;

/// Importance record of one basic event.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportanceRecord {
    pub event: String,
    pub var: Var,
    /// Number of products mentioning the event.
    pub occurrences: usize,
    /// The event's own probability.
    pub probability: f64,
    /// Fussell-Vesely: fractional contribution to the top probability.
    pub fv: f64,
    /// Birnbaum marginal importance: `P(top|x=1) - P(top|x=0)`.
    pub mif: f64,
    /// Risk achievement worth: `P(top|x=1) / P(top)`.
    pub raw: f64,
    /// Risk reduction worth: `P(top) / P(top|x=0)`.
    pub rrw: f64,
    /// Diagnosis importance: `p(x) * P(top|x=1) / P(top)`.
    pub dif: f64,
}

/// Computes importance for every basic event occurring in the products,
/// ordered by variable id.
pub fn analyze(
    products: &ProductContainer,
    var_prob: &[f64],
    p_top: f64,
    approximation: Approximation,
    cut_off: f64,
    exact: Option<&TopFunction>,
) -> Vec<ImportanceRecord> {
    let mut vars: Vec<Var> = Vec::new();
    for product in products {
        for lit in product.literals() {
            if !vars.contains(&lit.var()) {
                vars.push(lit.var());
            }
        }
    }
    vars.sort();

    let mut records = Vec::with_capacity(vars.len());
    for var in vars {
        let occurrences = products.iter().filter(|p| p.contains(var)).count();
        let probability = var_prob[var.index()];
        let (p_up, p_down) = match exact {
            Some(function) => (
                function.conditional(var, true, var_prob),
                function.conditional(var, false, var_prob),
            ),
            None => {
                let mut conditioned = var_prob.to_vec();
                conditioned[var.index()] = 1.0;
                let p_up =
                    crate::probability::from_products(products, &conditioned, approximation, cut_off);
                conditioned[var.index()] = 0.0;
                let p_down =
                    crate::probability::from_products(products, &conditioned, approximation, cut_off);
                (p_up, p_down)
            }
        };
        let mif = p_up - p_down;
        let (fv, raw, rrw, dif) = if p_top > 0.0 {
            (
                (p_top - p_down) / p_top,
                p_up / p_top,
                if p_down > 0.0 { p_top / p_down } else { f64::INFINITY },
                probability * p_up / p_top,
            )
        } else {
            (0.0, 0.0, 0.0, 0.0)
        };
        records.push(ImportanceRecord {
            event: products.event_name(var).to_string(),
            var,
            occurrences,
            probability,
            fv,
            mif,
            raw,
            rrw,
            dif,
        });
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::products::Product;
    use crate::types::Lit;

    #[test]
    fn test_importance_or() {
        // Top = A or B, A=0.1, B=0.2, rare-event.
        let products = ProductContainer::new(
            vec![
                Product::new(vec![Lit::pos(Var::new(1))]),
                Product::new(vec![Lit::pos(Var::new(2))]),
            ],
            vec![String::new(), "A".into(), "B".into()],
        );
        let probs = vec![0.0, 0.1, 0.2];
        let p_top = 0.3;
        let records = analyze(&products, &probs, p_top, Approximation::RareEvent, 0.0, None);
        assert_eq!(records.len(), 2);

        let a = &records[0];
        assert_eq!(a.event, "A");
        assert_eq!(a.occurrences, 1);
        // P(top|A=1) = 1 (clamped), P(top|A=0) = 0.2.
        assert!((a.mif - 0.8).abs() < 1e-12);
        assert!((a.fv - (0.3 - 0.2) / 0.3).abs() < 1e-12);
        assert!((a.raw - 1.0 / 0.3).abs() < 1e-12);
        assert!((a.rrw - 0.3 / 0.2).abs() < 1e-12);
        assert!((a.dif - 0.1 / 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_importance_zero_top() {
        let products = ProductContainer::empty();
        let records = analyze(&products, &[0.0], 0.0, Approximation::RareEvent, 0.0, None);
        assert!(records.is_empty());
    }

    #[test]
    fn test_rrw_infinite_when_event_is_single_cause() {
        // Top = {A}: removing A removes the risk entirely.
        let products = ProductContainer::new(
            vec![Product::new(vec![Lit::pos(Var::new(1))])],
            vec![String::new(), "A".into()],
        );
        let probs = vec![0.0, 0.25];
        let records = analyze(&products, &probs, 0.25, Approximation::RareEvent, 0.0, None);
        assert!(records[0].rrw.is_infinite());
        assert!((records[0].mif - 1.0).abs() < 1e-12);
    }
}
