//! Analysis orchestration: one [`RiskAnalysis`] over a model runs the
//! qualitative and quantitative analyses of every fault tree.
//!
//! Each top gate is analyzed independently with its own PDAG, solver
//! tables, and caches; nothing mutable is shared between fault trees, so a
//! caller may fan the per-tree work out to workers. Cancellation is
//! cooperative: an external watchdog flips the shared [`CancelToken`] and
//! the pipeline surfaces [`Error::Cancelled`] at the next pass boundary.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::importance::{self, ImportanceRecord};
use crate::model::{EvalCx, FaultTree, Model};
use crate::pdag::Pdag;
use crate::preprocessor::{Preprocessor, ProcessingTarget};
use crate::probability::{self, ProbabilityResults};
use crate::products::ProductContainer;
use crate::settings::{Algorithm, Approximation, Settings};
use crate::solver::{CutSetSolver, TopFunction};
use crate::uncertainty::{self, UncertaintyResults};

/// Shared cooperative-cancellation flag.
///
/// Cloning shares the flag; any clone can cancel, every analysis pass
/// checks it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Returns [`Error::Cancelled`] if the flag is set.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Results of one fault-tree analysis.
#[derive(Debug, Clone)]
pub struct FaultTreeResults {
    pub name: String,
    pub top_gate: String,
    pub products: ProductContainer,
    pub warnings: Vec<String>,
    pub probability: Option<ProbabilityResults>,
    pub importance: Option<Vec<ImportanceRecord>>,
    pub uncertainty: Option<UncertaintyResults>,
}

/// Results of the whole run.
#[derive(Debug, Clone)]
pub struct RiskAnalysisResults {
    pub warnings: Vec<String>,
    pub fault_trees: Vec<FaultTreeResults>,
}

/// The analysis facade: a validated model plus settings.
pub struct RiskAnalysis<'a> {
    model: &'a Model,
    settings: &'a Settings,
    cancel: CancelToken,
}

impl<'a> RiskAnalysis<'a> {
    pub fn new(model: &'a Model, settings: &'a Settings) -> Self {
        RiskAnalysis { model, settings, cancel: CancelToken::new() }
    }

    /// The shared cancellation flag, for external watchdogs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Validates settings and model, then analyzes every fault tree.
    pub fn run(&self) -> Result<RiskAnalysisResults> {
        self.settings.validate()?;
        let cx = EvalCx { mission_time: self.settings.get_mission_time() };
        let probability_needed = self.settings.is_probability_analysis();
        self.model.validate(probability_needed, &cx)?;

        // CCF expansion works on a private copy of the model.
        let model: Cow<'_, Model> =
            if self.settings.is_ccf_analysis() && !self.model.ccf_groups().is_empty() {
                let mut expanded = self.model.clone();
                expanded.apply_ccf(&cx)?;
                Cow::Owned(expanded)
            } else {
                Cow::Borrowed(self.model)
            };

        let mut warnings = Vec::new();
        let orphans = model.orphan_events();
        if !orphans.is_empty() {
            warnings.push(format!("orphan primary events: {}", orphans.join(", ")));
        }

        let mut fault_trees = Vec::new();
        for fault_tree in model.fault_trees() {
            info!("analyzing fault tree {}", fault_tree.name());
            fault_trees.push(self.analyze_tree(&model, fault_tree, &cx)?);
        }
        Ok(RiskAnalysisResults { warnings, fault_trees })
    }

    fn analyze_tree(
        &self,
        model: &Model,
        fault_tree: &FaultTree,
        cx: &EvalCx,
    ) -> Result<FaultTreeResults> {
        let settings = self.settings;
        let mut warnings = Vec::new();

        let mut pdag = Pdag::new(model, fault_tree.top(), settings.is_ccf_analysis())?;
        let target = match settings.get_algorithm() {
            Algorithm::Bdd => ProcessingTarget::General,
            _ => ProcessingTarget::AndOr,
        };
        let var_constants: Vec<(u32, bool)> = if settings.is_probability_analysis() {
            pdag.variables()
                .iter()
                .enumerate()
                .filter_map(|(i, &event)| {
                    model.constant_probability(event, cx).map(|state| (i as u32 + 1, state))
                })
                .collect()
        } else {
            Vec::new()
        };
        Preprocessor::new(&mut pdag, &self.cancel).run(target, &var_constants)?;

        let mut solver = CutSetSolver::new(
            &pdag,
            settings.get_limit_order(),
            settings.is_prime_implicants(),
            &self.cancel,
        );
        let raw_products = solver.solve(settings.get_algorithm())?;

        let mut names = vec![String::new()];
        names.extend(pdag.variables().iter().map(|&event| model.basic_event(event).name().to_string()));
        let products = ProductContainer::new(raw_products, names);
        debug!(
            "fault tree {}: {} minimal products",
            fault_tree.name(),
            products.len()
        );

        if products.is_empty() {
            warnings.push("the top event is NULL: success is guaranteed".to_string());
        } else if products.is_unity() {
            warnings.push("the top event is UNITY: failure is guaranteed".to_string());
        }

        let mut probability_results = None;
        let mut importance_results = None;
        let mut uncertainty_results = None;
        if settings.is_probability_analysis() {
            let mut var_prob = vec![0.0];
            var_prob.extend(
                pdag.variables()
                    .iter()
                    .map(|&event| model.basic_event_probability(event, cx)),
            );
            let exact = if settings.get_approximation() == Approximation::None {
                Some(TopFunction::new(&pdag, &self.cancel)?)
            } else {
                None
            };

            let prob = probability::analyze(
                &products,
                &var_prob,
                settings.get_approximation(),
                settings.get_cut_off(),
                exact.as_ref(),
            )?;
            warnings.extend(prob.warnings.iter().cloned());

            if settings.is_importance_analysis() {
                importance_results = Some(importance::analyze(
                    &products,
                    &var_prob,
                    prob.value,
                    settings.get_approximation(),
                    settings.get_cut_off(),
                    exact.as_ref(),
                ));
            }
            if settings.is_uncertainty_analysis() {
                uncertainty_results = Some(uncertainty::analyze(
                    model,
                    &products,
                    pdag.variables(),
                    exact.as_ref(),
                    settings.get_approximation(),
                    settings.get_cut_off(),
                    settings.get_trials(),
                    settings.get_seed(),
                    settings.get_mission_time(),
                    &self.cancel,
                )?);
            }
            probability_results = Some(prob);
        }

        Ok(FaultTreeResults {
            name: fault_tree.name().to_string(),
            top_gate: model.gate(fault_tree.top()).name().to_string(),
            products,
            warnings,
            probability: probability_results,
            importance: importance_results,
            uncertainty: uncertainty_results,
        })
    }
}

impl fmt::Display for RiskAnalysisResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for warning in &self.warnings {
            writeln!(f, "warning: {}", warning)?;
        }
        for tree in &self.fault_trees {
            writeln!(f, "fault tree {} (top {})", tree.name, tree.top_gate)?;
            for warning in &tree.warnings {
                writeln!(f, "  warning: {}", warning)?;
            }
            write!(f, "{}", tree.products)?;
            if let Some(prob) = &tree.probability {
                writeln!(f, "  probability ({}): {:.12e}", prob.approximation, prob.value)?;
            }
            if let Some(importance) = &tree.importance {
                for record in importance {
                    writeln!(
                        f,
                        "  importance {}: occ={} p={:.6e} fv={:.6e} mif={:.6e} raw={:.6e} rrw={:.6e} dif={:.6e}",
                        record.event,
                        record.occurrences,
                        record.probability,
                        record.fv,
                        record.mif,
                        record.raw,
                        record.rrw,
                        record.dif,
                    )?;
                }
            }
            if let Some(uncertainty) = &tree.uncertainty {
                writeln!(
                    f,
                    "  uncertainty: mean={:.6e} std={:.6e} q05={:.6e} q50={:.6e} q95={:.6e}",
                    uncertainty.mean,
                    uncertainty.std_deviation,
                    uncertainty.quantile_05,
                    uncertainty.median,
                    uncertainty.quantile_95,
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Connective;

    #[test]
    fn test_or_tree_end_to_end() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let b = model.add_basic_event("B", 0.2).unwrap();
        let top = model.add_gate("Top", Connective::Or, [a, b]).unwrap();
        model.add_fault_tree("FT", top).unwrap();

        let mut settings = Settings::default();
        settings.probability_analysis(true);
        let results = RiskAnalysis::new(&model, &settings).run().unwrap();
        assert_eq!(results.fault_trees.len(), 1);
        let tree = &results.fault_trees[0];
        assert_eq!(tree.products.named_products(), vec![vec!["A"], vec!["B"]]);
        assert!((tree.probability.as_ref().unwrap().value - 0.28).abs() < 1e-12);
    }

    #[test]
    fn test_settings_validated() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let b = model.add_basic_event("B", 0.2).unwrap();
        let top = model.add_gate("Top", Connective::And, [a, b]).unwrap();
        model.add_fault_tree("FT", top).unwrap();

        let mut settings = Settings::default();
        settings.algorithm(Algorithm::Mocus).prime_implicants(true);
        let err = RiskAnalysis::new(&model, &settings).run().unwrap_err();
        assert!(matches!(err, Error::Settings(_)));
    }

    #[test]
    fn test_cancellation_before_run() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let b = model.add_basic_event("B", 0.2).unwrap();
        let top = model.add_gate("Top", Connective::Or, [a, b]).unwrap();
        model.add_fault_tree("FT", top).unwrap();

        let settings = Settings::default();
        let analysis = RiskAnalysis::new(&model, &settings);
        analysis.cancel_token().cancel();
        let err = analysis.run().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_orphan_warning() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let b = model.add_basic_event("B", 0.2).unwrap();
        let _lonely = model.add_basic_event("Lonely", 0.3).unwrap();
        let top = model.add_gate("Top", Connective::Or, [a, b]).unwrap();
        model.add_fault_tree("FT", top).unwrap();

        let settings = Settings::default();
        let results = RiskAnalysis::new(&model, &settings).run().unwrap();
        assert!(results.warnings[0].contains("Lonely"));
    }
}
