//! # scram: fault-tree risk analysis in Rust
//!
//! **`scram`** is a probabilistic risk-analysis engine for fault trees in the
//! Open-PSA Model Exchange Format. It takes a symbolic model whose basic
//! events carry probabilistic descriptions and whose gates compose Boolean
//! logic, and produces the minimal cut sets (or minimal prime implicants) of
//! each top event, the top-event probability under a chosen approximation,
//! per-event importance measures, and Monte-Carlo uncertainty bounds.
//!
//! ## Architecture
//!
//! The analysis pipeline is staged:
//!
//! 1. **Model** ([`model`]): immutable symbolic layer of gates, basic/house
//!    events, parameters, stochastic expressions, and CCF groups.
//! 2. **PDAG** ([`pdag`]): the solver-facing intermediate representation, a
//!    shared-node DAG with sign-carrying edges held in an index arena.
//! 3. **Preprocessor** ([`preprocessor`]): a staged, idempotent rewrite
//!    pipeline (normalization, constant propagation, coalescing, K/N
//!    lowering, module detection, Boolean optimization).
//! 4. **Solvers** ([`mocus`], [`bdd`], [`zbdd`]): three interchangeable
//!    cut-set engines, all emitting a ZBDD of products.
//! 5. **Minimization** ([`zbdd`]): subsumption-based reduction to minimal
//!    products, bounded by the configured product order.
//! 6. **Quantification** ([`probability`], [`importance`], [`uncertainty`]):
//!    rare-event / MCUB / exact-BDD probability, importance measures, and
//!    seeded Monte-Carlo sampling over the same product sets.
//!
//! All node stores are manager-centric: nodes live in index arenas owned by
//! a `Bdd`/`Zbdd`/`Pdag` manager, are shared by structural hashing, and are
//! addressed by lightweight references with a complement bit.
//!
//! ## Quick start
//!
//! ```rust
//! use scram::analysis::RiskAnalysis;
//! use scram::model::{Connective, Model};
//! use scram::settings::Settings;
//!
//! let mut model = Model::new("demo");
//! let a = model.add_basic_event("A", 0.1).unwrap();
//! let b = model.add_basic_event("B", 0.2).unwrap();
//! let top = model.add_gate("Top", Connective::Or, [a, b]).unwrap();
//! model.add_fault_tree("FT", top).unwrap();
//!
//! let mut settings = Settings::default();
//! settings.probability_analysis(true);
//!
//! let results = RiskAnalysis::new(&model, &settings).run().unwrap();
//! let ft = &results.fault_trees[0];
//! assert_eq!(ft.products.len(), 2); // {A}, {B}
//! let p = ft.probability.as_ref().unwrap().value;
//! assert!((p - 0.28).abs() < 1e-12);
//! ```
//!
//! ## Determinism
//!
//! Given the same model, settings, and seed, every analysis produces
//! identical results, including product ordering. All output containers are
//! sorted sequences; hash iteration never reaches the output boundary.

pub mod analysis;
pub mod bdd;
pub mod cache;
pub mod error;
pub mod importance;
pub mod mocus;
pub mod model;
pub mod pdag;
pub mod preprocessor;
pub mod probability;
pub mod products;
pub mod reference;
pub mod settings;
pub mod solver;
pub mod table;
pub mod types;
pub mod uncertainty;
pub mod utils;
pub mod zbdd;

pub use crate::analysis::{CancelToken, RiskAnalysis};
pub use crate::error::{Error, Result};
pub use crate::model::Model;
pub use crate::settings::{Algorithm, Approximation, Settings};
