//! Analysis configuration.
//!
//! [`Settings`] is the single knob surface of the engine. Every setter
//! validates its argument, and [`Settings::validate`] checks cross-option
//! consistency before an analysis run. An invalid combination is a
//! [`Error::Settings`], never a panic.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Qualitative analysis algorithm (the cut-set engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Binary Decision Diagram with complement edges.
    Bdd,
    /// Zero-suppressed BDD built directly from the PDAG.
    Zbdd,
    /// Top-down candidate expansion (the classical cut-set method).
    Mocus,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Bdd => "bdd",
            Algorithm::Zbdd => "zbdd",
            Algorithm::Mocus => "mocus",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bdd" => Ok(Algorithm::Bdd),
            "zbdd" => Ok(Algorithm::Zbdd),
            "mocus" => Ok(Algorithm::Mocus),
            _ => Err(Error::Settings(format!("unknown algorithm '{}'", s))),
        }
    }
}

/// Probability calculation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Approximation {
    /// Exact probability by Shannon expansion over the BDD.
    None,
    /// First term of inclusion-exclusion: the sum of product probabilities.
    RareEvent,
    /// Min-cut upper bound: `1 - prod(1 - P(product))`.
    Mcub,
}

impl fmt::Display for Approximation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Approximation::None => "none",
            Approximation::RareEvent => "rare-event",
            Approximation::Mcub => "mcub",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Approximation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Approximation::None),
            "rare-event" => Ok(Approximation::RareEvent),
            "mcub" => Ok(Approximation::Mcub),
            _ => Err(Error::Settings(format!("unknown approximation '{}'", s))),
        }
    }
}

/// All options recognized by the engine and their effects.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    algorithm: Algorithm,
    approximation: Approximation,
    prime_implicants: bool,
    limit_order: usize,
    cut_off: f64,
    mission_time: f64,
    trials: usize,
    seed: u64,
    probability_analysis: bool,
    importance_analysis: bool,
    uncertainty_analysis: bool,
    ccf_analysis: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            algorithm: Algorithm::Bdd,
            approximation: Approximation::None,
            prime_implicants: false,
            limit_order: 0, // unlimited
            cut_off: 0.0,
            mission_time: 8760.0,
            trials: 1000,
            seed: 0,
            probability_analysis: false,
            importance_analysis: false,
            uncertainty_analysis: false,
            ccf_analysis: false,
        }
    }
}

impl Settings {
    pub fn algorithm(&mut self, algorithm: Algorithm) -> &mut Self {
        self.algorithm = algorithm;
        self
    }

    pub fn approximation(&mut self, approximation: Approximation) -> &mut Self {
        self.approximation = approximation;
        self
    }

    /// Requests minimal prime implicants instead of minimal cut sets.
    ///
    /// Prime implicants keep complemented literals, so they are only
    /// available with the BDD algorithm and exact probability.
    pub fn prime_implicants(&mut self, flag: bool) -> &mut Self {
        self.prime_implicants = flag;
        self
    }

    /// Upper bound on product size; 0 means unlimited.
    pub fn limit_order(&mut self, limit: usize) -> &mut Self {
        self.limit_order = limit;
        self
    }

    /// Discards products with probability below this threshold during
    /// quantification.
    pub fn cut_off(&mut self, cut_off: f64) -> Result<&mut Self> {
        if !(0.0..=1.0).contains(&cut_off) {
            return Err(Error::Settings(format!(
                "cut-off {} is not within [0, 1]",
                cut_off
            )));
        }
        self.cut_off = cut_off;
        Ok(self)
    }

    /// System mission time in hours.
    pub fn mission_time(&mut self, time: f64) -> Result<&mut Self> {
        if !time.is_finite() || time < 0.0 {
            return Err(Error::Settings(format!(
                "mission time {} is not a non-negative number",
                time
            )));
        }
        self.mission_time = time;
        Ok(self)
    }

    /// Number of Monte-Carlo trials.
    pub fn trials(&mut self, trials: usize) -> Result<&mut Self> {
        if trials == 0 {
            return Err(Error::Settings("the number of trials must be >= 1".to_string()));
        }
        self.trials = trials;
        Ok(self)
    }

    /// PRNG seed; identical seeds yield identical outputs.
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = seed;
        self
    }

    pub fn probability_analysis(&mut self, flag: bool) -> &mut Self {
        self.probability_analysis = flag;
        self
    }

    /// Importance analysis implies probability analysis.
    pub fn importance_analysis(&mut self, flag: bool) -> &mut Self {
        self.importance_analysis = flag;
        if flag {
            self.probability_analysis = true;
        }
        self
    }

    pub fn uncertainty_analysis(&mut self, flag: bool) -> &mut Self {
        self.uncertainty_analysis = flag;
        if flag {
            self.probability_analysis = true;
        }
        self
    }

    pub fn ccf_analysis(&mut self, flag: bool) -> &mut Self {
        self.ccf_analysis = flag;
        self
    }
}

impl Settings {
    pub fn get_algorithm(&self) -> Algorithm {
        self.algorithm
    }
    pub fn get_approximation(&self) -> Approximation {
        self.approximation
    }
    pub fn is_prime_implicants(&self) -> bool {
        self.prime_implicants
    }
    pub fn get_limit_order(&self) -> usize {
        self.limit_order
    }
    pub fn get_cut_off(&self) -> f64 {
        self.cut_off
    }
    pub fn get_mission_time(&self) -> f64 {
        self.mission_time
    }
    pub fn get_trials(&self) -> usize {
        self.trials
    }
    pub fn get_seed(&self) -> u64 {
        self.seed
    }
    pub fn is_probability_analysis(&self) -> bool {
        self.probability_analysis
    }
    pub fn is_importance_analysis(&self) -> bool {
        self.importance_analysis
    }
    pub fn is_uncertainty_analysis(&self) -> bool {
        self.uncertainty_analysis
    }
    pub fn is_ccf_analysis(&self) -> bool {
        self.ccf_analysis
    }

    /// Checks cross-option consistency.
    pub fn validate(&self) -> Result<()> {
        if self.prime_implicants {
            if self.algorithm != Algorithm::Bdd {
                return Err(Error::Settings(format!(
                    "prime implicants require the bdd algorithm, not {}",
                    self.algorithm
                )));
            }
            if self.approximation != Approximation::None {
                return Err(Error::Settings(format!(
                    "prime implicants require exact probability, not the {} approximation",
                    self.approximation
                )));
            }
        }
        if self.probability_analysis
            && self.approximation == Approximation::None
            && self.algorithm != Algorithm::Bdd
        {
            return Err(Error::Settings(format!(
                "exact probability requires the bdd algorithm; \
                 choose an approximation for {}",
                self.algorithm
            )));
        }
        Ok(())
    }
}
