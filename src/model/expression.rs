//! The expression layer: constants, parameters, arithmetic, Boolean tests,
//! and stochastic deviates.
//!
//! Expressions live in an arena ([`ExpressionPool`]) and reference each
//! other by [`ExprId`]. Operands must exist before the expression that uses
//! them, so the expression graph itself is acyclic by construction; cycles
//! can only be introduced through late-bound [`Parameter`]s and are caught
//! by validation.
//!
//! Point evaluation ([`ExpressionPool::mean`]) resolves every deviate to its
//! distribution mean. Sampling ([`ExpressionPool::sample`]) draws each
//! deviate through its inverse CDF from uniform variates, memoizing per
//! trial so that a deviate shared by several basic events is sampled once.

use std::collections::HashMap;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use statrs::distribution::{Beta as BetaDist, ContinuousCDF, Gamma as GammaDist, LogNormal, Normal};

use crate::error::{Error, Result};

/// Index of an expression in the pool.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ExprId(pub(crate) usize);

/// Index of a parameter in the model arena.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ParameterId(pub(crate) usize);

/// Units of parameters and expressions.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Units {
    #[default]
    Unitless,
    Bool,
    Int,
    Float,
    Hours,
    InverseHours,
    Years,
    InverseYears,
    Fit,
    Demands,
}

/// A named, shareable expression variable.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub(crate) name: String,
    pub(crate) unit: Units,
    /// None until late binding completes.
    pub(crate) expression: Option<ExprId>,
}

impl Parameter {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn unit(&self) -> Units {
        self.unit
    }
    pub fn expression(&self) -> Option<ExprId> {
        self.expression
    }
}

/// An expression node.
///
/// Deviates describe distributions: their point value is the distribution
/// mean, and uncertainty analysis re-samples them each trial.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Constant(f64),
    Parameter(ParameterId),
    /// The system mission time, bound from the settings for every run.
    MissionTime,

    Neg(ExprId),
    Add(Vec<ExprId>),
    /// First operand minus the rest.
    Sub(Vec<ExprId>),
    Mul(Vec<ExprId>),
    /// First operand divided by the rest.
    Div(Vec<ExprId>),

    Not(ExprId),
    And(Vec<ExprId>),
    Or(Vec<ExprId>),
    Eq(ExprId, ExprId),
    Df(ExprId, ExprId),
    Lt(ExprId, ExprId),

    Uniform { min: ExprId, max: ExprId },
    Normal { mean: ExprId, sigma: ExprId },
    /// Mean, error factor, and confidence level of the error factor.
    Lognormal { mean: ExprId, ef: ExprId, level: ExprId },
    /// Shape and scale.
    Gamma { k: ExprId, theta: ExprId },
    Beta { alpha: ExprId, beta: ExprId },
    /// Bins of (upper boundary, weight) with an implicit lower bound of 0.
    Histogram { bins: Vec<(ExprId, ExprId)> },

    /// `P(t) = 1 - exp(-lambda t)`.
    Exponential { lambda: ExprId, time: ExprId },
    /// Unavailability with repair:
    /// `P(t) = (lambda - (lambda - (lambda+mu) gamma) exp(-(lambda+mu) t)) / (lambda+mu)`.
    Glm { gamma: ExprId, lambda: ExprId, mu: ExprId, time: ExprId },
    /// `P(t) = 1 - exp(-((t - t0)/alpha)^beta)`.
    Weibull { alpha: ExprId, beta: ExprId, t0: ExprId, time: ExprId },
}

/// Point-evaluation context.
#[derive(Debug, Clone, Copy)]
pub struct EvalCx {
    pub mission_time: f64,
}

/// One Monte-Carlo trial: a PRNG plus the per-trial memo of sampled
/// deviates.
pub struct SampleCx<'a> {
    pub cx: EvalCx,
    pub rng: &'a mut ChaCha8Rng,
    memo: HashMap<ExprId, f64>,
}

impl<'a> SampleCx<'a> {
    pub fn new(cx: EvalCx, rng: &'a mut ChaCha8Rng) -> Self {
        SampleCx { cx, rng, memo: HashMap::new() }
    }
}

/// The expression arena.
#[derive(Debug, Clone, Default)]
pub struct ExpressionPool {
    exprs: Vec<Expression>,
}

impl ExpressionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, expr: Expression) -> ExprId {
        let id = ExprId(self.exprs.len());
        self.exprs.push(expr);
        id
    }

    /// Convenience for the most common leaf.
    pub fn constant(&mut self, value: f64) -> ExprId {
        self.add(Expression::Constant(value))
    }

    pub fn get(&self, id: ExprId) -> &Expression {
        &self.exprs[id.0]
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}

impl ExpressionPool {
    /// The point value: every deviate collapses to its distribution mean.
    pub fn mean(&self, id: ExprId, params: &[Parameter], cx: &EvalCx) -> f64 {
        let mean = |id: ExprId| self.mean(id, params, cx);
        match self.get(id) {
            Expression::Constant(value) => *value,
            Expression::Parameter(p) => match params[p.0].expression {
                Some(expr) => self.mean(expr, params, cx),
                None => f64::NAN, // caught by validation
            },
            Expression::MissionTime => cx.mission_time,

            Expression::Neg(e) => -mean(*e),
            Expression::Add(args) => args.iter().map(|&e| mean(e)).sum(),
            Expression::Sub(args) => {
                let mut it = args.iter().map(|&e| mean(e));
                let first = it.next().unwrap_or(0.0);
                first - it.sum::<f64>()
            }
            Expression::Mul(args) => args.iter().map(|&e| mean(e)).product(),
            Expression::Div(args) => {
                let mut it = args.iter().map(|&e| mean(e));
                let first = it.next().unwrap_or(0.0);
                it.fold(first, |acc, v| acc / v)
            }

            Expression::Not(e) => bool_num(mean(*e) == 0.0),
            Expression::And(args) => bool_num(args.iter().all(|&e| mean(e) != 0.0)),
            Expression::Or(args) => bool_num(args.iter().any(|&e| mean(e) != 0.0)),
            Expression::Eq(a, b) => bool_num(mean(*a) == mean(*b)),
            Expression::Df(a, b) => bool_num(mean(*a) != mean(*b)),
            Expression::Lt(a, b) => bool_num(mean(*a) < mean(*b)),

            Expression::Uniform { min, max } => (mean(*min) + mean(*max)) / 2.0,
            Expression::Normal { mean: m, .. } => mean(*m),
            Expression::Lognormal { mean: m, .. } => mean(*m),
            Expression::Gamma { k, theta } => mean(*k) * mean(*theta),
            Expression::Beta { alpha, beta } => {
                let a = mean(*alpha);
                let b = mean(*beta);
                a / (a + b)
            }
            Expression::Histogram { bins } => {
                let mut total_weight = 0.0;
                let mut acc = 0.0;
                let mut lower = 0.0;
                for &(bound, weight) in bins {
                    let upper = mean(bound);
                    let w = mean(weight);
                    acc += w * (lower + upper) / 2.0;
                    total_weight += w;
                    lower = upper;
                }
                acc / total_weight
            }

            Expression::Exponential { lambda, time } => p_exponential(mean(*lambda), mean(*time)),
            Expression::Glm { gamma, lambda, mu, time } => {
                p_glm(mean(*gamma), mean(*lambda), mean(*mu), mean(*time))
            }
            Expression::Weibull { alpha, beta, t0, time } => {
                p_weibull(mean(*alpha), mean(*beta), mean(*t0), mean(*time))
            }
        }
    }

    /// True if the value of this expression varies between samples.
    pub fn is_deviate(&self, id: ExprId, params: &[Parameter]) -> bool {
        let rec = |e: ExprId| self.is_deviate(e, params);
        match self.get(id) {
            Expression::Constant(_) | Expression::MissionTime => false,
            Expression::Parameter(p) => match params[p.0].expression {
                Some(expr) => rec(expr),
                None => false,
            },
            Expression::Uniform { .. }
            | Expression::Normal { .. }
            | Expression::Lognormal { .. }
            | Expression::Gamma { .. }
            | Expression::Beta { .. }
            | Expression::Histogram { .. } => true,
            Expression::Neg(e) | Expression::Not(e) => rec(*e),
            Expression::Add(args)
            | Expression::Sub(args)
            | Expression::Mul(args)
            | Expression::Div(args)
            | Expression::And(args)
            | Expression::Or(args) => args.iter().any(|&e| rec(e)),
            Expression::Eq(a, b) | Expression::Df(a, b) | Expression::Lt(a, b) => {
                rec(*a) || rec(*b)
            }
            Expression::Exponential { lambda, time } => rec(*lambda) || rec(*time),
            Expression::Glm { gamma, lambda, mu, time } => {
                rec(*gamma) || rec(*lambda) || rec(*mu) || rec(*time)
            }
            Expression::Weibull { alpha, beta, t0, time } => {
                rec(*alpha) || rec(*beta) || rec(*t0) || rec(*time)
            }
        }
    }

    /// Draws one sample. Deviate nodes are memoized within the trial.
    pub fn sample(&self, id: ExprId, params: &[Parameter], trial: &mut SampleCx) -> Result<f64> {
        if let Some(&value) = trial.memo.get(&id) {
            return Ok(value);
        }
        let value = match self.get(id).clone() {
            Expression::Constant(value) => value,
            Expression::Parameter(p) => match params[p.0].expression {
                Some(expr) => self.sample(expr, params, trial)?,
                None => {
                    return Err(Error::Logic(format!(
                        "unbound parameter '{}' escaped validation",
                        params[p.0].name
                    )))
                }
            },
            Expression::MissionTime => trial.cx.mission_time,

            Expression::Neg(e) => -self.sample(e, params, trial)?,
            Expression::Add(args) => self.sample_fold(&args, params, trial, 0.0, |a, v| a + v)?,
            Expression::Sub(args) => self.sample_first_fold(&args, params, trial, |a, v| a - v)?,
            Expression::Mul(args) => self.sample_fold(&args, params, trial, 1.0, |a, v| a * v)?,
            Expression::Div(args) => self.sample_first_fold(&args, params, trial, |a, v| a / v)?,

            Expression::Not(e) => bool_num(self.sample(e, params, trial)? == 0.0),
            Expression::And(args) => {
                let mut all = true;
                for e in args {
                    all &= self.sample(e, params, trial)? != 0.0;
                }
                bool_num(all)
            }
            Expression::Or(args) => {
                let mut any = false;
                for e in args {
                    any |= self.sample(e, params, trial)? != 0.0;
                }
                bool_num(any)
            }
            Expression::Eq(a, b) => {
                bool_num(self.sample(a, params, trial)? == self.sample(b, params, trial)?)
            }
            Expression::Df(a, b) => {
                bool_num(self.sample(a, params, trial)? != self.sample(b, params, trial)?)
            }
            Expression::Lt(a, b) => {
                bool_num(self.sample(a, params, trial)? < self.sample(b, params, trial)?)
            }

            Expression::Uniform { min, max } => {
                let min = self.sample(min, params, trial)?;
                let max = self.sample(max, params, trial)?;
                let u: f64 = trial.rng.random();
                min + (max - min) * u
            }
            Expression::Normal { mean, sigma } => {
                let mean = self.sample(mean, params, trial)?;
                let sigma = self.sample(sigma, params, trial)?;
                let dist = Normal::new(mean, sigma).map_err(invalid_distribution)?;
                dist.inverse_cdf(trial.rng.random())
            }
            Expression::Lognormal { mean, ef, level } => {
                let mean = self.sample(mean, params, trial)?;
                let ef = self.sample(ef, params, trial)?;
                let level = self.sample(level, params, trial)?;
                let (mu, sigma) = lognormal_params(mean, ef, level)?;
                let dist = LogNormal::new(mu, sigma).map_err(invalid_distribution)?;
                dist.inverse_cdf(trial.rng.random())
            }
            Expression::Gamma { k, theta } => {
                let k = self.sample(k, params, trial)?;
                let theta = self.sample(theta, params, trial)?;
                let dist = GammaDist::new(k, 1.0 / theta).map_err(invalid_distribution)?;
                dist.inverse_cdf(trial.rng.random())
            }
            Expression::Beta { alpha, beta } => {
                let alpha = self.sample(alpha, params, trial)?;
                let beta = self.sample(beta, params, trial)?;
                let dist = BetaDist::new(alpha, beta).map_err(invalid_distribution)?;
                dist.inverse_cdf(trial.rng.random())
            }
            Expression::Histogram { bins } => {
                let mut uppers = Vec::with_capacity(bins.len());
                let mut weights = Vec::with_capacity(bins.len());
                for (bound, weight) in &bins {
                    uppers.push(self.sample(*bound, params, trial)?);
                    weights.push(self.sample(*weight, params, trial)?);
                }
                let total: f64 = weights.iter().sum();
                let mut pick = trial.rng.random::<f64>() * total;
                let mut lower = 0.0;
                let mut value = uppers[uppers.len() - 1];
                for (i, &upper) in uppers.iter().enumerate() {
                    if pick < weights[i] {
                        value = lower + (upper - lower) * trial.rng.random::<f64>();
                        break;
                    }
                    pick -= weights[i];
                    lower = upper;
                }
                value
            }

            Expression::Exponential { lambda, time } => {
                p_exponential(self.sample(lambda, params, trial)?, self.sample(time, params, trial)?)
            }
            Expression::Glm { gamma, lambda, mu, time } => p_glm(
                self.sample(gamma, params, trial)?,
                self.sample(lambda, params, trial)?,
                self.sample(mu, params, trial)?,
                self.sample(time, params, trial)?,
            ),
            Expression::Weibull { alpha, beta, t0, time } => p_weibull(
                self.sample(alpha, params, trial)?,
                self.sample(beta, params, trial)?,
                self.sample(t0, params, trial)?,
                self.sample(time, params, trial)?,
            ),
        };
        if self.is_deviate(id, params) {
            trial.memo.insert(id, value);
        }
        Ok(value)
    }

    fn sample_fold(
        &self,
        args: &[ExprId],
        params: &[Parameter],
        trial: &mut SampleCx,
        init: f64,
        fold: impl Fn(f64, f64) -> f64,
    ) -> Result<f64> {
        let mut acc = init;
        for &e in args {
            acc = fold(acc, self.sample(e, params, trial)?);
        }
        Ok(acc)
    }

    fn sample_first_fold(
        &self,
        args: &[ExprId],
        params: &[Parameter],
        trial: &mut SampleCx,
        fold: impl Fn(f64, f64) -> f64,
    ) -> Result<f64> {
        let mut acc = 0.0;
        for (i, &e) in args.iter().enumerate() {
            let v = self.sample(e, params, trial)?;
            acc = if i == 0 { v } else { fold(acc, v) };
        }
        Ok(acc)
    }

    /// Collects the parameters directly or transitively referenced by an
    /// expression, for cycle detection.
    pub fn collect_params(&self, id: ExprId, out: &mut Vec<ParameterId>) {
        match self.get(id) {
            Expression::Constant(_) | Expression::MissionTime => {}
            Expression::Parameter(p) => out.push(*p),
            Expression::Neg(e) | Expression::Not(e) => self.collect_params(*e, out),
            Expression::Add(args)
            | Expression::Sub(args)
            | Expression::Mul(args)
            | Expression::Div(args)
            | Expression::And(args)
            | Expression::Or(args) => {
                for &e in args {
                    self.collect_params(e, out);
                }
            }
            Expression::Eq(a, b) | Expression::Df(a, b) | Expression::Lt(a, b) => {
                self.collect_params(*a, out);
                self.collect_params(*b, out);
            }
            Expression::Uniform { min: a, max: b }
            | Expression::Normal { mean: a, sigma: b }
            | Expression::Gamma { k: a, theta: b }
            | Expression::Beta { alpha: a, beta: b }
            | Expression::Exponential { lambda: a, time: b } => {
                self.collect_params(*a, out);
                self.collect_params(*b, out);
            }
            Expression::Lognormal { mean, ef, level } => {
                self.collect_params(*mean, out);
                self.collect_params(*ef, out);
                self.collect_params(*level, out);
            }
            Expression::Histogram { bins } => {
                for &(bound, weight) in bins {
                    self.collect_params(bound, out);
                    self.collect_params(weight, out);
                }
            }
            Expression::Glm { gamma, lambda, mu, time } => {
                self.collect_params(*gamma, out);
                self.collect_params(*lambda, out);
                self.collect_params(*mu, out);
                self.collect_params(*time, out);
            }
            Expression::Weibull { alpha, beta, t0, time } => {
                self.collect_params(*alpha, out);
                self.collect_params(*beta, out);
                self.collect_params(*t0, out);
                self.collect_params(*time, out);
            }
        }
    }

    /// Domain checks per node. Returns one message per violation.
    pub fn validate(&self, id: ExprId, params: &[Parameter], cx: &EvalCx, errors: &mut Vec<String>) {
        let mean = |e: ExprId| self.mean(e, params, cx);
        match self.get(id) {
            Expression::Div(args) => {
                for &e in args.iter().skip(1) {
                    if mean(e) == 0.0 {
                        errors.push("division by an expression with zero value".to_string());
                    }
                }
            }
            Expression::Uniform { min, max } => {
                if mean(*min) >= mean(*max) {
                    errors.push("uniform deviate requires min < max".to_string());
                }
            }
            Expression::Normal { sigma, .. } => {
                if mean(*sigma) <= 0.0 {
                    errors.push("normal deviate requires sigma > 0".to_string());
                }
            }
            Expression::Lognormal { mean: m, ef, level } => {
                if mean(*m) <= 0.0 {
                    errors.push("lognormal deviate requires mean > 0".to_string());
                }
                if mean(*ef) <= 1.0 {
                    errors.push("lognormal deviate requires an error factor > 1".to_string());
                }
                let level = mean(*level);
                if !(0.0..1.0).contains(&level) || level == 0.0 {
                    errors.push("lognormal confidence level must be in (0, 1)".to_string());
                }
            }
            Expression::Gamma { k, theta } => {
                if mean(*k) <= 0.0 || mean(*theta) <= 0.0 {
                    errors.push("gamma deviate requires k > 0 and theta > 0".to_string());
                }
            }
            Expression::Beta { alpha, beta } => {
                if mean(*alpha) <= 0.0 || mean(*beta) <= 0.0 {
                    errors.push("beta deviate requires alpha > 0 and beta > 0".to_string());
                }
            }
            Expression::Histogram { bins } => {
                if bins.is_empty() {
                    errors.push("histogram requires at least one bin".to_string());
                }
                let mut lower = 0.0;
                let mut total = 0.0;
                for &(bound, weight) in bins {
                    let upper = mean(bound);
                    if upper <= lower {
                        errors.push("histogram boundaries must be positive and ascending".to_string());
                    }
                    let w = mean(weight);
                    if w < 0.0 {
                        errors.push("histogram weights must be non-negative".to_string());
                    }
                    total += w;
                    lower = upper;
                }
                if !bins.is_empty() && total <= 0.0 {
                    errors.push("histogram weights must not all be zero".to_string());
                }
            }
            Expression::Exponential { lambda, time } => {
                if mean(*lambda) < 0.0 {
                    errors.push("exponential rate must be non-negative".to_string());
                }
                if mean(*time) < 0.0 {
                    errors.push("exponential time must be non-negative".to_string());
                }
            }
            Expression::Glm { gamma, lambda, mu, time } => {
                let g = mean(*gamma);
                if !(0.0..=1.0).contains(&g) {
                    errors.push("GLM gamma must be within [0, 1]".to_string());
                }
                if mean(*lambda) < 0.0 || mean(*mu) < 0.0 || mean(*time) < 0.0 {
                    errors.push("GLM rates and time must be non-negative".to_string());
                }
                if mean(*lambda) + mean(*mu) <= 0.0 {
                    errors.push("GLM requires lambda + mu > 0".to_string());
                }
            }
            Expression::Weibull { alpha, beta, t0, time } => {
                if mean(*alpha) <= 0.0 || mean(*beta) <= 0.0 {
                    errors.push("Weibull requires alpha > 0 and beta > 0".to_string());
                }
                if mean(*t0) < 0.0 || mean(*time) < 0.0 {
                    errors.push("Weibull times must be non-negative".to_string());
                }
            }
            _ => {}
        }
        // Recurse into operands.
        let mut children = Vec::new();
        collect_children(self.get(id), &mut children);
        for child in children {
            self.validate(child, params, cx, errors);
        }
    }
}

fn collect_children(expr: &Expression, out: &mut Vec<ExprId>) {
    match expr {
        Expression::Constant(_) | Expression::Parameter(_) | Expression::MissionTime => {}
        Expression::Neg(e) | Expression::Not(e) => out.push(*e),
        Expression::Add(args)
        | Expression::Sub(args)
        | Expression::Mul(args)
        | Expression::Div(args)
        | Expression::And(args)
        | Expression::Or(args) => out.extend_from_slice(args),
        Expression::Eq(a, b) | Expression::Df(a, b) | Expression::Lt(a, b) => {
            out.push(*a);
            out.push(*b);
        }
        Expression::Uniform { min: a, max: b }
        | Expression::Normal { mean: a, sigma: b }
        | Expression::Gamma { k: a, theta: b }
        | Expression::Beta { alpha: a, beta: b }
        | Expression::Exponential { lambda: a, time: b } => {
            out.push(*a);
            out.push(*b);
        }
        Expression::Lognormal { mean, ef, level } => out.extend([*mean, *ef, *level]),
        Expression::Histogram { bins } => {
            for &(bound, weight) in bins {
                out.push(bound);
                out.push(weight);
            }
        }
        Expression::Glm { gamma, lambda, mu, time } => out.extend([*gamma, *lambda, *mu, *time]),
        Expression::Weibull { alpha, beta, t0, time } => out.extend([*alpha, *beta, *t0, *time]),
    }
}

fn bool_num(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn p_exponential(lambda: f64, time: f64) -> f64 {
    1.0 - (-lambda * time).exp()
}

fn p_glm(gamma: f64, lambda: f64, mu: f64, time: f64) -> f64 {
    let rate = lambda + mu;
    (lambda - (lambda - rate * gamma) * (-rate * time).exp()) / rate
}

fn p_weibull(alpha: f64, beta: f64, t0: f64, time: f64) -> f64 {
    if time <= t0 {
        return 0.0;
    }
    1.0 - (-((time - t0) / alpha).powf(beta)).exp()
}

/// Location and scale of a lognormal given its mean, error factor, and the
/// confidence level of the error factor.
fn lognormal_params(mean: f64, ef: f64, level: f64) -> Result<(f64, f64)> {
    let standard = Normal::new(0.0, 1.0).map_err(invalid_distribution)?;
    let z = standard.inverse_cdf((1.0 + level) / 2.0);
    let sigma = ef.ln() / z;
    let mu = mean.ln() - sigma * sigma / 2.0;
    Ok((mu, sigma))
}

fn invalid_distribution<E: std::fmt::Display>(err: E) -> Error {
    Error::Logic(format!("invalid distribution parameters escaped validation: {}", err))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn cx() -> EvalCx {
        EvalCx { mission_time: 10.0 }
    }

    #[test]
    fn test_constant_arithmetic() {
        let mut pool = ExpressionPool::new();
        let two = pool.constant(2.0);
        let three = pool.constant(3.0);
        let sum = pool.add(Expression::Add(vec![two, three]));
        let diff = pool.add(Expression::Sub(vec![sum, two]));
        let ratio = pool.add(Expression::Div(vec![diff, three]));
        assert_eq!(pool.mean(sum, &[], &cx()), 5.0);
        assert_eq!(pool.mean(diff, &[], &cx()), 3.0);
        assert_eq!(pool.mean(ratio, &[], &cx()), 1.0);
    }

    #[test]
    fn test_mission_time() {
        let mut pool = ExpressionPool::new();
        let mt = pool.add(Expression::MissionTime);
        assert_eq!(pool.mean(mt, &[], &cx()), 10.0);
    }

    #[test]
    fn test_exponential() {
        let mut pool = ExpressionPool::new();
        let lambda = pool.constant(0.1);
        let time = pool.add(Expression::MissionTime);
        let p = pool.add(Expression::Exponential { lambda, time });
        let expected = 1.0 - (-1.0f64).exp();
        assert!((pool.mean(p, &[], &cx()) - expected).abs() < 1e-12);
        assert!(!pool.is_deviate(p, &[]));
    }

    #[test]
    fn test_deviate_means() {
        let mut pool = ExpressionPool::new();
        let min = pool.constant(0.0);
        let max = pool.constant(1.0);
        let uniform = pool.add(Expression::Uniform { min, max });
        assert_eq!(pool.mean(uniform, &[], &cx()), 0.5);
        assert!(pool.is_deviate(uniform, &[]));

        let k = pool.constant(2.0);
        let theta = pool.constant(3.0);
        let gamma = pool.add(Expression::Gamma { k, theta });
        assert_eq!(pool.mean(gamma, &[], &cx()), 6.0);

        let alpha = pool.constant(1.0);
        let beta = pool.constant(3.0);
        let b = pool.add(Expression::Beta { alpha, beta });
        assert_eq!(pool.mean(b, &[], &cx()), 0.25);
    }

    #[test]
    fn test_parameter_resolution() {
        let mut pool = ExpressionPool::new();
        let half = pool.constant(0.5);
        let params = vec![Parameter {
            name: "p".to_string(),
            unit: Units::Float,
            expression: Some(half),
        }];
        let p_ref = pool.add(Expression::Parameter(ParameterId(0)));
        assert_eq!(pool.mean(p_ref, &params, &cx()), 0.5);

        let mut refs = Vec::new();
        pool.collect_params(p_ref, &mut refs);
        assert_eq!(refs, vec![ParameterId(0)]);
    }

    #[test]
    fn test_sampling_determinism() {
        let mut pool = ExpressionPool::new();
        let mean = pool.constant(5.0);
        let sigma = pool.constant(1.0);
        let normal = pool.add(Expression::Normal { mean, sigma });

        let mut rng1 = ChaCha8Rng::seed_from_u64(42);
        let mut trial1 = SampleCx::new(cx(), &mut rng1);
        let v1 = pool.sample(normal, &[], &mut trial1).unwrap();

        let mut rng2 = ChaCha8Rng::seed_from_u64(42);
        let mut trial2 = SampleCx::new(cx(), &mut rng2);
        let v2 = pool.sample(normal, &[], &mut trial2).unwrap();

        assert_eq!(v1, v2);

        // Within one trial, a shared deviate is sampled once.
        let again = pool.sample(normal, &[], &mut trial2).unwrap();
        assert_eq!(v2, again);
    }

    #[test]
    fn test_validation_catches_domains() {
        let mut pool = ExpressionPool::new();
        let one = pool.constant(1.0);
        let zero = pool.constant(0.0);
        let bad_uniform = pool.add(Expression::Uniform { min: one, max: zero });
        let mut errors = Vec::new();
        pool.validate(bad_uniform, &[], &cx(), &mut errors);
        assert_eq!(errors.len(), 1);

        let bad_div = pool.add(Expression::Div(vec![one, zero]));
        let mut errors = Vec::new();
        pool.validate(bad_div, &[], &cx(), &mut errors);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_histogram_mean() {
        let mut pool = ExpressionPool::new();
        let b1 = pool.constant(2.0);
        let w1 = pool.constant(1.0);
        let b2 = pool.constant(4.0);
        let w2 = pool.constant(3.0);
        let hist = pool.add(Expression::Histogram { bins: vec![(b1, w1), (b2, w2)] });
        // (1*1 + 3*3) / 4 = 2.5
        assert_eq!(pool.mean(hist, &[], &cx()), 2.5);
    }
}
