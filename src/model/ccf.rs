//! Common-cause failure groups and their factor models.
//!
//! A CCF group couples the failures of several basic events. Before
//! analysis, the group is expanded: every relevant subset `S` of its members
//! becomes a synthetic basic event whose probability comes from the factor
//! model, and each member's references are rewritten as the OR of all
//! synthetic events containing that member. The expansion itself lives in
//! [`crate::model::Model::apply_ccf`]; this module defines the group, the
//! factor models, and their validation.

use crate::model::event::BasicEventId;
use crate::model::expression::ExprId;

/// Index of a CCF group in the model arena.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct CcfGroupId(pub(crate) usize);

/// The factor model of a CCF group.
///
/// With group size `n`, total failure probability `Q`, and `C(a, b)` the
/// binomial coefficient, the probability of a *specific* subset of size `k`
/// failing together is:
///
/// - **beta-factor**: `Q_1 = (1-beta) Q`, `Q_n = beta Q`, others zero;
/// - **MGL** with factors `pi_2..pi_m` (and `pi_1 = 1`, `pi_{k>m} = 0`):
///   `Q_k = prod(pi_1..pi_k) (1 - pi_{k+1}) Q / C(n-1, k-1)`;
/// - **alpha-factor** with factors `alpha_1..alpha_n`:
///   `Q_k = k alpha_k Q / (alpha_t C(n-1, k-1))`, `alpha_t = sum(i alpha_i)`;
/// - **phi-factor** with factors `phi_1..phi_n`, `sum(phi) = 1`:
///   `Q_k = phi_k Q / C(n-1, k-1)`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CcfModelKind {
    BetaFactor,
    Mgl,
    AlphaFactor,
    PhiFactor,
}

/// A group of basic events failing from a shared cause.
#[derive(Debug, Clone)]
pub struct CcfGroup {
    pub(crate) name: String,
    pub(crate) kind: CcfModelKind,
    pub(crate) members: Vec<BasicEventId>,
    /// The total failure probability `Q` of one member.
    pub(crate) distribution: Option<ExprId>,
    /// `(level, factor)` pairs.
    pub(crate) factors: Vec<(usize, ExprId)>,
}

impl CcfGroup {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn kind(&self) -> CcfModelKind {
        self.kind
    }
    pub fn members(&self) -> &[BasicEventId] {
        &self.members
    }

    /// Structural checks; factor-value checks need expression evaluation and
    /// happen in model validation.
    pub(crate) fn validate_structure(&self, errors: &mut Vec<String>) {
        let n = self.members.len();
        if n < 2 {
            errors.push(format!("CCF group {} must have at least 2 members", self.name));
        }
        let mut sorted = self.members.clone();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != n {
            errors.push(format!("CCF group {} has duplicate members", self.name));
        }
        if self.distribution.is_none() {
            errors.push(format!("CCF group {} is missing its distribution", self.name));
        }

        let mut levels: Vec<usize> = self.factors.iter().map(|&(level, _)| level).collect();
        levels.sort_unstable();
        if levels.windows(2).any(|w| w[0] == w[1]) {
            errors.push(format!("CCF group {} has duplicate factor levels", self.name));
        }
        match self.kind {
            CcfModelKind::BetaFactor => {
                if self.factors.len() != 1 {
                    errors.push(format!(
                        "beta-factor group {} takes exactly one factor",
                        self.name
                    ));
                }
            }
            CcfModelKind::Mgl => {
                // Contiguous levels starting at 2.
                for (i, &level) in levels.iter().enumerate() {
                    if level != i + 2 {
                        errors.push(format!(
                            "MGL group {} factor levels must be contiguous from 2",
                            self.name
                        ));
                        break;
                    }
                }
                if levels.len() > n.saturating_sub(1) {
                    errors.push(format!("MGL group {} has more factors than members allow", self.name));
                }
            }
            CcfModelKind::AlphaFactor | CcfModelKind::PhiFactor => {
                if levels != (1..=n).collect::<Vec<_>>() {
                    errors.push(format!(
                        "{} group {} requires factors for every level 1..={}",
                        match self.kind {
                            CcfModelKind::AlphaFactor => "alpha-factor",
                            _ => "phi-factor",
                        },
                        self.name,
                        n
                    ));
                }
            }
        }
    }
}

/// Binomial coefficient as a float; factor formulas divide by it.
pub(crate) fn binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    let mut result = 1.0;
    for i in 0..k {
        result = result * (n - i) as f64 / (i + 1) as f64;
    }
    result
}

/// All size-`k` subsets of `items`, in lexicographic index order.
pub(crate) fn subsets_of_size<T: Copy>(items: &[T], k: usize) -> Vec<Vec<T>> {
    let mut result = Vec::new();
    let mut current = Vec::with_capacity(k);
    fn rec<T: Copy>(items: &[T], k: usize, start: usize, current: &mut Vec<T>, out: &mut Vec<Vec<T>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        let needed = k - current.len();
        for i in start..=items.len().saturating_sub(needed) {
            current.push(items[i]);
            rec(items, k, i + 1, current, out);
            current.pop();
        }
    }
    if k > 0 && k <= items.len() {
        rec(items, k, 0, &mut current, &mut result);
    }
    result
}
