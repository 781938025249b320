//! The symbolic model: the contract between the input layer and the engine.
//!
//! A [`Model`] owns typed arenas of gates, basic events, house events,
//! parameters, expressions, CCF groups, and fault trees. Event ids are
//! case-insensitively unique; parameters are case-sensitive. Gates and
//! parameters support late binding (`declare_*` then `set_*`), which is what
//! makes reference cycles possible and why validation checks for them.
//!
//! Validation aggregates every finding for a model into one
//! [`Error::Validation`] message instead of failing on the first problem.

pub mod ccf;
pub mod event;
pub mod expression;

use std::collections::{HashMap, HashSet};

pub use self::ccf::{CcfGroup, CcfGroupId, CcfModelKind};
pub use self::event::{
    Arg, BasicEvent, BasicEventId, Connective, EventFlavor, EventRef, FaultTree, Gate, GateId,
    HouseEvent, HouseEventId,
};
pub use self::expression::{
    EvalCx, ExprId, Expression, ExpressionPool, Parameter, ParameterId, SampleCx, Units,
};

use crate::error::{Error, Result};
use crate::model::ccf::{binomial, subsets_of_size};

/// The in-memory symbolic model.
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    basic_events: Vec<BasicEvent>,
    house_events: Vec<HouseEvent>,
    gates: Vec<Gate>,
    parameters: Vec<Parameter>,
    ccf_groups: Vec<CcfGroup>,
    fault_trees: Vec<FaultTree>,
    pool: ExpressionPool,
    /// Lowercased event id -> event; ids are case-insensitively unique.
    event_index: HashMap<String, EventRef>,
    /// Parameter names are case-sensitive.
    param_index: HashMap<String, ParameterId>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Model {
            name: name.into(),
            basic_events: Vec::new(),
            house_events: Vec::new(),
            gates: Vec::new(),
            parameters: Vec::new(),
            ccf_groups: Vec::new(),
            fault_trees: Vec::new(),
            pool: ExpressionPool::new(),
            event_index: HashMap::new(),
            param_index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn register_event(&mut self, name: &str, event: EventRef) -> Result<()> {
        let key = name.to_lowercase();
        if let Some(existing) = self.event_index.get(&key) {
            let kind = match existing {
                EventRef::Gate(_) => "a gate",
                EventRef::Basic(_) => "a basic event",
                EventRef::House(_) => "a house event",
            };
            return Err(Error::Validation(format!(
                "the id {} is already assigned to {}",
                name, kind
            )));
        }
        self.event_index.insert(key, event);
        Ok(())
    }

    /// Looks up any event by its case-insensitive id.
    pub fn by_name(&self, name: &str) -> Option<EventRef> {
        self.event_index.get(&name.to_lowercase()).copied()
    }
}

// Expressions and parameters.
impl Model {
    pub fn add_expression(&mut self, expr: Expression) -> ExprId {
        self.pool.add(expr)
    }

    pub fn constant(&mut self, value: f64) -> ExprId {
        self.pool.constant(value)
    }

    pub fn exprs(&self) -> &ExpressionPool {
        &self.pool
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Declares a parameter for late binding.
    pub fn declare_parameter(&mut self, name: impl Into<String>, unit: Units) -> Result<ParameterId> {
        let name = name.into();
        if self.param_index.contains_key(&name) {
            return Err(Error::Validation(format!(
                "the {} parameter is doubly defined",
                name
            )));
        }
        let id = ParameterId(self.parameters.len());
        self.parameters.push(Parameter { name: name.clone(), unit, expression: None });
        self.param_index.insert(name, id);
        Ok(id)
    }

    pub fn set_parameter_expression(&mut self, id: ParameterId, expr: ExprId) -> Result<()> {
        let param = &mut self.parameters[id.0];
        if param.expression.is_some() {
            return Err(Error::Validation(format!(
                "the {} parameter expression is already set",
                param.name
            )));
        }
        param.expression = Some(expr);
        Ok(())
    }

    pub fn add_parameter(
        &mut self,
        name: impl Into<String>,
        unit: Units,
        expr: ExprId,
    ) -> Result<ParameterId> {
        let id = self.declare_parameter(name, unit)?;
        self.set_parameter_expression(id, expr)?;
        Ok(id)
    }
}

// Events.
impl Model {
    /// Adds a basic event with a constant probability.
    pub fn add_basic_event(&mut self, name: impl Into<String>, probability: f64) -> Result<BasicEventId> {
        let expr = self.pool.constant(probability);
        self.add_basic_event_expr(name, expr)
    }

    /// Adds a basic event with an arbitrary probability expression.
    pub fn add_basic_event_expr(
        &mut self,
        name: impl Into<String>,
        expr: ExprId,
    ) -> Result<BasicEventId> {
        self.define_basic_event(name.into(), Some(expr), EventFlavor::Basic)
    }

    pub fn add_basic_event_with_flavor(
        &mut self,
        name: impl Into<String>,
        expr: ExprId,
        flavor: EventFlavor,
    ) -> Result<BasicEventId> {
        self.define_basic_event(name.into(), Some(expr), flavor)
    }

    /// Declares a basic event without a probability description. Analysis
    /// without probability tolerates it; quantification does not.
    pub fn declare_basic_event(&mut self, name: impl Into<String>) -> Result<BasicEventId> {
        self.define_basic_event(name.into(), None, EventFlavor::Basic)
    }

    fn define_basic_event(
        &mut self,
        name: String,
        expression: Option<ExprId>,
        flavor: EventFlavor,
    ) -> Result<BasicEventId> {
        let id = BasicEventId(self.basic_events.len());
        self.register_event(&name, id.into())?;
        self.basic_events.push(BasicEvent { name, expression, flavor, ccf_substitutes: None });
        Ok(id)
    }

    pub fn add_house_event(&mut self, name: impl Into<String>, state: bool) -> Result<HouseEventId> {
        let name = name.into();
        let id = HouseEventId(self.house_events.len());
        self.register_event(&name, id.into())?;
        self.house_events.push(HouseEvent { name, state });
        Ok(id)
    }

    pub fn basic_events(&self) -> &[BasicEvent] {
        &self.basic_events
    }
    pub fn basic_event(&self, id: BasicEventId) -> &BasicEvent {
        &self.basic_events[id.0]
    }
    pub fn house_events(&self) -> &[HouseEvent] {
        &self.house_events
    }
    pub fn house_event(&self, id: HouseEventId) -> &HouseEvent {
        &self.house_events[id.0]
    }

    /// The mean probability of a basic event.
    pub fn basic_event_probability(&self, id: BasicEventId, cx: &EvalCx) -> f64 {
        match self.basic_events[id.0].expression {
            Some(expr) => self.pool.mean(expr, &self.parameters, cx),
            None => 0.0,
        }
    }

    /// `Some(state)` if the event probability is the constant 0 or 1.
    pub fn constant_probability(&self, id: BasicEventId, cx: &EvalCx) -> Option<bool> {
        let expr = self.basic_events[id.0].expression?;
        if self.pool.is_deviate(expr, &self.parameters) {
            return None;
        }
        let mean = self.pool.mean(expr, &self.parameters, cx);
        if mean == 0.0 {
            Some(false)
        } else if mean == 1.0 {
            Some(true)
        } else {
            None
        }
    }
}

// Gates and fault trees.
impl Model {
    /// Declares a gate for late binding; its formula must be set before
    /// validation.
    pub fn declare_gate(&mut self, name: impl Into<String>) -> Result<GateId> {
        let name = name.into();
        let id = GateId(self.gates.len());
        self.register_event(&name, id.into())?;
        self.gates.push(Gate {
            name,
            connective: Connective::Null,
            min_number: None,
            args: Vec::new(),
            defined: false,
        });
        Ok(id)
    }

    /// Defines the formula of a declared gate.
    pub fn set_gate_formula(
        &mut self,
        id: GateId,
        connective: Connective,
        args: impl IntoIterator<Item = impl Into<Arg>>,
    ) -> Result<()> {
        let gate = &mut self.gates[id.0];
        if gate.defined {
            return Err(Error::Validation(format!("{} gate is doubly defined", gate.name)));
        }
        gate.connective = connective;
        gate.args = args.into_iter().map(Into::into).collect();
        gate.defined = true;
        Ok(())
    }

    pub fn add_gate(
        &mut self,
        name: impl Into<String>,
        connective: Connective,
        args: impl IntoIterator<Item = impl Into<Arg>>,
    ) -> Result<GateId> {
        let id = self.declare_gate(name)?;
        self.set_gate_formula(id, connective, args)?;
        Ok(id)
    }

    /// Adds a K-out-of-N voting gate.
    pub fn add_atleast_gate(
        &mut self,
        name: impl Into<String>,
        min_number: usize,
        args: impl IntoIterator<Item = impl Into<Arg>>,
    ) -> Result<GateId> {
        let id = self.add_gate(name, Connective::AtLeast, args)?;
        self.gates[id.0].min_number = Some(min_number);
        Ok(id)
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }
    pub fn gate(&self, id: GateId) -> &Gate {
        &self.gates[id.0]
    }

    pub fn add_fault_tree(&mut self, name: impl Into<String>, top: GateId) -> Result<()> {
        let name = name.into();
        if self.fault_trees.iter().any(|ft| ft.name.eq_ignore_ascii_case(&name)) {
            return Err(Error::Validation(format!("the fault tree {} is already defined", name)));
        }
        self.fault_trees.push(FaultTree { name, top });
        Ok(())
    }

    pub fn fault_trees(&self) -> &[FaultTree] {
        &self.fault_trees
    }
}

// CCF groups.
impl Model {
    pub fn add_ccf_group(
        &mut self,
        name: impl Into<String>,
        kind: CcfModelKind,
        members: Vec<BasicEventId>,
        distribution: ExprId,
        factors: Vec<(usize, ExprId)>,
    ) -> Result<CcfGroupId> {
        let name = name.into();
        if self.ccf_groups.iter().any(|g| g.name.eq_ignore_ascii_case(&name)) {
            return Err(Error::Validation(format!("the CCF group {} is already defined", name)));
        }
        let id = CcfGroupId(self.ccf_groups.len());
        // Without CCF analysis, a member's probability is the group's total
        // failure probability.
        for &member in &members {
            let event = &mut self.basic_events[member.0];
            if event.expression.is_none() {
                event.expression = Some(distribution);
            }
        }
        self.ccf_groups.push(CcfGroup {
            name,
            kind,
            members,
            distribution: Some(distribution),
            factors,
        });
        Ok(id)
    }

    pub fn ccf_groups(&self) -> &[CcfGroup] {
        &self.ccf_groups
    }

    /// Expands every CCF group into synthetic basic events (§ the factor
    /// model formulas on [`CcfModelKind`]) and records, per member, the
    /// substitute events that the PDAG builder ORs together.
    ///
    /// Levels whose coefficient evaluates to zero produce no events, so a
    /// beta-factor group with `beta = 0` degenerates to the independent
    /// events themselves.
    pub fn apply_ccf(&mut self, cx: &EvalCx) -> Result<()> {
        for index in 0..self.ccf_groups.len() {
            let group = self.ccf_groups[index].clone();
            let n = group.members.len();
            let q = group.distribution.ok_or_else(|| {
                Error::Logic(format!("CCF group {} without distribution escaped validation", group.name))
            })?;

            let mut substitutes: HashMap<BasicEventId, Vec<BasicEventId>> = HashMap::new();
            for k in 1..=n {
                let coeff = match self.ccf_level_coefficient(&group, k) {
                    Some(coeff) => coeff,
                    None => continue,
                };
                if self.pool.mean(coeff, &self.parameters, cx) == 0.0 {
                    continue;
                }
                let q_k = self.pool.add(Expression::Mul(vec![coeff, q]));
                if k == 1 {
                    for &member in &group.members {
                        self.basic_events[member.0].expression = Some(q_k);
                        substitutes.entry(member).or_default().push(member);
                    }
                } else {
                    for subset in subsets_of_size(&group.members, k) {
                        let name = format!(
                            "[{}]",
                            subset
                                .iter()
                                .map(|&m| self.basic_events[m.0].name.clone())
                                .collect::<Vec<_>>()
                                .join(" ")
                        );
                        let synthetic = self.define_basic_event(name, Some(q_k), EventFlavor::Basic)?;
                        for &member in &subset {
                            substitutes.entry(member).or_default().push(synthetic);
                        }
                    }
                }
            }
            for &member in &group.members {
                let subs = substitutes.remove(&member).unwrap_or_default();
                self.basic_events[member.0].ccf_substitutes = Some(subs);
            }
        }
        Ok(())
    }

    /// The `Q_k / Q` coefficient of the factor model, or `None` when the
    /// level is structurally absent.
    fn ccf_level_coefficient(&mut self, group: &CcfGroup, k: usize) -> Option<ExprId> {
        let n = group.members.len();
        let mut factors: Vec<(usize, ExprId)> = group.factors.clone();
        factors.sort_unstable_by_key(|&(level, _)| level);
        let factor_at = |level: usize| -> Option<ExprId> {
            factors.iter().find(|&&(l, _)| l == level).map(|&(_, f)| f)
        };

        match group.kind {
            CcfModelKind::BetaFactor => {
                let beta = factors.first().map(|&(_, f)| f)?;
                if k == 1 {
                    let one = self.pool.constant(1.0);
                    Some(self.pool.add(Expression::Sub(vec![one, beta])))
                } else if k == n {
                    Some(beta)
                } else {
                    None
                }
            }
            CcfModelKind::Mgl => {
                // pi_1 = 1; missing levels beyond the given factors are 0.
                let mut numerator = Vec::new();
                for level in 2..=k {
                    numerator.push(factor_at(level)?);
                }
                if k < n {
                    let next = match factor_at(k + 1) {
                        Some(f) => {
                            let one = self.pool.constant(1.0);
                            self.pool.add(Expression::Sub(vec![one, f]))
                        }
                        None => self.pool.constant(1.0),
                    };
                    numerator.push(next);
                }
                let denom = self.pool.constant(binomial(n - 1, k - 1));
                let product = self.pool.add(Expression::Mul(numerator));
                Some(self.pool.add(Expression::Div(vec![product, denom])))
            }
            CcfModelKind::AlphaFactor => {
                let alpha_k = factor_at(k)?;
                let mut total_terms = Vec::new();
                for level in 1..=n {
                    let alpha = factor_at(level)?;
                    let weight = self.pool.constant(level as f64);
                    total_terms.push(self.pool.add(Expression::Mul(vec![weight, alpha])));
                }
                let alpha_t = self.pool.add(Expression::Add(total_terms));
                let k_const = self.pool.constant(k as f64);
                let numerator = self.pool.add(Expression::Mul(vec![k_const, alpha_k]));
                let denom_const = self.pool.constant(binomial(n - 1, k - 1));
                let denom = self.pool.add(Expression::Mul(vec![denom_const, alpha_t]));
                Some(self.pool.add(Expression::Div(vec![numerator, denom])))
            }
            CcfModelKind::PhiFactor => {
                let phi_k = factor_at(k)?;
                let denom = self.pool.constant(binomial(n - 1, k - 1));
                Some(self.pool.add(Expression::Div(vec![phi_k, denom])))
            }
        }
    }
}

// Validation.
impl Model {
    /// Validates the model, aggregating all findings into one error.
    ///
    /// `probability_needed` additionally requires a valid probability
    /// description on every basic event.
    pub fn validate(&self, probability_needed: bool, cx: &EvalCx) -> Result<()> {
        let mut errors = Vec::new();

        if self.fault_trees.is_empty() {
            errors.push("no fault tree is defined".to_string());
        }

        for gate in &self.gates {
            if !gate.defined {
                errors.push(format!("undefined gate: {}", gate.name));
            }
        }
        self.check_gate_arities(&mut errors);
        self.check_gate_cycles(&mut errors);

        for param in &self.parameters {
            if param.expression.is_none() {
                errors.push(format!("missing parameter definition: {}", param.name));
            }
        }
        let params_cyclic = self.check_parameter_cycles(&mut errors);

        for group in &self.ccf_groups {
            group.validate_structure(&mut errors);
        }
        self.check_ccf_membership(&mut errors);

        // Value-level checks recurse through parameters, so they are skipped
        // when the parameter graph is broken.
        if !params_cyclic && self.parameters.iter().all(|p| p.expression.is_some()) {
            if probability_needed {
                self.check_probabilities(cx, &mut errors);
                self.check_ccf_factors(cx, &mut errors);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors.join("\n")))
        }
    }

    fn check_gate_arities(&self, errors: &mut Vec<String>) {
        for gate in &self.gates {
            if !gate.defined {
                continue;
            }
            let size = gate.args.len();
            match gate.connective {
                Connective::And | Connective::Or | Connective::Nand | Connective::Nor => {
                    if size < 2 {
                        errors.push(format!(
                            "{} : {} gate must have 2 or more arguments",
                            gate.name,
                            gate.connective.to_string().to_uppercase()
                        ));
                    }
                }
                Connective::Not | Connective::Null => {
                    if size != 1 {
                        errors.push(format!(
                            "{} : {} gate must have exactly one argument",
                            gate.name,
                            gate.connective.to_string().to_uppercase()
                        ));
                    }
                }
                Connective::Xor => {
                    if size != 2 {
                        errors.push(format!("{} : XOR gate must have exactly 2 arguments", gate.name));
                    }
                }
                Connective::AtLeast => match gate.min_number {
                    Some(min) if min >= 1 && size > min => {}
                    Some(min) => errors.push(format!(
                        "{} : ATLEAST gate must have more arguments than its vote number {}",
                        gate.name, min
                    )),
                    None => errors.push(format!("{} : ATLEAST gate is missing its vote number", gate.name)),
                },
                Connective::Inhibit => {
                    if size != 2 {
                        errors.push(format!("{} : INHIBIT gate must have exactly 2 arguments", gate.name));
                    } else {
                        let conditionals = gate
                            .args
                            .iter()
                            .filter(|arg| match arg.event {
                                EventRef::Basic(id) => {
                                    self.basic_events[id.0].flavor == EventFlavor::Conditional
                                }
                                _ => false,
                            })
                            .count();
                        if conditionals != 1 {
                            errors.push(format!(
                                "{} : INHIBIT gate must have exactly one conditional argument",
                                gate.name
                            ));
                        }
                    }
                }
            }
        }
    }

    fn check_gate_cycles(&self, errors: &mut Vec<String>) {
        #[derive(Copy, Clone, PartialEq)]
        enum Mark {
            Clean,
            Active,
            Done,
        }
        fn visit(gates: &[Gate], id: usize, marks: &mut [Mark], errors: &mut Vec<String>) {
            match marks[id] {
                Mark::Done => return,
                Mark::Active => {
                    errors.push(format!("cycle detected through gate {}", gates[id].name));
                    return;
                }
                Mark::Clean => {}
            }
            marks[id] = Mark::Active;
            for arg in &gates[id].args {
                if let EventRef::Gate(child) = arg.event {
                    visit(gates, child.0, marks, errors);
                }
            }
            marks[id] = Mark::Done;
        }
        let mut marks = vec![Mark::Clean; self.gates.len()];
        for id in 0..self.gates.len() {
            visit(&self.gates, id, &mut marks, errors);
        }
    }

    /// Returns true if a cycle was found.
    fn check_parameter_cycles(&self, errors: &mut Vec<String>) -> bool {
        #[derive(Copy, Clone, PartialEq)]
        enum Mark {
            Clean,
            Active,
            Done,
        }
        let mut marks = vec![Mark::Clean; self.parameters.len()];
        let mut cyclic = false;
        fn visit(
            model: &Model,
            id: usize,
            marks: &mut [Mark],
            errors: &mut Vec<String>,
            cyclic: &mut bool,
        ) {
            match marks[id] {
                Mark::Done => return,
                Mark::Active => {
                    errors.push(format!("cycle detected through parameter {}", model.parameters[id].name));
                    *cyclic = true;
                    return;
                }
                Mark::Clean => {}
            }
            marks[id] = Mark::Active;
            if let Some(expr) = model.parameters[id].expression {
                let mut refs = Vec::new();
                model.pool.collect_params(expr, &mut refs);
                for child in refs {
                    visit(model, child.0, marks, errors, cyclic);
                }
            }
            marks[id] = Mark::Done;
        }
        for id in 0..self.parameters.len() {
            visit(self, id, &mut marks, errors, &mut cyclic);
        }
        cyclic
    }

    fn check_probabilities(&self, cx: &EvalCx, errors: &mut Vec<String>) {
        for (index, event) in self.basic_events.iter().enumerate() {
            match event.expression {
                None => errors.push(format!("missing probability description: {}", event.name)),
                Some(expr) => {
                    self.pool.validate(expr, &self.parameters, cx, errors);
                    let mean = self.basic_event_probability(BasicEventId(index), cx);
                    if !(0.0..=1.0).contains(&mean) {
                        errors.push(format!(
                            "{} : probability {} is not within [0, 1]",
                            event.name, mean
                        ));
                    }
                }
            }
        }
    }

    fn check_ccf_membership(&self, errors: &mut Vec<String>) {
        let mut seen: HashMap<BasicEventId, &str> = HashMap::new();
        for group in &self.ccf_groups {
            for &member in &group.members {
                if let Some(other) = seen.insert(member, &group.name) {
                    errors.push(format!(
                        "{} is a member of both CCF groups {} and {}",
                        self.basic_events[member.0].name, other, group.name
                    ));
                }
            }
        }
    }

    fn check_ccf_factors(&self, cx: &EvalCx, errors: &mut Vec<String>) {
        for group in &self.ccf_groups {
            let mut sum = 0.0;
            for &(level, factor) in &group.factors {
                let mean = self.pool.mean(factor, &self.parameters, cx);
                if !(0.0..=1.0).contains(&mean) {
                    errors.push(format!(
                        "{} : level-{} factor {} is not within [0, 1]",
                        group.name, level, mean
                    ));
                }
                sum += mean;
            }
            if group.kind == CcfModelKind::PhiFactor && (sum - 1.0).abs() > 1e-9 {
                errors.push(format!("{} : phi factors must sum to 1, got {}", group.name, sum));
            }
            if let Some(q) = group.distribution {
                self.pool.validate(q, &self.parameters, cx, errors);
            }
        }
    }

    /// Primary events defined in the model but referenced by no gate and no
    /// CCF group. Reported as a warning by the analysis.
    pub fn orphan_events(&self) -> Vec<String> {
        let mut referenced: HashSet<EventRef> = HashSet::new();
        for gate in &self.gates {
            for arg in &gate.args {
                referenced.insert(arg.event);
            }
        }
        for group in &self.ccf_groups {
            for &member in &group.members {
                referenced.insert(member.into());
            }
        }
        let mut orphans = Vec::new();
        for (index, event) in self.basic_events.iter().enumerate() {
            if !referenced.contains(&EventRef::Basic(BasicEventId(index))) {
                orphans.push(event.name.clone());
            }
        }
        for (index, event) in self.house_events.iter().enumerate() {
            if !referenced.contains(&EventRef::House(HouseEventId(index))) {
                orphans.push(event.name.clone());
            }
        }
        orphans.sort();
        orphans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cx() -> EvalCx {
        EvalCx { mission_time: 8760.0 }
    }

    #[test]
    fn test_case_insensitive_ids() {
        let mut model = Model::new("m");
        model.add_basic_event("Pump", 0.1).unwrap();
        assert!(model.add_basic_event("PUMP", 0.2).is_err());
        assert!(model.by_name("pump").is_some());
    }

    #[test]
    fn test_simple_tree_validates() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let b = model.add_basic_event("B", 0.2).unwrap();
        let top = model.add_gate("Top", Connective::Or, [a, b]).unwrap();
        model.add_fault_tree("FT", top).unwrap();
        model.validate(true, &cx()).unwrap();
    }

    #[test]
    fn test_arity_validation() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let top = model.add_gate("Top", Connective::And, [a]).unwrap();
        model.add_fault_tree("FT", top).unwrap();
        let err = model.validate(false, &cx()).unwrap_err();
        assert!(err.to_string().contains("AND gate must have 2 or more"));
    }

    #[test]
    fn test_atleast_validation() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let b = model.add_basic_event("B", 0.1).unwrap();
        let top = model.add_atleast_gate("Top", 2, [a, b]).unwrap();
        model.add_fault_tree("FT", top).unwrap();
        let err = model.validate(false, &cx()).unwrap_err();
        assert!(err.to_string().contains("vote number"));
    }

    #[test]
    fn test_undefined_gate_and_cycle() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let inner = model.declare_gate("Inner").unwrap();
        let top = model.add_gate("Top", Connective::Or, [Arg::new(a), Arg::new(inner)]).unwrap();
        model.add_fault_tree("FT", top).unwrap();
        let err = model.validate(false, &cx()).unwrap_err();
        assert!(err.to_string().contains("undefined gate: Inner"));

        // Close the cycle: Inner = AND(Top, A).
        model.set_gate_formula(inner, Connective::And, [Arg::new(top), Arg::new(a)]).unwrap();
        let err = model.validate(false, &cx()).unwrap_err();
        assert!(err.to_string().contains("cycle detected through gate"));
    }

    #[test]
    fn test_parameter_cycle() {
        let mut model = Model::new("m");
        let p = model.declare_parameter("P", Units::Float).unwrap();
        let p_ref = model.add_expression(Expression::Parameter(p));
        let two = model.constant(2.0);
        let doubled = model.add_expression(Expression::Mul(vec![two, p_ref]));
        model.set_parameter_expression(p, doubled).unwrap();
        let a = model.add_basic_event("A", 0.5).unwrap();
        let b = model.add_basic_event("B", 0.5).unwrap();
        let top = model.add_gate("Top", Connective::And, [a, b]).unwrap();
        model.add_fault_tree("FT", top).unwrap();
        let err = model.validate(false, &cx()).unwrap_err();
        assert!(err.to_string().contains("cycle detected through parameter P"));
    }

    #[test]
    fn test_probability_out_of_range() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 1.5).unwrap();
        let b = model.add_basic_event("B", 0.5).unwrap();
        let top = model.add_gate("Top", Connective::And, [a, b]).unwrap();
        model.add_fault_tree("FT", top).unwrap();
        assert!(model.validate(false, &cx()).is_ok());
        let err = model.validate(true, &cx()).unwrap_err();
        assert!(err.to_string().contains("not within [0, 1]"));
    }

    #[test]
    fn test_orphans() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let b = model.add_basic_event("B", 0.2).unwrap();
        let _lonely = model.add_basic_event("Lonely", 0.3).unwrap();
        let top = model.add_gate("Top", Connective::Or, [a, b]).unwrap();
        model.add_fault_tree("FT", top).unwrap();
        assert_eq!(model.orphan_events(), vec!["Lonely".to_string()]);
    }

    #[test]
    fn test_ccf_beta_expansion() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let b = model.add_basic_event("B", 0.1).unwrap();
        let q = model.constant(0.1);
        let beta = model.constant(0.2);
        model
            .add_ccf_group("pumps", CcfModelKind::BetaFactor, vec![a, b], q, vec![(2, beta)])
            .unwrap();
        model.apply_ccf(&cx()).unwrap();

        // Members get (1-beta)Q and a substitute list [self, pair].
        let subs = model.basic_event(a).ccf_substitutes.clone().unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0], a);
        let pair = subs[1];
        assert_eq!(model.basic_event(pair).name(), "[A B]");
        assert!((model.basic_event_probability(a, &cx()) - 0.08).abs() < 1e-12);
        assert!((model.basic_event_probability(pair, &cx()) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_ccf_beta_zero_degenerates() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let b = model.add_basic_event("B", 0.1).unwrap();
        let q = model.constant(0.1);
        let beta = model.constant(0.0);
        model
            .add_ccf_group("pumps", CcfModelKind::BetaFactor, vec![a, b], q, vec![(2, beta)])
            .unwrap();
        model.apply_ccf(&cx()).unwrap();

        let subs = model.basic_event(a).ccf_substitutes.clone().unwrap();
        assert_eq!(subs, vec![a]);
        assert!((model.basic_event_probability(a, &cx()) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_ccf_mgl_three() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let b = model.add_basic_event("B", 0.1).unwrap();
        let c = model.add_basic_event("C", 0.1).unwrap();
        let q = model.constant(0.1);
        let beta = model.constant(0.2);
        let gamma = model.constant(0.5);
        model
            .add_ccf_group(
                "valves",
                CcfModelKind::Mgl,
                vec![a, b, c],
                q,
                vec![(2, beta), (3, gamma)],
            )
            .unwrap();
        model.apply_ccf(&cx()).unwrap();

        // Q1 = (1 - 0.2) * 0.1; Q2 = 0.2*(1-0.5)*0.1/C(2,1); Q3 = 0.2*0.5*0.1/C(2,2).
        assert!((model.basic_event_probability(a, &cx()) - 0.08).abs() < 1e-12);
        let pair = model.by_name("[A B]").unwrap();
        if let EventRef::Basic(pair) = pair {
            assert!((model.basic_event_probability(pair, &cx()) - 0.005).abs() < 1e-12);
        } else {
            panic!("expected a basic event");
        }
        let triple = model.by_name("[A B C]").unwrap();
        if let EventRef::Basic(triple) = triple {
            assert!((model.basic_event_probability(triple, &cx()) - 0.01).abs() < 1e-12);
        } else {
            panic!("expected a basic event");
        }
    }
}
