//! Events of the symbolic model: gates, basic events, house events.

use std::fmt;

use crate::model::expression::ExprId;

/// Index of a basic event in the model arena.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BasicEventId(pub(crate) usize);

/// Index of a house event in the model arena.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct HouseEventId(pub(crate) usize);

/// Index of a gate in the model arena.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GateId(pub(crate) usize);

/// A reference to any event of the model.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum EventRef {
    Basic(BasicEventId),
    House(HouseEventId),
    Gate(GateId),
}

impl From<BasicEventId> for EventRef {
    fn from(id: BasicEventId) -> Self {
        EventRef::Basic(id)
    }
}
impl From<HouseEventId> for EventRef {
    fn from(id: HouseEventId) -> Self {
        EventRef::House(id)
    }
}
impl From<GateId> for EventRef {
    fn from(id: GateId) -> Self {
        EventRef::Gate(id)
    }
}

/// A gate argument: an event reference, optionally complemented.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Arg {
    pub event: EventRef,
    pub complement: bool,
}

impl Arg {
    pub fn new(event: impl Into<EventRef>) -> Self {
        Arg { event: event.into(), complement: false }
    }

    /// A complemented argument.
    pub fn complement(event: impl Into<EventRef>) -> Self {
        Arg { event: event.into(), complement: true }
    }
}

impl From<EventRef> for Arg {
    fn from(event: EventRef) -> Self {
        Arg::new(event)
    }
}
impl From<BasicEventId> for Arg {
    fn from(id: BasicEventId) -> Self {
        Arg::new(id)
    }
}
impl From<HouseEventId> for Arg {
    fn from(id: HouseEventId) -> Self {
        Arg::new(id)
    }
}
impl From<GateId> for Arg {
    fn from(id: GateId) -> Self {
        Arg::new(id)
    }
}

/// Boolean connectives of gate formulas.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Connective {
    And,
    Or,
    Not,
    Nor,
    Nand,
    Xor,
    /// Single-argument pass-through.
    Null,
    /// K-out-of-N voting; the K is carried by the gate.
    AtLeast,
    /// AND with exactly one conditional argument; analyzed as AND.
    Inhibit,
}

impl fmt::Display for Connective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Connective::And => "and",
            Connective::Or => "or",
            Connective::Not => "not",
            Connective::Nor => "nor",
            Connective::Nand => "nand",
            Connective::Xor => "xor",
            Connective::Null => "null",
            Connective::AtLeast => "atleast",
            Connective::Inhibit => "inhibit",
        };
        write!(f, "{}", name)
    }
}

/// The flavor of a primary event, carried over from the input format.
///
/// Undeveloped events analyze exactly like basic events; conditional events
/// are the distinguished second argument of INHIBIT gates.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum EventFlavor {
    Basic,
    Undeveloped,
    Conditional,
}

/// A primary event with a probabilistic description.
#[derive(Debug, Clone)]
pub struct BasicEvent {
    pub(crate) name: String,
    pub(crate) expression: Option<ExprId>,
    pub(crate) flavor: EventFlavor,
    /// Set by CCF expansion: references are rewritten as the OR of these
    /// substitute events.
    pub(crate) ccf_substitutes: Option<Vec<BasicEventId>>,
}

impl BasicEvent {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn expression(&self) -> Option<ExprId> {
        self.expression
    }
    pub fn flavor(&self) -> EventFlavor {
        self.flavor
    }
}

/// A Boolean-constant event. Immutable after definition.
#[derive(Debug, Clone)]
pub struct HouseEvent {
    pub(crate) name: String,
    pub(crate) state: bool,
}

impl HouseEvent {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn state(&self) -> bool {
        self.state
    }
}

/// A gate of the fault tree: a connective over ordered arguments.
#[derive(Debug, Clone)]
pub struct Gate {
    pub(crate) name: String,
    pub(crate) connective: Connective,
    /// The vote number of ATLEAST gates.
    pub(crate) min_number: Option<usize>,
    pub(crate) args: Vec<Arg>,
    /// False for declared-but-undefined gates (late binding).
    pub(crate) defined: bool,
}

impl Gate {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn connective(&self) -> Connective {
        self.connective
    }
    pub fn min_number(&self) -> Option<usize> {
        self.min_number
    }
    pub fn args(&self) -> &[Arg] {
        &self.args
    }
}

/// One fault tree: a named container selecting a top gate for analysis.
#[derive(Debug, Clone)]
pub struct FaultTree {
    pub(crate) name: String,
    pub(crate) top: GateId,
}

impl FaultTree {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn top(&self) -> GateId {
        self.top
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_conversions() {
        let arg: Arg = BasicEventId(3).into();
        assert!(!arg.complement);
        assert_eq!(arg.event, EventRef::Basic(BasicEventId(3)));

        let arg = Arg::complement(GateId(1));
        assert!(arg.complement);
        assert_eq!(arg.event, EventRef::Gate(GateId(1)));
    }

    #[test]
    fn test_connective_display() {
        assert_eq!(Connective::AtLeast.to_string(), "atleast");
        assert_eq!(Connective::Nand.to_string(), "nand");
    }
}
