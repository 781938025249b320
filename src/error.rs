//! Error taxonomy for model construction, configuration, and analysis.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the engine.
///
/// File I/O never happens inside the engine (inputs are materialized before
/// the PDAG is built, reports are emitted after), so I/O failures belong to
/// the embedding shell.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed model: unknown connective arity, duplicate id, missing
    /// definition, cycle, out-of-domain probability. All validation
    /// failures for one model are aggregated into a single message.
    #[error("validation error: {0}")]
    Validation(String),

    /// Incompatible or out-of-range analysis options.
    #[error("settings error: {0}")]
    Settings(String),

    /// Runtime analysis limit hit (e.g. the order cutoff leaves no
    /// representable products, or a node budget is exceeded).
    #[error("analysis error: {0}")]
    Analysis(String),

    /// Cooperative cancellation. Surfaces up unchanged from the pass or
    /// gate expansion that observed the flag.
    #[error("analysis cancelled")]
    Cancelled,

    /// Internal invariant failure. Always a bug, never a user-recoverable
    /// condition.
    #[error("logic error: {0}")]
    Logic(String),
}

impl Error {
    /// True for the cooperative-cancellation error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::Validation("the id X is doubly defined".to_string());
        assert_eq!(err.to_string(), "validation error: the id X is doubly defined");
        assert!(Error::Cancelled.is_cancelled());
        assert!(!err.is_cancelled());
    }
}
